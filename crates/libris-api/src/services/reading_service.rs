//! Reading sessions: start, heartbeat, end, and bookmark lookup.
//!
//! Records are private to their reader; a record of another user is reported
//! as absent. Starting a session files the book in the reader's
//! reading-history library directly through the library store, before the
//! record is written: filing is idempotent, so a failed start never leaves
//! an orphan session behind.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use libris_core::defaults::READING_HISTORY_LIBRARY_NAME;
use libris_core::{
    BookRepository, Error, ItemTarget, LibraryRepository, Page, PageQuery, Paged,
    ReadingProgress, ReadingRecord, ReadingRecordRepository, Result, UserId,
};

#[derive(Clone)]
pub struct ReadingService {
    records: Arc<dyn ReadingRecordRepository>,
    books: Arc<dyn BookRepository>,
    libraries: Arc<dyn LibraryRepository>,
}

impl ReadingService {
    pub fn new(
        records: Arc<dyn ReadingRecordRepository>,
        books: Arc<dyn BookRepository>,
        libraries: Arc<dyn LibraryRepository>,
    ) -> Self {
        Self {
            records,
            books,
            libraries,
        }
    }

    pub async fn start(
        &self,
        user_id: UserId,
        book_id: i64,
        position: Option<String>,
    ) -> Result<ReadingRecord> {
        if self.books.get(book_id).await?.is_none() {
            return Err(Error::NotFound(format!("Book {} not found", book_id)));
        }

        self.file_in_history(user_id, book_id).await?;
        let record = self
            .records
            .start(user_id, book_id, position.as_deref(), Utc::now())
            .await?;

        info!(
            subsystem = "api",
            component = "reading",
            op = "start",
            record_id = record.id,
            user_id,
            book_id,
            "Reading session started"
        );
        Ok(record)
    }

    pub async fn heartbeat(
        &self,
        user_id: UserId,
        record_id: i64,
        position: Option<String>,
    ) -> Result<ReadingRecord> {
        self.progress(user_id, record_id, position, false).await
    }

    pub async fn end(
        &self,
        user_id: UserId,
        record_id: i64,
        position: Option<String>,
    ) -> Result<ReadingRecord> {
        let record = self.progress(user_id, record_id, position, true).await?;
        info!(
            subsystem = "api",
            component = "reading",
            op = "end",
            record_id,
            user_id,
            duration_seconds = record.duration_seconds,
            "Reading session ended"
        );
        Ok(record)
    }

    pub async fn list_mine(
        &self,
        user_id: UserId,
        book_id: Option<i64>,
        query: PageQuery,
    ) -> Result<Paged<ReadingRecord>> {
        let page = query.page();
        let items = self.records.list(user_id, book_id, page).await?;
        let total = self.records.count(user_id, book_id).await?;
        Ok(Paged::new(items, total, page))
    }

    /// Most recent session for a book, used to restore the bookmark.
    pub async fn last(&self, user_id: UserId, book_id: i64) -> Result<ReadingRecord> {
        self.records
            .list(user_id, Some(book_id), Page { take: 1, skip: 0 })
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::NotFound(format!("No reading record for book {}", book_id))
            })
    }

    async fn progress(
        &self,
        user_id: UserId,
        record_id: i64,
        position: Option<String>,
        end: bool,
    ) -> Result<ReadingRecord> {
        let record = self
            .records
            .get(record_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| Error::NotFound(format!("Reading record {} not found", record_id)))?;
        if record.is_ended() {
            return Err(Error::Conflict(format!(
                "Reading record {} has already ended",
                record_id
            )));
        }

        let at = Utc::now();
        let duration_seconds = (at - record.started_at).num_seconds().max(0);
        self.records
            .record_progress(
                record.id,
                ReadingProgress {
                    position,
                    at,
                    duration_seconds,
                    end,
                },
            )
            .await
    }

    async fn file_in_history(&self, user_id: UserId, book_id: i64) -> Result<()> {
        let history = self
            .libraries
            .find_by_owner_and_name(user_id, READING_HISTORY_LIBRARY_NAME)
            .await?
            .filter(|library| library.is_system);
        let Some(history) = history else {
            warn!(
                subsystem = "api",
                component = "reading",
                user_id,
                "Reading history library missing, book not filed"
            );
            return Ok(());
        };

        let target = ItemTarget::Book { book_id };
        if self.libraries.find_item(history.id, target).await?.is_some() {
            return Ok(());
        }
        match self.libraries.add_item(history.id, target).await {
            // A concurrent session filed it first.
            Ok(_) | Err(Error::Conflict(_)) => {
                debug!(
                    subsystem = "api",
                    component = "reading",
                    library_id = history.id,
                    book_id,
                    "Book filed in reading history"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
