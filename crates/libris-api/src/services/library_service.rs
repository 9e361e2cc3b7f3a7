//! Media library aggregation engine.
//!
//! Enforces ownership, visibility, name uniqueness, system-library locking and
//! nesting rules, and composes the read views (summary, detail, paged detail,
//! the virtual "my uploads" library and the reading-history system library).
//!
//! Every operation takes the requester identity explicitly. Checks run before
//! any mutation; the store's unique constraints settle races between two
//! check-then-create sequences.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use libris_core::access::{ensure_not_system, ensure_owner, ensure_readable};
use libris_core::defaults::{
    MAX_LIBRARY_DESCRIPTION_LEN, MAX_LIBRARY_NAME_LEN, READING_HISTORY_LIBRARY_NAME,
};
use libris_core::{
    Ack, BookRepository, CopiedLibrary, CreateLibraryRequest, Error, ItemContent, ItemTarget,
    Library, LibraryChanges, LibraryDetail, LibraryInfo, LibraryItem, LibraryItemView,
    LibraryRepository, LibrarySummary, NewLibrary, Page, PageQuery, Result,
    UpdateLibraryRequest, UserId,
};

use super::TagResolver;

#[derive(Clone)]
pub struct LibraryService {
    libraries: Arc<dyn LibraryRepository>,
    books: Arc<dyn BookRepository>,
    tag_resolver: TagResolver,
}

impl LibraryService {
    pub fn new(
        libraries: Arc<dyn LibraryRepository>,
        books: Arc<dyn BookRepository>,
        tag_resolver: TagResolver,
    ) -> Self {
        Self {
            libraries,
            books,
            tag_resolver,
        }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    pub async fn create(&self, owner: UserId, req: CreateLibraryRequest) -> Result<LibraryInfo> {
        let name = validate_name(&req.name)?;
        let description = normalize_description(req.description)?;
        self.ensure_name_available(owner, &name).await?;
        let tag_ids = self.tag_resolver.resolve_ids(&req.tags).await?;

        let library = self
            .libraries
            .create(NewLibrary {
                owner_id: owner,
                name,
                description,
                is_public: req.is_public.unwrap_or(false),
                is_system: false,
                tag_ids,
            })
            .await?;

        info!(
            subsystem = "api",
            component = "libraries",
            op = "create",
            library_id = library.id,
            user_id = owner,
            "Library created"
        );
        Ok(LibraryInfo::from(&library))
    }

    pub async fn add_book(
        &self,
        library_id: i64,
        requester: UserId,
        book_id: i64,
    ) -> Result<LibraryItem> {
        let library = self.load_owned(library_id, requester).await?;
        if self.books.get(book_id).await?.is_none() {
            return Err(Error::NotFound(format!("Book {} not found", book_id)));
        }

        let target = ItemTarget::Book { book_id };
        if self.libraries.find_item(library.id, target).await?.is_some() {
            return Err(Error::Conflict(format!(
                "Book {} is already in library {}",
                book_id, library.id
            )));
        }

        let item = self.libraries.add_item(library.id, target).await?;
        info!(
            subsystem = "api",
            component = "libraries",
            op = "add_book",
            library_id = library.id,
            user_id = requester,
            book_id,
            item_id = item.id,
            "Book added to library"
        );
        Ok(item)
    }

    pub async fn add_library(
        &self,
        library_id: i64,
        requester: UserId,
        child_library_id: i64,
    ) -> Result<LibraryItem> {
        // Rejected before any lookup, whether or not the library exists.
        if library_id == child_library_id {
            return Err(Error::Conflict(format!(
                "Library {} cannot contain itself",
                library_id
            )));
        }

        let library = self.load_owned(library_id, requester).await?;
        if self.libraries.get(child_library_id).await?.is_none() {
            return Err(Error::NotFound(format!(
                "Library {} not found",
                child_library_id
            )));
        }

        let target = ItemTarget::ChildLibrary { child_library_id };
        if self.libraries.find_item(library.id, target).await?.is_some() {
            return Err(Error::Conflict(format!(
                "Library {} is already nested in library {}",
                child_library_id, library.id
            )));
        }

        let item = self.libraries.add_item(library.id, target).await?;
        info!(
            subsystem = "api",
            component = "libraries",
            op = "add_library",
            library_id = library.id,
            user_id = requester,
            child_library_id,
            item_id = item.id,
            "Library nested"
        );
        Ok(item)
    }

    /// Membership changes are allowed on system libraries.
    pub async fn remove_item(
        &self,
        library_id: i64,
        requester: UserId,
        item_id: i64,
    ) -> Result<Ack> {
        let library = self.load_owned(library_id, requester).await?;
        let belongs = self
            .libraries
            .get_item(item_id)
            .await?
            .is_some_and(|item| item.library_id == library.id);
        if !belongs {
            return Err(Error::NotFound(format!(
                "Item {} not found in library {}",
                item_id, library.id
            )));
        }

        self.libraries.remove_item(item_id).await?;
        info!(
            subsystem = "api",
            component = "libraries",
            op = "remove_item",
            library_id = library.id,
            user_id = requester,
            item_id,
            "Library item removed"
        );
        Ok(Ack::new("Item removed from library"))
    }

    pub async fn update(
        &self,
        library_id: i64,
        requester: UserId,
        req: UpdateLibraryRequest,
    ) -> Result<LibraryInfo> {
        let library = self.load_owned(library_id, requester).await?;
        ensure_not_system(&library)?;

        let mut changes = LibraryChanges::default();
        if let Some(raw) = &req.name {
            let name = validate_name(raw)?;
            if name != library.name {
                self.ensure_name_available(requester, &name).await?;
                changes.name = Some(name);
            }
        }
        if let Some(description) = req.description {
            changes.description = Some(normalize_description(description)?);
        }
        changes.is_public = req.is_public;
        if let Some(tags) = &req.tags {
            changes.tag_ids = Some(self.tag_resolver.resolve_ids(tags).await?);
        }

        let updated = self.libraries.update(library.id, changes).await?;
        info!(
            subsystem = "api",
            component = "libraries",
            op = "update",
            library_id = updated.id,
            user_id = requester,
            "Library updated"
        );
        Ok(LibraryInfo::from(&updated))
    }

    /// Copy a readable library into a new private library of the requester.
    ///
    /// Only book items are copied; nested libraries are not.
    pub async fn copy(&self, library_id: i64, requester: UserId) -> Result<CopiedLibrary> {
        let start = Instant::now();
        let source = self.load(library_id).await?;
        ensure_readable(&source, Some(requester))?;

        let name = self.unique_copy_name(requester, &source.name).await?;
        let book_ids = self.libraries.book_ids(source.id).await?;

        let copy = self
            .libraries
            .create_with_books(
                NewLibrary {
                    owner_id: requester,
                    name,
                    description: source.description.clone(),
                    is_public: false,
                    is_system: false,
                    tag_ids: source.tag_ids(),
                },
                &book_ids,
            )
            .await?;

        info!(
            subsystem = "api",
            component = "libraries",
            op = "copy",
            library_id = copy.id,
            copied_from = source.id,
            user_id = requester,
            item_count = book_ids.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Library copied"
        );
        Ok(CopiedLibrary {
            id: copy.id,
            name: copy.name.clone(),
            tags: copy.tag_pairs(),
            items_count: book_ids.len() as i64,
            is_public: copy.is_public,
            copied_from: source.id,
        })
    }

    pub async fn remove(&self, library_id: i64, requester: UserId) -> Result<Ack> {
        let library = self.load_owned(library_id, requester).await?;
        ensure_not_system(&library)?;

        self.libraries.delete(library.id).await?;
        info!(
            subsystem = "api",
            component = "libraries",
            op = "delete",
            library_id = library.id,
            user_id = requester,
            "Library deleted"
        );
        Ok(Ack::new("Library deleted"))
    }

    /// Return the owner's reading-history library, provisioning it if absent.
    pub async fn ensure_reading_history(&self, owner: UserId) -> Result<Library> {
        if let Some(library) = self.find_reading_history(owner).await? {
            return Ok(library);
        }

        let created = self
            .libraries
            .create(NewLibrary {
                owner_id: owner,
                name: READING_HISTORY_LIBRARY_NAME.to_string(),
                description: None,
                is_public: false,
                is_system: true,
                tag_ids: Vec::new(),
            })
            .await;

        match created {
            Ok(library) => {
                info!(
                    subsystem = "api",
                    component = "libraries",
                    op = "provision_reading_history",
                    library_id = library.id,
                    user_id = owner,
                    "Reading history library provisioned"
                );
                Ok(library)
            }
            // Lost a race with a concurrent provisioner.
            Err(Error::Conflict(_)) => self.find_reading_history(owner).await?.ok_or_else(|| {
                Error::Internal(format!("Reading history of user {} vanished", owner))
            }),
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn list_mine(&self, owner: UserId) -> Result<Vec<LibrarySummary>> {
        let libraries = self.libraries.list_by_owner(owner).await?;
        let mut summaries = Vec::with_capacity(libraries.len());
        for library in &libraries {
            let count = self.libraries.count_items(library.id).await?;
            summaries.push(LibrarySummary::new(library, count));
        }
        Ok(summaries)
    }

    pub async fn get_one(
        &self,
        library_id: i64,
        requester: Option<UserId>,
        query: PageQuery,
    ) -> Result<LibraryDetail> {
        let library = self.load(library_id).await?;
        ensure_readable(&library, requester)?;
        self.compose_detail(&library, query.paging()).await
    }

    pub async fn reading_history(&self, owner: UserId, query: PageQuery) -> Result<LibraryDetail> {
        let library = self.ensure_reading_history(owner).await?;
        self.compose_detail(&library, query.paging()).await
    }

    /// The computed "my uploads" library: one synthetic item per uploaded book.
    pub async fn virtual_uploaded(&self, owner: UserId, query: PageQuery) -> Result<LibraryDetail> {
        let paging = query.paging();
        let books = self.books.list_by_uploader(owner, paging).await?;
        let total = match paging {
            None => books.len() as i64,
            Some(_) => self.books.count_by_uploader(owner).await?,
        };

        let (created_at, updated_at) = match self.books.latest_by_uploader(owner).await? {
            Some(latest) => (latest.created_at, latest.updated_at),
            None => {
                let now = Utc::now();
                (now, now)
            }
        };

        let items = books
            .iter()
            .map(|book| LibraryItemView {
                id: book.id,
                added_at: book.created_at,
                content: ItemContent::Book { book: book.brief() },
            })
            .collect();

        Ok(LibraryDetail::virtual_uploads(
            owner, items, total, paging, created_at, updated_at,
        ))
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn load(&self, library_id: i64) -> Result<Library> {
        self.libraries
            .get(library_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Library {} not found", library_id)))
    }

    /// 404 when the library is absent, 403 when it belongs to someone else.
    async fn load_owned(&self, library_id: i64, requester: UserId) -> Result<Library> {
        let library = self.load(library_id).await?;
        ensure_owner(&library, requester)?;
        Ok(library)
    }

    async fn find_reading_history(&self, owner: UserId) -> Result<Option<Library>> {
        Ok(self
            .libraries
            .find_by_owner_and_name(owner, READING_HISTORY_LIBRARY_NAME)
            .await?
            .filter(|library| library.is_system))
    }

    async fn ensure_name_available(&self, owner: UserId, name: &str) -> Result<()> {
        if name == READING_HISTORY_LIBRARY_NAME {
            return Err(Error::Conflict(format!(
                "Library name '{}' is reserved",
                name
            )));
        }
        if self
            .libraries
            .find_by_owner_and_name(owner, name)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(format!("Library '{}' already exists", name)));
        }
        Ok(())
    }

    async fn compose_detail(&self, library: &Library, paging: Option<Page>) -> Result<LibraryDetail> {
        let items = self.libraries.list_items(library.id, paging).await?;
        let items_count = match paging {
            None => items.len() as i64,
            Some(_) => self.libraries.count_items(library.id).await?,
        };
        debug!(
            subsystem = "api",
            component = "libraries",
            op = "detail",
            library_id = library.id,
            paged = paging.is_some(),
            result_count = items.len(),
            items_count,
            "Composed library detail"
        );
        Ok(LibraryDetail::persisted(library, items, items_count, paging))
    }

    async fn unique_copy_name(&self, owner: UserId, base: &str) -> Result<String> {
        let mut attempt = 1;
        loop {
            let candidate = copy_name_candidate(base, attempt);
            let taken = candidate == READING_HISTORY_LIBRARY_NAME
                || self
                    .libraries
                    .find_by_owner_and_name(owner, &candidate)
                    .await?
                    .is_some();
            if !taken {
                debug!(
                    subsystem = "api",
                    component = "libraries",
                    op = "copy_name",
                    attempt,
                    name = %candidate,
                    "Chose copy name"
                );
                return Ok(candidate);
            }
            attempt += 1;
        }
    }
}

/// `"{base} (copy)"` for the first attempt, `"{base} (copy N)"` after that.
///
/// The base is cut on a character boundary so the suffix always fits within
/// [`MAX_LIBRARY_NAME_LEN`].
pub(crate) fn copy_name_candidate(base: &str, attempt: u32) -> String {
    let suffix = if attempt <= 1 {
        " (copy)".to_string()
    } else {
        format!(" (copy {})", attempt)
    };
    let room = MAX_LIBRARY_NAME_LEN.saturating_sub(suffix.chars().count());
    let base: String = base.chars().take(room).collect();
    format!("{}{}", base.trim_end(), suffix)
}

fn validate_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput(
            "Library name must not be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_LIBRARY_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "Library name must be at most {} characters",
            MAX_LIBRARY_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

/// Blank descriptions are stored as NULL.
fn normalize_description(raw: Option<String>) -> Result<Option<String>> {
    match raw {
        Some(d) if d.trim().is_empty() => Ok(None),
        Some(d) if d.chars().count() > MAX_LIBRARY_DESCRIPTION_LEN => Err(Error::InvalidInput(
            format!(
                "Library description must be at most {} characters",
                MAX_LIBRARY_DESCRIPTION_LEN
            ),
        )),
        other => Ok(other),
    }
}
