//! Book repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use libris_core::{Book, BookRepository, Error, NewBook, Page, Result, TagPair, UserId};

use crate::map_write_err;
use crate::tags::{book_tags, link_book_tags};

const BOOK_COLUMNS: &str =
    "id, content_hash, title, author, description, uploader_id, created_at, updated_at";

/// PostgreSQL implementation of BookRepository.
#[derive(Clone)]
pub struct PgBookRepository {
    pool: Pool<Postgres>,
}

impl PgBookRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn attach_tags(&self, rows: Vec<PgRow>) -> Result<Vec<Book>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();
        let mut tags = book_tags(&self.pool, &ids).await?;
        Ok(rows
            .iter()
            .map(|r| {
                let id: i64 = r.get("id");
                let pairs = tags
                    .remove(&id)
                    .unwrap_or_default()
                    .iter()
                    .map(TagPair::from)
                    .collect();
                Book {
                    id,
                    content_hash: r.get("content_hash"),
                    title: r.get("title"),
                    author: r.get("author"),
                    description: r.get("description"),
                    uploader_id: r.get("uploader_id"),
                    tags: pairs,
                    created_at: r.get("created_at"),
                    updated_at: r.get("updated_at"),
                }
            })
            .collect())
    }
}

#[async_trait]
impl BookRepository for PgBookRepository {
    async fn create(&self, req: NewBook) -> Result<Book> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(
            "INSERT INTO book (content_hash, title, author, description, uploader_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(&req.content_hash)
        .bind(&req.title)
        .bind(&req.author)
        .bind(&req.description)
        .bind(req.uploader_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            map_write_err(e, || {
                format!("Book with hash {} already exists", req.content_hash)
            })
        })?;
        let id: i64 = row.get("id");

        link_book_tags(&mut tx, id, &req.tag_ids).await?;
        tx.commit().await.map_err(Error::Database)?;

        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Book {} vanished after write", id)))
    }

    async fn get(&self, id: i64) -> Result<Option<Book>> {
        let row = sqlx::query(&format!("SELECT {} FROM book WHERE id = $1", BOOK_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        match row {
            Some(row) => Ok(self.attach_tags(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn count_by_uploader(&self, uploader_id: UserId) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM book WHERE uploader_id = $1")
            .bind(uploader_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("count"))
    }

    async fn list_by_uploader(
        &self,
        uploader_id: UserId,
        page: Option<Page>,
    ) -> Result<Vec<Book>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM book WHERE uploader_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
            BOOK_COLUMNS
        ))
        .bind(uploader_id)
        .bind(page.map(|p| p.take))
        .bind(page.map_or(0, |p| p.skip))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.attach_tags(rows).await
    }

    async fn latest_by_uploader(&self, uploader_id: UserId) -> Result<Option<Book>> {
        Ok(self
            .list_by_uploader(uploader_id, Some(Page { take: 1, skip: 0 }))
            .await?
            .pop())
    }
}
