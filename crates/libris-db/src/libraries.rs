//! Media library repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::debug;

use libris_core::{
    BookBrief, Error, ItemContent, ItemTarget, Library, LibraryBrief, LibraryChanges,
    LibraryItem, LibraryItemView, LibraryRepository, NewLibrary, Page, Result, Tag, TagPair,
    UserId,
};

use crate::map_write_err;
use crate::tags::{book_tags, library_tags, link_library_tags};

const LIBRARY_COLUMNS: &str =
    "id, name, description, is_public, is_system, owner_id, created_at, updated_at";

/// PostgreSQL implementation of LibraryRepository.
#[derive(Clone)]
pub struct PgLibraryRepository {
    pool: Pool<Postgres>,
}

impl PgLibraryRepository {
    /// Create a new PgLibraryRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    async fn insert(tx: &mut Transaction<'_, Postgres>, req: &NewLibrary) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO media_library (name, description, is_public, is_system, owner_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(&req.name)
        .bind(&req.description)
        .bind(req.is_public)
        .bind(req.is_system)
        .bind(req.owner_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_write_err(e, || format!("Library '{}' already exists", req.name)))?;

        let id: i64 = row.get("id");
        link_library_tags(tx, id, &req.tag_ids).await?;
        Ok(id)
    }

    async fn insert_item(
        tx: &mut Transaction<'_, Postgres>,
        library_id: i64,
        target: ItemTarget,
    ) -> Result<LibraryItem> {
        let row = sqlx::query(
            "INSERT INTO media_library_item (library_id, book_id, child_library_id)
             VALUES ($1, $2, $3)
             RETURNING id, library_id, book_id, child_library_id, added_at",
        )
        .bind(library_id)
        .bind(target.book_id())
        .bind(target.child_library_id())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            map_write_err(e, || {
                format!("Library {} already contains this item", library_id)
            })
        })?;

        item_from_row(&row)
    }

    async fn fetch_existing(&self, id: i64) -> Result<Library> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("Library {} vanished after write", id)))
    }

    async fn attach_tags(&self, rows: Vec<PgRow>) -> Result<Vec<Library>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();
        let mut tags = library_tags(&self.pool, &ids).await?;
        Ok(rows
            .iter()
            .map(|r| {
                let id: i64 = r.get("id");
                library_from_row(r, tags.remove(&id).unwrap_or_default())
            })
            .collect())
    }
}

fn library_from_row(r: &PgRow, tags: Vec<Tag>) -> Library {
    Library {
        id: r.get("id"),
        name: r.get("name"),
        description: r.get("description"),
        is_public: r.get("is_public"),
        is_system: r.get("is_system"),
        owner_id: r.get("owner_id"),
        tags,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

fn item_from_row(r: &PgRow) -> Result<LibraryItem> {
    Ok(LibraryItem {
        id: r.get("id"),
        library_id: r.get("library_id"),
        target: ItemTarget::from_columns(r.get("book_id"), r.get("child_library_id"))?,
        added_at: r.get("added_at"),
    })
}

fn item_view_from_row(
    r: &PgRow,
    book_tags: &HashMap<i64, Vec<Tag>>,
) -> Result<LibraryItemView> {
    let content = match ItemTarget::from_columns(r.get("book_id"), r.get("child_library_id"))? {
        ItemTarget::Book { book_id } => ItemContent::Book {
            book: BookBrief {
                id: book_id,
                content_hash: r.get("content_hash"),
                title: r.get("title"),
                author: r.get("author"),
                tags: book_tags
                    .get(&book_id)
                    .map(|tags| tags.iter().map(TagPair::from).collect())
                    .unwrap_or_default(),
            },
        },
        ItemTarget::ChildLibrary { child_library_id } => ItemContent::Library {
            library: LibraryBrief {
                id: child_library_id,
                name: r.get("child_name"),
                is_public: r.get("child_is_public"),
                is_system: r.get("child_is_system"),
            },
        },
    };
    Ok(LibraryItemView {
        id: r.get("id"),
        added_at: r.get("added_at"),
        content,
    })
}

#[async_trait]
impl LibraryRepository for PgLibraryRepository {
    async fn create(&self, req: NewLibrary) -> Result<Library> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let id = Self::insert(&mut tx, &req).await?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "libraries",
            op = "create",
            library_id = id,
            owner_id = req.owner_id,
            is_system = req.is_system,
            "Library created"
        );
        self.fetch_existing(id).await
    }

    async fn create_with_books(&self, req: NewLibrary, book_ids: &[i64]) -> Result<Library> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let id = Self::insert(&mut tx, &req).await?;
        for book_id in book_ids {
            Self::insert_item(&mut tx, id, ItemTarget::Book { book_id: *book_id }).await?;
        }
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "libraries",
            op = "create_with_books",
            library_id = id,
            item_count = book_ids.len(),
            "Library created with items"
        );
        self.fetch_existing(id).await
    }

    async fn get(&self, id: i64) -> Result<Option<Library>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM media_library WHERE id = $1",
            LIBRARY_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Ok(self.attach_tags(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_owner_and_name(
        &self,
        owner_id: UserId,
        name: &str,
    ) -> Result<Option<Library>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM media_library WHERE owner_id = $1 AND name = $2",
            LIBRARY_COLUMNS
        ))
        .bind(owner_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Ok(self.attach_tags(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Library>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM media_library WHERE owner_id = $1 ORDER BY created_at DESC, id DESC",
            LIBRARY_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        self.attach_tags(rows).await
    }

    async fn update(&self, id: i64, changes: LibraryChanges) -> Result<Library> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let name_for_error = changes.name.clone().unwrap_or_default();

        let result = sqlx::query(
            r#"
            UPDATE media_library
            SET name = COALESCE($2, name),
                description = CASE WHEN $3 THEN $4 ELSE description END,
                is_public = COALESCE($5, is_public),
                updated_at = clock_timestamp()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(changes.description.is_some())
        .bind(changes.description.clone().flatten())
        .bind(changes.is_public)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_write_err(e, || format!("Library '{}' already exists", name_for_error)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Library {} not found", id)));
        }

        if let Some(tag_ids) = &changes.tag_ids {
            sqlx::query("DELETE FROM media_library_tag WHERE library_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            link_library_tags(&mut tx, id, tag_ids).await?;
        }

        tx.commit().await.map_err(Error::Database)?;
        self.fetch_existing(id).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        // Items owned by or pointing at the library go with it (ON DELETE CASCADE).
        sqlx::query("DELETE FROM media_library WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn count_items(&self, library_id: i64) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM media_library_item WHERE library_id = $1")
            .bind(library_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("count"))
    }

    async fn list_items(
        &self,
        library_id: i64,
        page: Option<Page>,
    ) -> Result<Vec<LibraryItemView>> {
        // LIMIT NULL returns every row.
        let rows = sqlx::query(
            r#"
            SELECT i.id, i.added_at, i.book_id, i.child_library_id,
                   b.content_hash, b.title, b.author,
                   c.name AS child_name, c.is_public AS child_is_public,
                   c.is_system AS child_is_system
            FROM media_library_item i
            LEFT JOIN book b ON b.id = i.book_id
            LEFT JOIN media_library c ON c.id = i.child_library_id
            WHERE i.library_id = $1
            ORDER BY i.added_at DESC, i.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(library_id)
        .bind(page.map(|p| p.take))
        .bind(page.map_or(0, |p| p.skip))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let book_ids: Vec<i64> = rows
            .iter()
            .filter_map(|r| r.get::<Option<i64>, _>("book_id"))
            .collect();
        let tags = book_tags(&self.pool, &book_ids).await?;

        rows.iter()
            .map(|r| item_view_from_row(r, &tags))
            .collect()
    }

    async fn book_ids(&self, library_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT book_id FROM media_library_item
             WHERE library_id = $1 AND book_id IS NOT NULL
             ORDER BY added_at ASC, id ASC",
        )
        .bind(library_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(|r| r.get("book_id")).collect())
    }

    async fn find_item(&self, library_id: i64, target: ItemTarget) -> Result<Option<LibraryItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, library_id, book_id, child_library_id, added_at
            FROM media_library_item
            WHERE library_id = $1
              AND book_id IS NOT DISTINCT FROM $2
              AND child_library_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(library_id)
        .bind(target.book_id())
        .bind(target.child_library_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn get_item(&self, item_id: i64) -> Result<Option<LibraryItem>> {
        let row = sqlx::query(
            "SELECT id, library_id, book_id, child_library_id, added_at
             FROM media_library_item WHERE id = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn add_item(&self, library_id: i64, target: ItemTarget) -> Result<LibraryItem> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let item = Self::insert_item(&mut tx, library_id, target).await?;
        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "database",
            component = "libraries",
            op = "add_item",
            library_id,
            item_id = item.id,
            "Library item added"
        );
        Ok(item)
    }

    async fn remove_item(&self, item_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM media_library_item WHERE id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
