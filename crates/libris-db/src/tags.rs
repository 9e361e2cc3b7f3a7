//! Tag repository implementation and tag-link helpers shared by the book and
//! library repositories.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};

use libris_core::{Error, Result, Tag, TagRepository};

/// PostgreSQL implementation of TagRepository.
#[derive(Clone)]
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    /// Create a new PgTagRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

pub(crate) fn tag_from_row(r: &PgRow) -> Tag {
    Tag {
        id: r.get("tag_id"),
        key: r.get("key"),
        value: r.get("value"),
        shown: r.get("shown"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

#[async_trait]
impl TagRepository for PgTagRepository {
    async fn find_or_create(&self, key: &str, value: &str, shown: bool) -> Result<Tag> {
        // No-op update so RETURNING yields the existing row on conflict.
        let row = sqlx::query(
            r#"
            INSERT INTO tag (key, value, shown)
            VALUES ($1, $2, $3)
            ON CONFLICT (key, value) DO UPDATE SET key = EXCLUDED.key
            RETURNING id AS tag_id, key, value, shown, created_at, updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(shown)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(tag_from_row(&row))
    }

    async fn list(&self, key: Option<&str>) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            r#"
            SELECT id AS tag_id, key, value, shown, created_at, updated_at
            FROM tag
            WHERE $1::text IS NULL OR key = $1
            ORDER BY key, value
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(tag_from_row).collect())
    }
}

// =============================================================================
// TAG LINKS
// =============================================================================

/// Tags of each library in `library_ids`, in link order.
pub(crate) async fn library_tags(
    pool: &Pool<Postgres>,
    library_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    if library_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query(
        r#"
        SELECT lt.library_id AS owner_id, t.id AS tag_id, t.key, t.value, t.shown,
               t.created_at, t.updated_at
        FROM media_library_tag lt
        JOIN tag t ON t.id = lt.tag_id
        WHERE lt.library_id = ANY($1)
        ORDER BY lt.library_id, lt.position
        "#,
    )
    .bind(library_ids)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)?;

    Ok(group_by_owner(&rows))
}

/// Tags of each book in `book_ids`, in link order.
pub(crate) async fn book_tags(
    pool: &Pool<Postgres>,
    book_ids: &[i64],
) -> Result<HashMap<i64, Vec<Tag>>> {
    if book_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = sqlx::query(
        r#"
        SELECT bt.book_id AS owner_id, t.id AS tag_id, t.key, t.value, t.shown,
               t.created_at, t.updated_at
        FROM book_tag bt
        JOIN tag t ON t.id = bt.tag_id
        WHERE bt.book_id = ANY($1)
        ORDER BY bt.book_id, bt.position
        "#,
    )
    .bind(book_ids)
    .fetch_all(pool)
    .await
    .map_err(Error::Database)?;

    Ok(group_by_owner(&rows))
}

fn group_by_owner(rows: &[PgRow]) -> HashMap<i64, Vec<Tag>> {
    let mut grouped: HashMap<i64, Vec<Tag>> = HashMap::new();
    for row in rows {
        grouped
            .entry(row.get("owner_id"))
            .or_default()
            .push(tag_from_row(row));
    }
    grouped
}

/// Link tags to a library. Repeated ids keep their first position.
pub(crate) async fn link_library_tags(
    tx: &mut Transaction<'_, Postgres>,
    library_id: i64,
    tag_ids: &[i64],
) -> Result<()> {
    for (position, tag_id) in tag_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO media_library_tag (library_id, tag_id, position)
             VALUES ($1, $2, $3)
             ON CONFLICT (library_id, tag_id) DO NOTHING",
        )
        .bind(library_id)
        .bind(tag_id)
        .bind(position as i32)
        .execute(&mut **tx)
        .await
        .map_err(|e| crate::map_write_err(e, || format!("Tag {} is linked twice", tag_id)))?;
    }
    Ok(())
}

/// Link tags to a book. Repeated ids keep their first position.
pub(crate) async fn link_book_tags(
    tx: &mut Transaction<'_, Postgres>,
    book_id: i64,
    tag_ids: &[i64],
) -> Result<()> {
    for (position, tag_id) in tag_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO book_tag (book_id, tag_id, position)
             VALUES ($1, $2, $3)
             ON CONFLICT (book_id, tag_id) DO NOTHING",
        )
        .bind(book_id)
        .bind(tag_id)
        .bind(position as i32)
        .execute(&mut **tx)
        .await
        .map_err(|e| crate::map_write_err(e, || format!("Tag {} is linked twice", tag_id)))?;
    }
    Ok(())
}
