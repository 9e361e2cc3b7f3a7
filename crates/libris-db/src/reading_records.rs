//! Reading session repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use libris_core::{
    Error, Page, ReadingProgress, ReadingRecord, ReadingRecordRepository, Result, UserId,
};

use crate::map_write_err;

const RECORD_COLUMNS: &str =
    "id, user_id, book_id, position, started_at, last_heartbeat_at, ended_at, duration_seconds";

/// PostgreSQL implementation of ReadingRecordRepository.
#[derive(Clone)]
pub struct PgReadingRecordRepository {
    pool: Pool<Postgres>,
}

impl PgReadingRecordRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn record_from_row(r: &PgRow) -> ReadingRecord {
    ReadingRecord {
        id: r.get("id"),
        user_id: r.get("user_id"),
        book_id: r.get("book_id"),
        position: r.get("position"),
        started_at: r.get("started_at"),
        last_heartbeat_at: r.get("last_heartbeat_at"),
        ended_at: r.get("ended_at"),
        duration_seconds: r.get("duration_seconds"),
    }
}

#[async_trait]
impl ReadingRecordRepository for PgReadingRecordRepository {
    async fn start(
        &self,
        user_id: UserId,
        book_id: i64,
        position: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ReadingRecord> {
        let row = sqlx::query(&format!(
            "INSERT INTO reading_record (user_id, book_id, position, started_at, last_heartbeat_at)
             VALUES ($1, $2, $3, $4, $4)
             RETURNING {}",
            RECORD_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .bind(position)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_err(e, || "Reading record already exists".to_string()))?;

        Ok(record_from_row(&row))
    }

    async fn get(&self, id: i64) -> Result<Option<ReadingRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reading_record WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(record_from_row))
    }

    async fn record_progress(&self, id: i64, progress: ReadingProgress) -> Result<ReadingRecord> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE reading_record
            SET position = COALESCE($2, position),
                last_heartbeat_at = $3,
                duration_seconds = $4,
                ended_at = CASE WHEN $5 THEN $3 ELSE ended_at END
            WHERE id = $1
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(&progress.position)
        .bind(progress.at)
        .bind(progress.duration_seconds)
        .bind(progress.end)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref()
            .map(record_from_row)
            .ok_or_else(|| Error::NotFound(format!("Reading record {} not found", id)))
    }

    async fn list(
        &self,
        user_id: UserId,
        book_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<ReadingRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reading_record
             WHERE user_id = $1 AND ($2::bigint IS NULL OR book_id = $2)
             ORDER BY started_at DESC, id DESC
             LIMIT $3 OFFSET $4",
            RECORD_COLUMNS
        ))
        .bind(user_id)
        .bind(book_id)
        .bind(page.take)
        .bind(page.skip)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn count(&self, user_id: UserId, book_id: Option<i64>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM reading_record
             WHERE user_id = $1 AND ($2::bigint IS NULL OR book_id = $2)",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(row.get("count"))
    }
}
