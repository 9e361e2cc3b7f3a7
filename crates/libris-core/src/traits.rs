//! Core traits for libris storage abstractions.
//!
//! These traits define the interfaces that concrete implementations
//! must satisfy, enabling pluggable backends and testability.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::*;
use crate::pagination::Page;

// =============================================================================
// TAG REPOSITORY TRAITS
// =============================================================================

/// Repository for key/value tags.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Return the tag with this exact (key, value), creating it if absent.
    ///
    /// `shown` is only applied when the tag is created. Must be atomic with
    /// respect to concurrent callers resolving the same pair.
    async fn find_or_create(&self, key: &str, value: &str, shown: bool) -> Result<Tag>;

    /// List tags ordered by key then value, optionally filtered by key.
    async fn list(&self, key: Option<&str>) -> Result<Vec<Tag>>;
}

// =============================================================================
// LIBRARY REPOSITORY TRAITS
// =============================================================================

/// Persistence boundary for libraries and their membership items.
///
/// Unique-constraint violations on `(owner, name)` and on membership pairs
/// are reported as `Error::Conflict`.
#[async_trait]
pub trait LibraryRepository: Send + Sync {
    /// Insert a library and link its tags.
    async fn create(&self, req: NewLibrary) -> Result<Library>;

    /// Insert a library with one book item per id, in a single transaction.
    /// Items are added in the order given.
    async fn create_with_books(&self, req: NewLibrary, book_ids: &[i64]) -> Result<Library>;

    /// Get a library with its tags.
    async fn get(&self, id: i64) -> Result<Option<Library>>;

    /// Exact-match lookup of an owner's library by name.
    async fn find_by_owner_and_name(&self, owner_id: UserId, name: &str)
        -> Result<Option<Library>>;

    /// All libraries of an owner, newest-created first.
    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Library>>;

    /// Apply a partial update and bump `updated_at`.
    async fn update(&self, id: i64, changes: LibraryChanges) -> Result<Library>;

    /// Delete a library; its items are removed with it.
    async fn delete(&self, id: i64) -> Result<()>;

    /// Number of items in a library.
    async fn count_items(&self, library_id: i64) -> Result<i64>;

    /// Items newest-added first; `None` returns every item.
    async fn list_items(&self, library_id: i64, page: Option<Page>)
        -> Result<Vec<LibraryItemView>>;

    /// Ids of the books held by a library, oldest-added first.
    async fn book_ids(&self, library_id: i64) -> Result<Vec<i64>>;

    /// Find the item of a library pointing at the given target.
    async fn find_item(&self, library_id: i64, target: ItemTarget) -> Result<Option<LibraryItem>>;

    async fn get_item(&self, item_id: i64) -> Result<Option<LibraryItem>>;

    async fn add_item(&self, library_id: i64, target: ItemTarget) -> Result<LibraryItem>;

    async fn remove_item(&self, item_id: i64) -> Result<()>;
}

// =============================================================================
// BOOK REPOSITORY TRAITS
// =============================================================================

/// Book store. Duplicate content hashes are reported as `Error::Conflict`.
#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn create(&self, req: NewBook) -> Result<Book>;

    async fn get(&self, id: i64) -> Result<Option<Book>>;

    async fn count_by_uploader(&self, uploader_id: UserId) -> Result<i64>;

    /// Books of an uploader, newest-created first; `None` returns all of them.
    async fn list_by_uploader(&self, uploader_id: UserId, page: Option<Page>)
        -> Result<Vec<Book>>;

    /// Most recently created book of an uploader.
    async fn latest_by_uploader(&self, uploader_id: UserId) -> Result<Option<Book>>;
}

// =============================================================================
// ACCOUNT REPOSITORY TRAITS
// =============================================================================

/// User accounts. Duplicate usernames are reported as `Error::Conflict`.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, username: &str, password_hash: &str) -> Result<User>;

    async fn get(&self, id: UserId) -> Result<Option<User>>;

    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>>;
}

/// Bearer access tokens, stored by digest only.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn store(&self, user_id: UserId, token_hash: &str, expires_at: DateTime<Utc>)
        -> Result<()>;

    /// Owner of a non-revoked token that has not expired at `now`.
    async fn resolve(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<UserId>>;

    async fn revoke(&self, token_hash: &str) -> Result<()>;
}

// =============================================================================
// READING RECORD REPOSITORY TRAITS
// =============================================================================

#[async_trait]
pub trait ReadingRecordRepository: Send + Sync {
    async fn start(
        &self,
        user_id: UserId,
        book_id: i64,
        position: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ReadingRecord>;

    async fn get(&self, id: i64) -> Result<Option<ReadingRecord>>;

    /// Apply a heartbeat or end-of-session update. A `None` position keeps
    /// the stored bookmark.
    async fn record_progress(&self, id: i64, progress: ReadingProgress) -> Result<ReadingRecord>;

    /// A user's records, newest-started first, optionally for one book.
    async fn list(&self, user_id: UserId, book_id: Option<i64>, page: Page)
        -> Result<Vec<ReadingRecord>>;

    async fn count(&self, user_id: UserId, book_id: Option<i64>) -> Result<i64>;
}

// =============================================================================
// HEALTH
// =============================================================================

/// Round-trip check against the backing store.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<()>;
}
