//! Domain models and response views for libris.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::defaults::{VIRTUAL_LIBRARY_ID, VIRTUAL_LIBRARY_NAME};
use crate::error::{Error, Result};
use crate::pagination::Page;

/// Authenticated user identity passed explicitly into every operation.
pub type UserId = i64;

// =============================================================================
// TAGS
// =============================================================================

/// A persisted key/value tag, shared by books and libraries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Tag {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub shown: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tag as requested by a client. `shown` defaults to true on creation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TagSpec {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub shown: Option<bool>,
}

impl TagSpec {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            shown: None,
        }
    }
}

/// Wire representation of a tag embedded in library and book views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TagPair {
    pub key: String,
    pub value: String,
}

impl From<&Tag> for TagPair {
    fn from(tag: &Tag) -> Self {
        Self {
            key: tag.key.clone(),
            value: tag.value.clone(),
        }
    }
}

fn tag_pairs(tags: &[Tag]) -> Vec<TagPair> {
    tags.iter().map(TagPair::from).collect()
}

// =============================================================================
// LIBRARIES
// =============================================================================

/// A persisted media library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_system: bool,
    /// None only when the owning account was removed.
    pub owner_id: Option<UserId>,
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Library {
    pub fn tag_pairs(&self) -> Vec<TagPair> {
        tag_pairs(&self.tags)
    }

    pub fn tag_ids(&self) -> Vec<i64> {
        self.tags.iter().map(|t| t.id).collect()
    }
}

/// Insert payload for a library row and its tag links.
#[derive(Debug, Clone)]
pub struct NewLibrary {
    pub owner_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_system: bool,
    pub tag_ids: Vec<i64>,
}

/// Partial update applied by the repository. `None` leaves a column untouched;
/// `description: Some(None)` clears it; `tag_ids: Some(_)` replaces the tag set.
#[derive(Debug, Clone, Default)]
pub struct LibraryChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub is_public: Option<bool>,
    pub tag_ids: Option<Vec<i64>>,
}

/// What a library item points at. Exactly one target per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemTarget {
    Book { book_id: i64 },
    ChildLibrary { child_library_id: i64 },
}

impl ItemTarget {
    /// Rebuild a target from the two nullable storage columns.
    pub fn from_columns(book_id: Option<i64>, child_library_id: Option<i64>) -> Result<Self> {
        match (book_id, child_library_id) {
            (Some(book_id), None) => Ok(ItemTarget::Book { book_id }),
            (None, Some(child_library_id)) => Ok(ItemTarget::ChildLibrary { child_library_id }),
            (b, c) => Err(Error::Internal(format!(
                "library item must reference exactly one target (book_id={:?}, child_library_id={:?})",
                b, c
            ))),
        }
    }

    pub fn book_id(&self) -> Option<i64> {
        match self {
            ItemTarget::Book { book_id } => Some(*book_id),
            ItemTarget::ChildLibrary { .. } => None,
        }
    }

    pub fn child_library_id(&self) -> Option<i64> {
        match self {
            ItemTarget::ChildLibrary { child_library_id } => Some(*child_library_id),
            ItemTarget::Book { .. } => None,
        }
    }
}

/// A membership record linking a library to one book or one nested library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: i64,
    pub library_id: i64,
    #[serde(flatten)]
    pub target: ItemTarget,
    pub added_at: DateTime<Utc>,
}

/// Body of `POST /media-libraries`.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CreateLibraryRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to private.
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub tags: Vec<TagSpec>,
}

/// Body of `PATCH /media-libraries/:id`. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateLibraryRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// `null` or `""` clears the description.
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub is_public: Option<bool>,
    /// Replaces the whole tag set when present.
    #[serde(default)]
    pub tags: Option<Vec<TagSpec>>,
}

/// Distinguishes an explicit `null` (`Some(None)`) from an absent field (`None`).
fn deserialize_some<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// =============================================================================
// LIBRARY VIEWS
// =============================================================================

/// Book as embedded in a library item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct BookBrief {
    pub id: i64,
    pub content_hash: String,
    pub title: String,
    pub author: Option<String>,
    pub tags: Vec<TagPair>,
}

/// Nested library as embedded in a library item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LibraryBrief {
    pub id: i64,
    pub name: String,
    pub is_public: bool,
    pub is_system: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemContent {
    Book { book: BookBrief },
    Library { library: LibraryBrief },
}

/// One entry of a library detail listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LibraryItemView {
    pub id: i64,
    pub added_at: DateTime<Utc>,
    #[serde(flatten)]
    pub content: ItemContent,
}

impl LibraryItemView {
    pub fn book_id(&self) -> Option<i64> {
        match &self.content {
            ItemContent::Book { book } => Some(book.id),
            ItemContent::Library { .. } => None,
        }
    }
}

/// Library metadata returned by create and update.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibraryInfo {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_system: bool,
    pub tags: Vec<TagPair>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Library> for LibraryInfo {
    fn from(library: &Library) -> Self {
        Self {
            id: library.id,
            name: library.name.clone(),
            description: library.description.clone(),
            is_public: library.is_public,
            is_system: library.is_system,
            tags: library.tag_pairs(),
            created_at: library.created_at,
            updated_at: library.updated_at,
        }
    }
}

/// Entry of the "my libraries" listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibrarySummary {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_system: bool,
    pub tags: Vec<TagPair>,
    pub items_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LibrarySummary {
    pub fn new(library: &Library, items_count: i64) -> Self {
        Self {
            id: library.id,
            name: library.name.clone(),
            description: library.description.clone(),
            is_public: library.is_public,
            is_system: library.is_system,
            tags: library.tag_pairs(),
            items_count,
            created_at: library.created_at,
            updated_at: library.updated_at,
        }
    }
}

/// Library detail, either full (no `limit`/`offset`) or one page of items.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LibraryDetail {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_public: bool,
    pub is_system: bool,
    pub is_virtual: bool,
    #[schema(value_type = Option<i64>)]
    pub owner_id: Option<UserId>,
    pub tags: Vec<TagPair>,
    pub items: Vec<LibraryItemView>,
    /// Total number of items, never the window size.
    pub items_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LibraryDetail {
    pub fn persisted(
        library: &Library,
        items: Vec<LibraryItemView>,
        items_count: i64,
        page: Option<Page>,
    ) -> Self {
        Self {
            id: library.id,
            name: library.name.clone(),
            description: library.description.clone(),
            is_public: library.is_public,
            is_system: library.is_system,
            is_virtual: false,
            owner_id: library.owner_id,
            tags: library.tag_pairs(),
            items,
            items_count,
            limit: page.map(|p| p.take),
            offset: page.map(|p| p.skip),
            created_at: library.created_at,
            updated_at: library.updated_at,
        }
    }

    /// The computed "my uploads" view. Never persisted.
    pub fn virtual_uploads(
        owner_id: UserId,
        items: Vec<LibraryItemView>,
        items_count: i64,
        page: Option<Page>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: VIRTUAL_LIBRARY_ID,
            name: VIRTUAL_LIBRARY_NAME.to_string(),
            description: None,
            is_public: false,
            is_system: false,
            is_virtual: true,
            owner_id: Some(owner_id),
            tags: Vec::new(),
            items,
            items_count,
            limit: page.map(|p| p.take),
            offset: page.map(|p| p.skip),
            created_at,
            updated_at,
        }
    }
}

/// Result of copying a library.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CopiedLibrary {
    pub id: i64,
    pub name: String,
    pub tags: Vec<TagPair>,
    pub items_count: i64,
    pub is_public: bool,
    pub copied_from: i64,
}

/// Generic acknowledgment body for deletions.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

// =============================================================================
// BOOKS
// =============================================================================

/// A catalogued book, identified by the hash of its content.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Book {
    pub id: i64,
    pub content_hash: String,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = i64)]
    pub uploader_id: UserId,
    pub tags: Vec<TagPair>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn brief(&self) -> BookBrief {
        BookBrief {
            id: self.id,
            content_hash: self.content_hash.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            tags: self.tags.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub content_hash: String,
    pub title: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub uploader_id: UserId,
    pub tag_ids: Vec<i64>,
}

// =============================================================================
// USERS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct User {
    #[schema(value_type = i64)]
    pub id: UserId,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// User row including the stored password hash. Never serialized.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

// =============================================================================
// READING RECORDS
// =============================================================================

/// One reading session with its last known position bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReadingRecord {
    pub id: i64,
    #[schema(value_type = i64)]
    pub user_id: UserId,
    pub book_id: i64,
    pub position: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
}

impl ReadingRecord {
    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// Progress update applied to a reading record.
#[derive(Debug, Clone)]
pub struct ReadingProgress {
    pub position: Option<String>,
    pub at: DateTime<Utc>,
    pub duration_seconds: i64,
    pub end: bool,
}
