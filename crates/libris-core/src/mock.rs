//! In-memory store implementing every repository trait (for tests).
//!
//! Mirrors the PostgreSQL schema's guarantees: identity ids start at 1,
//! `(owner, name)` and membership pairs are unique, and deleting a library
//! removes its items and any items nesting it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::{Error, Result};
use crate::models::*;
use crate::pagination::Page;
use crate::traits::*;

#[derive(Debug, Clone)]
struct BookRow {
    id: i64,
    content_hash: String,
    title: String,
    author: Option<String>,
    description: Option<String>,
    uploader_id: UserId,
    tag_ids: Vec<i64>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct LibraryRow {
    id: i64,
    name: String,
    description: Option<String>,
    is_public: bool,
    is_system: bool,
    owner_id: Option<UserId>,
    tag_ids: Vec<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct TokenRow {
    user_id: UserId,
    expires_at: DateTime<Utc>,
    revoked: bool,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    ticks: i64,
    tags: Vec<Tag>,
    books: Vec<BookRow>,
    libraries: Vec<LibraryRow>,
    items: Vec<LibraryItem>,
    users: Vec<UserCredentials>,
    tokens: HashMap<String, TokenRow>,
    records: Vec<ReadingRecord>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps so "newest first" ordering is deterministic.
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        base_time() + Duration::milliseconds(self.ticks)
    }

    fn tags_for(&self, ids: &[i64]) -> Vec<Tag> {
        ids.iter()
            .filter_map(|id| self.tags.iter().find(|t| t.id == *id).cloned())
            .collect()
    }

    fn library(&self, row: &LibraryRow) -> Library {
        Library {
            id: row.id,
            name: row.name.clone(),
            description: row.description.clone(),
            is_public: row.is_public,
            is_system: row.is_system,
            owner_id: row.owner_id,
            tags: self.tags_for(&row.tag_ids),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn book(&self, row: &BookRow) -> Book {
        Book {
            id: row.id,
            content_hash: row.content_hash.clone(),
            title: row.title.clone(),
            author: row.author.clone(),
            description: row.description.clone(),
            uploader_id: row.uploader_id,
            tags: self.tags_for(&row.tag_ids).iter().map(TagPair::from).collect(),
            created_at: row.created_at,
            updated_at: row.created_at,
        }
    }

    fn insert_library(&mut self, req: NewLibrary) -> Result<i64> {
        let duplicate = self
            .libraries
            .iter()
            .any(|l| l.owner_id == Some(req.owner_id) && l.name == req.name);
        if duplicate {
            return Err(Error::Conflict(format!(
                "Library '{}' already exists",
                req.name
            )));
        }
        let id = self.next_id();
        let now = self.now();
        let mut tag_ids = req.tag_ids;
        dedup_in_order(&mut tag_ids);
        self.libraries.push(LibraryRow {
            id,
            name: req.name,
            description: req.description,
            is_public: req.is_public,
            is_system: req.is_system,
            owner_id: Some(req.owner_id),
            tag_ids,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    fn insert_item(&mut self, library_id: i64, target: ItemTarget) -> Result<LibraryItem> {
        if self
            .items
            .iter()
            .any(|i| i.library_id == library_id && i.target == target)
        {
            return Err(Error::Conflict(format!(
                "Library {} already contains this item",
                library_id
            )));
        }
        let item = LibraryItem {
            id: self.next_id(),
            library_id,
            target,
            added_at: self.now(),
        };
        self.items.push(item.clone());
        Ok(item)
    }

    fn item_view(&self, item: &LibraryItem) -> Option<LibraryItemView> {
        let content = match item.target {
            ItemTarget::Book { book_id } => {
                let row = self.books.iter().find(|b| b.id == book_id)?;
                ItemContent::Book {
                    book: self.book(row).brief(),
                }
            }
            ItemTarget::ChildLibrary { child_library_id } => {
                let row = self.libraries.iter().find(|l| l.id == child_library_id)?;
                ItemContent::Library {
                    library: LibraryBrief {
                        id: row.id,
                        name: row.name.clone(),
                        is_public: row.is_public,
                        is_system: row.is_system,
                    },
                }
            }
        };
        Some(LibraryItemView {
            id: item.id,
            added_at: item.added_at,
            content,
        })
    }
}

fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_767_225_600, 0).unwrap_or_default()
}

fn dedup_in_order(ids: &mut Vec<i64>) {
    let mut seen = Vec::with_capacity(ids.len());
    ids.retain(|id| {
        if seen.contains(id) {
            false
        } else {
            seen.push(*id);
            true
        }
    });
}

fn window<T>(rows: Vec<T>, page: Option<Page>) -> Vec<T> {
    match page {
        None => rows,
        Some(p) => rows
            .into_iter()
            .skip(p.skip as usize)
            .take(p.take as usize)
            .collect(),
    }
}

/// Thread-safe in-memory backing store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store poisoned".to_string()))
    }

    /// Insert a user directly, bypassing password hashing.
    pub fn seed_user(&self, username: &str) -> Result<User> {
        let mut state = self.lock()?;
        let user = User {
            id: state.next_id(),
            username: username.to_string(),
            created_at: state.now(),
        };
        state.users.push(UserCredentials {
            user: user.clone(),
            password_hash: String::new(),
        });
        Ok(user)
    }

    /// Insert a system library directly.
    pub fn seed_system_library(&self, owner_id: UserId, name: &str) -> Result<i64> {
        self.lock()?.insert_library(NewLibrary {
            owner_id,
            name: name.to_string(),
            description: None,
            is_public: false,
            is_system: true,
            tag_ids: Vec::new(),
        })
    }

    pub fn library_count(&self) -> usize {
        self.lock().map(|s| s.libraries.len()).unwrap_or(0)
    }

    pub fn item_count(&self) -> usize {
        self.lock().map(|s| s.items.len()).unwrap_or(0)
    }

    pub fn tag_count(&self) -> usize {
        self.lock().map(|s| s.tags.len()).unwrap_or(0)
    }
}

#[async_trait]
impl TagRepository for MemoryStore {
    async fn find_or_create(&self, key: &str, value: &str, shown: bool) -> Result<Tag> {
        let mut state = self.lock()?;
        if let Some(tag) = state.tags.iter().find(|t| t.key == key && t.value == value) {
            return Ok(tag.clone());
        }
        let now = state.now();
        let tag = Tag {
            id: state.next_id(),
            key: key.to_string(),
            value: value.to_string(),
            shown,
            created_at: now,
            updated_at: now,
        };
        state.tags.push(tag.clone());
        Ok(tag)
    }

    async fn list(&self, key: Option<&str>) -> Result<Vec<Tag>> {
        let state = self.lock()?;
        let mut tags: Vec<Tag> = state
            .tags
            .iter()
            .filter(|t| key.map_or(true, |k| t.key == k))
            .cloned()
            .collect();
        tags.sort_by(|a, b| (&a.key, &a.value).cmp(&(&b.key, &b.value)));
        Ok(tags)
    }
}

#[async_trait]
impl LibraryRepository for MemoryStore {
    async fn create(&self, req: NewLibrary) -> Result<Library> {
        let mut state = self.lock()?;
        let id = state.insert_library(req)?;
        let row = state
            .libraries
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| Error::Internal("inserted library vanished".to_string()))?;
        Ok(state.library(&row))
    }

    async fn create_with_books(&self, req: NewLibrary, book_ids: &[i64]) -> Result<Library> {
        let mut state = self.lock()?;
        // Validate everything before mutating so a failure leaves no rows behind.
        if state
            .libraries
            .iter()
            .any(|l| l.owner_id == Some(req.owner_id) && l.name == req.name)
        {
            return Err(Error::Conflict(format!(
                "Library '{}' already exists",
                req.name
            )));
        }
        let id = state.insert_library(req)?;
        for book_id in book_ids {
            state.insert_item(id, ItemTarget::Book { book_id: *book_id })?;
        }
        let row = state
            .libraries
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| Error::Internal("inserted library vanished".to_string()))?;
        Ok(state.library(&row))
    }

    async fn get(&self, id: i64) -> Result<Option<Library>> {
        let state = self.lock()?;
        Ok(state
            .libraries
            .iter()
            .find(|l| l.id == id)
            .map(|row| state.library(row)))
    }

    async fn find_by_owner_and_name(
        &self,
        owner_id: UserId,
        name: &str,
    ) -> Result<Option<Library>> {
        let state = self.lock()?;
        Ok(state
            .libraries
            .iter()
            .find(|l| l.owner_id == Some(owner_id) && l.name == name)
            .map(|row| state.library(row)))
    }

    async fn list_by_owner(&self, owner_id: UserId) -> Result<Vec<Library>> {
        let state = self.lock()?;
        let mut rows: Vec<&LibraryRow> = state
            .libraries
            .iter()
            .filter(|l| l.owner_id == Some(owner_id))
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(rows.into_iter().map(|row| state.library(row)).collect())
    }

    async fn update(&self, id: i64, changes: LibraryChanges) -> Result<Library> {
        let mut state = self.lock()?;
        let now = state.now();
        let owner_id = state
            .libraries
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.owner_id)
            .ok_or_else(|| Error::NotFound(format!("Library {} not found", id)))?;
        if let Some(name) = &changes.name {
            if state
                .libraries
                .iter()
                .any(|l| l.id != id && l.owner_id == owner_id && &l.name == name)
            {
                return Err(Error::Conflict(format!("Library '{}' already exists", name)));
            }
        }
        let row = state
            .libraries
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| Error::NotFound(format!("Library {} not found", id)))?;
        if let Some(name) = changes.name {
            row.name = name;
        }
        if let Some(description) = changes.description {
            row.description = description;
        }
        if let Some(is_public) = changes.is_public {
            row.is_public = is_public;
        }
        if let Some(mut tag_ids) = changes.tag_ids {
            dedup_in_order(&mut tag_ids);
            row.tag_ids = tag_ids;
        }
        row.updated_at = now;
        let row = row.clone();
        Ok(state.library(&row))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut state = self.lock()?;
        state.libraries.retain(|l| l.id != id);
        state.items.retain(|i| {
            i.library_id != id && i.target != ItemTarget::ChildLibrary { child_library_id: id }
        });
        Ok(())
    }

    async fn count_items(&self, library_id: i64) -> Result<i64> {
        let state = self.lock()?;
        Ok(state
            .items
            .iter()
            .filter(|i| i.library_id == library_id)
            .count() as i64)
    }

    async fn list_items(
        &self,
        library_id: i64,
        page: Option<Page>,
    ) -> Result<Vec<LibraryItemView>> {
        let state = self.lock()?;
        let mut items: Vec<&LibraryItem> = state
            .items
            .iter()
            .filter(|i| i.library_id == library_id)
            .collect();
        items.sort_by(|a, b| (b.added_at, b.id).cmp(&(a.added_at, a.id)));
        let views = items
            .into_iter()
            .filter_map(|item| state.item_view(item))
            .collect();
        Ok(window(views, page))
    }

    async fn book_ids(&self, library_id: i64) -> Result<Vec<i64>> {
        let state = self.lock()?;
        let mut items: Vec<&LibraryItem> = state
            .items
            .iter()
            .filter(|i| i.library_id == library_id)
            .collect();
        items.sort_by(|a, b| (a.added_at, a.id).cmp(&(b.added_at, b.id)));
        Ok(items.iter().filter_map(|i| i.target.book_id()).collect())
    }

    async fn find_item(&self, library_id: i64, target: ItemTarget) -> Result<Option<LibraryItem>> {
        let state = self.lock()?;
        Ok(state
            .items
            .iter()
            .find(|i| i.library_id == library_id && i.target == target)
            .cloned())
    }

    async fn get_item(&self, item_id: i64) -> Result<Option<LibraryItem>> {
        let state = self.lock()?;
        Ok(state.items.iter().find(|i| i.id == item_id).cloned())
    }

    async fn add_item(&self, library_id: i64, target: ItemTarget) -> Result<LibraryItem> {
        self.lock()?.insert_item(library_id, target)
    }

    async fn remove_item(&self, item_id: i64) -> Result<()> {
        self.lock()?.items.retain(|i| i.id != item_id);
        Ok(())
    }
}

#[async_trait]
impl BookRepository for MemoryStore {
    async fn create(&self, req: NewBook) -> Result<Book> {
        let mut state = self.lock()?;
        if state.books.iter().any(|b| b.content_hash == req.content_hash) {
            return Err(Error::Conflict(format!(
                "Book with hash {} already exists",
                req.content_hash
            )));
        }
        let mut tag_ids = req.tag_ids;
        dedup_in_order(&mut tag_ids);
        let row = BookRow {
            id: state.next_id(),
            content_hash: req.content_hash,
            title: req.title,
            author: req.author,
            description: req.description,
            uploader_id: req.uploader_id,
            tag_ids,
            created_at: state.now(),
        };
        state.books.push(row.clone());
        Ok(state.book(&row))
    }

    async fn get(&self, id: i64) -> Result<Option<Book>> {
        let state = self.lock()?;
        Ok(state
            .books
            .iter()
            .find(|b| b.id == id)
            .map(|row| state.book(row)))
    }

    async fn count_by_uploader(&self, uploader_id: UserId) -> Result<i64> {
        let state = self.lock()?;
        Ok(state
            .books
            .iter()
            .filter(|b| b.uploader_id == uploader_id)
            .count() as i64)
    }

    async fn list_by_uploader(&self, uploader_id: UserId, page: Option<Page>) -> Result<Vec<Book>> {
        let state = self.lock()?;
        let mut rows: Vec<&BookRow> = state
            .books
            .iter()
            .filter(|b| b.uploader_id == uploader_id)
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        let books = rows.into_iter().map(|row| state.book(row)).collect();
        Ok(window(books, page))
    }

    async fn latest_by_uploader(&self, uploader_id: UserId) -> Result<Option<Book>> {
        Ok(self
            .list_by_uploader(uploader_id, Some(Page { take: 1, skip: 0 }))
            .await?
            .into_iter()
            .next())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create(&self, username: &str, password_hash: &str) -> Result<User> {
        let mut state = self.lock()?;
        if state.users.iter().any(|u| u.user.username == username) {
            return Err(Error::Conflict(format!(
                "Username '{}' is already taken",
                username
            )));
        }
        let user = User {
            id: state.next_id(),
            username: username.to_string(),
            created_at: state.now(),
        };
        state.users.push(UserCredentials {
            user: user.clone(),
            password_hash: password_hash.to_string(),
        });
        Ok(user)
    }

    async fn get(&self, id: UserId) -> Result<Option<User>> {
        let state = self.lock()?;
        Ok(state
            .users
            .iter()
            .find(|u| u.user.id == id)
            .map(|u| u.user.clone()))
    }

    async fn find_credentials(&self, username: &str) -> Result<Option<UserCredentials>> {
        let state = self.lock()?;
        Ok(state
            .users
            .iter()
            .find(|u| u.user.username == username)
            .cloned())
    }
}

#[async_trait]
impl TokenRepository for MemoryStore {
    async fn store(
        &self,
        user_id: UserId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.lock()?.tokens.insert(
            token_hash.to_string(),
            TokenRow {
                user_id,
                expires_at,
                revoked: false,
            },
        );
        Ok(())
    }

    async fn resolve(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<UserId>> {
        let state = self.lock()?;
        Ok(state
            .tokens
            .get(token_hash)
            .filter(|t| !t.revoked && t.expires_at > now)
            .map(|t| t.user_id))
    }

    async fn revoke(&self, token_hash: &str) -> Result<()> {
        if let Some(token) = self.lock()?.tokens.get_mut(token_hash) {
            token.revoked = true;
        }
        Ok(())
    }
}

#[async_trait]
impl ReadingRecordRepository for MemoryStore {
    async fn start(
        &self,
        user_id: UserId,
        book_id: i64,
        position: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ReadingRecord> {
        let mut state = self.lock()?;
        let record = ReadingRecord {
            id: state.next_id(),
            user_id,
            book_id,
            position: position.map(str::to_string),
            started_at: at,
            last_heartbeat_at: at,
            ended_at: None,
            duration_seconds: 0,
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<ReadingRecord>> {
        let state = self.lock()?;
        Ok(state.records.iter().find(|r| r.id == id).cloned())
    }

    async fn record_progress(&self, id: i64, progress: ReadingProgress) -> Result<ReadingRecord> {
        let mut state = self.lock()?;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::NotFound(format!("Reading record {} not found", id)))?;
        if let Some(position) = progress.position {
            record.position = Some(position);
        }
        record.last_heartbeat_at = progress.at;
        record.duration_seconds = progress.duration_seconds;
        if progress.end {
            record.ended_at = Some(progress.at);
        }
        Ok(record.clone())
    }

    async fn list(
        &self,
        user_id: UserId,
        book_id: Option<i64>,
        page: Page,
    ) -> Result<Vec<ReadingRecord>> {
        let state = self.lock()?;
        let mut records: Vec<ReadingRecord> = state
            .records
            .iter()
            .filter(|r| r.user_id == user_id && book_id.map_or(true, |b| r.book_id == b))
            .cloned()
            .collect();
        records.sort_by(|a, b| (b.started_at, b.id).cmp(&(a.started_at, a.id)));
        Ok(window(records, Some(page)))
    }

    async fn count(&self, user_id: UserId, book_id: Option<i64>) -> Result<i64> {
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .filter(|r| r.user_id == user_id && book_id.map_or(true, |b| r.book_id == b))
            .count() as i64)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }
}
