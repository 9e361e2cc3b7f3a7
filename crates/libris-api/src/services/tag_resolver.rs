//! Service for resolving client tag specs to persisted tags.
//!
//! ## Resolution
//!
//! For each `{key, value, shown?}` spec, in input order:
//! 1. Trim key and value; reject empty or over-long parts
//! 2. Reuse a tag already resolved earlier in the same call
//! 3. Otherwise upsert through the tag store (`shown` defaults to true)
//!
//! The output has one tag per input spec, so duplicate specs map to the same
//! tag. Storage failures propagate unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use libris_core::defaults::MAX_TAG_PART_LEN;
use libris_core::{Error, Result, Tag, TagRepository, TagSpec};

#[derive(Clone)]
pub struct TagResolver {
    tags: Arc<dyn TagRepository>,
}

impl TagResolver {
    pub fn new(tags: Arc<dyn TagRepository>) -> Self {
        Self { tags }
    }

    pub async fn resolve(&self, specs: &[TagSpec]) -> Result<Vec<Tag>> {
        let mut resolved: HashMap<(String, String), Tag> = HashMap::new();
        let mut out = Vec::with_capacity(specs.len());

        for spec in specs {
            let key = normalize_part("key", &spec.key)?;
            let value = normalize_part("value", &spec.value)?;

            if let Some(tag) = resolved.get(&(key.clone(), value.clone())) {
                out.push(tag.clone());
                continue;
            }

            let tag = self
                .tags
                .find_or_create(&key, &value, spec.shown.unwrap_or(true))
                .await?;
            resolved.insert((key, value), tag.clone());
            out.push(tag);
        }

        Ok(out)
    }

    /// Resolve and return distinct tag ids, first occurrence first.
    pub async fn resolve_ids(&self, specs: &[TagSpec]) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = Vec::with_capacity(specs.len());
        for tag in self.resolve(specs).await? {
            if !ids.contains(&tag.id) {
                ids.push(tag.id);
            }
        }
        Ok(ids)
    }

    pub async fn list(&self, key: Option<&str>) -> Result<Vec<Tag>> {
        let key = key.map(str::trim).filter(|k| !k.is_empty());
        self.tags.list(key).await
    }
}

fn normalize_part(field: &str, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput(format!("Tag {} must not be empty", field)));
    }
    if trimmed.chars().count() > MAX_TAG_PART_LEN {
        return Err(Error::InvalidInput(format!(
            "Tag {} must be at most {} characters",
            field, MAX_TAG_PART_LEN
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_core::mock::MemoryStore;

    fn resolver() -> (Arc<MemoryStore>, TagResolver) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), TagResolver::new(store))
    }

    #[tokio::test]
    async fn test_resolve_preserves_order_and_reuses_pairs() {
        let (store, resolver) = resolver();
        let tags = resolver
            .resolve(&[
                TagSpec::new("genre", "sf"),
                TagSpec::new("lang", "en"),
                TagSpec::new("genre", "sf"),
            ])
            .await
            .unwrap();

        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0].key, "genre");
        assert_eq!(tags[1].key, "lang");
        assert_eq!(tags[0].id, tags[2].id);
        assert_eq!(store.tag_count(), 2);
    }

    #[tokio::test]
    async fn test_existing_tag_is_reused_across_calls() {
        let (store, resolver) = resolver();
        let first = resolver.resolve(&[TagSpec::new("genre", "sf")]).await.unwrap();
        let second = resolver
            .resolve(&[TagSpec::new(" genre ", "sf ")])
            .await
            .unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(store.tag_count(), 1);
    }

    #[tokio::test]
    async fn test_shown_defaults_to_true() {
        let (_, resolver) = resolver();
        let mut hidden = TagSpec::new("internal", "x");
        hidden.shown = Some(false);
        let tags = resolver
            .resolve(&[TagSpec::new("genre", "sf"), hidden])
            .await
            .unwrap();
        assert!(tags[0].shown);
        assert!(!tags[1].shown);
    }

    #[tokio::test]
    async fn test_empty_parts_rejected() {
        let (_, resolver) = resolver();
        let err = resolver
            .resolve(&[TagSpec::new("genre", "  ")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_resolve_ids_dedups() {
        let (_, resolver) = resolver();
        let ids = resolver
            .resolve_ids(&[
                TagSpec::new("a", "1"),
                TagSpec::new("b", "2"),
                TagSpec::new("a", "1"),
            ])
            .await
            .unwrap();
        assert_eq!(ids.len(), 2);
    }
}
