//! Access control predicates for media libraries.
//!
//! Membership changes (add/remove items) are allowed on system libraries;
//! only metadata updates and deletion are system-locked.

use crate::error::{Error, Result};
use crate::models::{Library, UserId};

/// Public libraries are readable by anyone, private ones only by their owner.
pub fn is_readable(library: &Library, requester: Option<UserId>) -> bool {
    library.is_public || is_owner(library, requester)
}

pub fn is_owner(library: &Library, requester: Option<UserId>) -> bool {
    matches!((library.owner_id, requester), (Some(owner), Some(user)) if owner == user)
}

pub fn is_system_locked(library: &Library) -> bool {
    library.is_system
}

pub fn ensure_readable(library: &Library, requester: Option<UserId>) -> Result<()> {
    if is_readable(library, requester) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("Library {} is private", library.id)))
    }
}

pub fn ensure_owner(library: &Library, requester: UserId) -> Result<()> {
    if is_owner(library, Some(requester)) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!(
            "Not the owner of library {}",
            library.id
        )))
    }
}

pub fn ensure_not_system(library: &Library) -> Result<()> {
    if is_system_locked(library) {
        Err(Error::Forbidden(format!(
            "Library {} is a system library and is locked",
            library.id
        )))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn library(owner: Option<UserId>, is_public: bool, is_system: bool) -> Library {
        let now = Utc::now();
        Library {
            id: 1,
            name: "L".to_string(),
            description: None,
            is_public,
            is_system,
            owner_id: owner,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_public_library_readable_by_anyone() {
        let lib = library(Some(1), true, false);
        assert!(is_readable(&lib, None));
        assert!(is_readable(&lib, Some(2)));
    }

    #[test]
    fn test_private_library_readable_only_by_owner() {
        let lib = library(Some(1), false, false);
        assert!(is_readable(&lib, Some(1)));
        assert!(!is_readable(&lib, Some(2)));
        assert!(!is_readable(&lib, None));
        assert!(matches!(
            ensure_readable(&lib, Some(2)),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_ownerless_library_has_no_owner() {
        let lib = library(None, false, false);
        assert!(!is_owner(&lib, Some(1)));
        assert!(ensure_owner(&lib, 1).is_err());
    }

    #[test]
    fn test_owner_check() {
        let lib = library(Some(5), true, false);
        assert!(ensure_owner(&lib, 5).is_ok());
        assert!(matches!(ensure_owner(&lib, 6), Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_system_lock() {
        assert!(ensure_not_system(&library(Some(1), false, false)).is_ok());
        let err = ensure_not_system(&library(Some(1), false, true)).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(err.to_string().contains("locked"));
    }
}
