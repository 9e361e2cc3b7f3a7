//! Centralized default constants for libris.
//!
//! **This module is the single source of truth** for shared default values.
//! Crates reference these constants instead of defining their own magic numbers.

// =============================================================================
// PAGINATION
// =============================================================================

/// Page size used when a paged request omits `limit` or sends `limit <= 0`.
pub const PAGE_LIMIT: i64 = 20;

/// Upper bound for any requested page size.
pub const PAGE_LIMIT_MAX: i64 = 100;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;

// =============================================================================
// MEDIA LIBRARIES
// =============================================================================

/// Maximum library name length, in characters.
pub const MAX_LIBRARY_NAME_LEN: usize = 100;

/// Maximum library description length, in characters.
pub const MAX_LIBRARY_DESCRIPTION_LEN: usize = 1000;

/// Reserved name of the per-user system reading-history library.
pub const READING_HISTORY_LIBRARY_NAME: &str = "Reading History";

/// Fixed id of the computed "my uploads" library. Identity ids start at 1.
pub const VIRTUAL_LIBRARY_ID: i64 = 0;

/// Display name of the computed "my uploads" library.
pub const VIRTUAL_LIBRARY_NAME: &str = "My Uploads";

// =============================================================================
// TAGS
// =============================================================================

/// Maximum tag key/value length, in characters.
pub const MAX_TAG_PART_LEN: usize = 100;

// =============================================================================
// ACCOUNTS
// =============================================================================

/// Prefix of issued bearer access tokens.
pub const ACCESS_TOKEN_PREFIX: &str = "lb_at_";

/// Number of random characters after the access token prefix.
pub const ACCESS_TOKEN_SECRET_LEN: usize = 48;

/// Default access token lifetime in hours.
pub const ACCESS_TOKEN_TTL_HOURS: i64 = 24;

/// Username length bounds, in characters.
pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 64;

/// Minimum password length, in characters.
pub const PASSWORD_MIN_LEN: usize = 8;

// =============================================================================
// RATE LIMITING
// =============================================================================

/// Requests allowed per rate limit period.
pub const RATE_LIMIT_REQUESTS: u64 = 100;

/// Rate limit period in seconds.
pub const RATE_LIMIT_PERIOD_SECS: u64 = 60;

// =============================================================================
// DATABASE POOL
// =============================================================================

/// Upper bound on open PostgreSQL connections.
pub const DB_MAX_CONNECTIONS: u32 = 10;

/// Connections kept open while the server is idle.
pub const DB_MIN_CONNECTIONS: u32 = 1;

/// Seconds a request waits for a free connection before failing.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Seconds an unused connection stays open.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 600;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_limits_are_ordered() {
        assert!(PAGE_LIMIT > 0);
        assert!(PAGE_LIMIT <= PAGE_LIMIT_MAX);
        assert_eq!(PAGE_OFFSET, 0);
    }

    #[test]
    fn test_reserved_name_fits_name_limit() {
        assert!(READING_HISTORY_LIBRARY_NAME.chars().count() <= MAX_LIBRARY_NAME_LEN);
        assert!(VIRTUAL_LIBRARY_NAME.chars().count() <= MAX_LIBRARY_NAME_LEN);
    }

    #[test]
    fn test_pool_floor_below_ceiling() {
        assert!(DB_MIN_CONNECTIONS <= DB_MAX_CONNECTIONS);
    }

    #[test]
    fn test_username_bounds() {
        assert!(USERNAME_MIN_LEN < USERNAME_MAX_LEN);
    }
}
