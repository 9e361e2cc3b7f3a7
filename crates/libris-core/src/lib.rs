//! # libris-core
//!
//! Core types, traits, and rules for the libris media-library service.
//!
//! This crate provides the domain models, the repository traits implemented by
//! `libris-db`, the shared pagination rules, and the library access predicates.
//! It has no I/O of its own.

pub mod access;
pub mod defaults;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod models;
pub mod pagination;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use pagination::{Page, PageQuery, Paged};
pub use traits::*;
