//! HTTP handler modules for libris-api.

pub mod auth;
pub mod books;
pub mod health;
pub mod libraries;
pub mod reading_records;
pub mod tags;
