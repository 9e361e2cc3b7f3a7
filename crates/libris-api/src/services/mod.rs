//! Service layer for business logic.

pub mod auth_service;
pub mod library_service;
pub mod reading_service;
pub mod tag_resolver;

pub use auth_service::{AccessToken, AuthService, Credentials};
pub use library_service::LibraryService;
pub use reading_service::ReadingService;
pub use tag_resolver::TagResolver;
