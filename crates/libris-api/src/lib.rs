//! libris-api - HTTP API for media library aggregation
//!
//! Library crate behind the `libris-api` binary: services, handlers, auth
//! extractors and the router, so the whole HTTP surface can be driven in
//! tests over any store implementing the `libris-core` traits.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod services;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
    Json, Router,
};
use governor::{Quota, RateLimiter};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use uuid::Uuid;

use libris_core::{
    BookRepository, Error, LibraryRepository, ReadingRecordRepository, Result, StoreHealth,
    TagRepository, TokenRepository, UserRepository,
};
use libris_db::Database;

pub use config::ServerConfig;
pub use error::ApiError;
use handlers::{auth, books, health, libraries, reading_records, tags};
use services::{AuthService, LibraryService, ReadingService, TagResolver};

/// Requests are small JSON documents.
const MAX_BODY_BYTES: usize = 1024 * 1024;

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Global rate limiter type (direct quota, no per-client bucketing).
pub type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// The storage backends the services run on.
#[derive(Clone)]
pub struct Stores {
    pub libraries: Arc<dyn LibraryRepository>,
    pub books: Arc<dyn BookRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub reading_records: Arc<dyn ReadingRecordRepository>,
    pub health: Arc<dyn StoreHealth>,
}

impl Stores {
    pub fn postgres(db: &Database) -> Self {
        Self {
            libraries: Arc::new(db.libraries.clone()),
            books: Arc::new(db.books.clone()),
            tags: Arc::new(db.tags.clone()),
            users: Arc::new(db.users.clone()),
            tokens: Arc::new(db.tokens.clone()),
            reading_records: Arc::new(db.reading_records.clone()),
            health: Arc::new(db.clone()),
        }
    }

    /// Every store served by one shared backend.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: LibraryRepository
            + BookRepository
            + TagRepository
            + UserRepository
            + TokenRepository
            + ReadingRecordRepository
            + StoreHealth
            + 'static,
    {
        Self {
            libraries: store.clone(),
            books: store.clone(),
            tags: store.clone(),
            users: store.clone(),
            tokens: store.clone(),
            reading_records: store.clone(),
            health: store,
        }
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub tag_resolver: TagResolver,
    pub libraries: LibraryService,
    pub auth: AuthService,
    pub reading: ReadingService,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(stores: Stores, config: &ServerConfig) -> Result<Self> {
        let tag_resolver = TagResolver::new(stores.tags.clone());
        let libraries = LibraryService::new(
            stores.libraries.clone(),
            stores.books.clone(),
            tag_resolver.clone(),
        );
        let auth = AuthService::new(
            stores.users.clone(),
            stores.tokens.clone(),
            libraries.clone(),
            config.access_token_ttl_hours,
        );
        let reading = ReadingService::new(
            stores.reading_records.clone(),
            stores.books.clone(),
            stores.libraries.clone(),
        );

        Ok(Self {
            stores,
            tag_resolver,
            libraries,
            auth,
            reading,
            rate_limiter: build_rate_limiter(config)?,
        })
    }
}

fn build_rate_limiter(config: &ServerConfig) -> Result<Option<Arc<GlobalRateLimiter>>> {
    if !config.rate_limit_enabled {
        return Ok(None);
    }
    let burst = u32::try_from(config.rate_limit_requests)
        .ok()
        .and_then(NonZeroU32::new)
        .ok_or_else(|| Error::Config("RATE_LIMIT_REQUESTS must be a positive u32".to_string()))?;
    let quota = Quota::with_period(Duration::from_secs(config.rate_limit_period_secs))
        .ok_or_else(|| Error::Config("RATE_LIMIT_PERIOD_SECS must be non-zero".to_string()))?
        .allow_burst(burst);
    Ok(Some(Arc::new(RateLimiter::direct(quota))))
}

// =============================================================================
// OPENAPI
// =============================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Libris API",
        description = "Media libraries over a shared book catalogue"
    ),
    components(schemas(
        libris_core::Tag,
        libris_core::TagSpec,
        libris_core::TagPair,
        libris_core::CreateLibraryRequest,
        libris_core::UpdateLibraryRequest,
        libris_core::LibraryInfo,
        libris_core::LibrarySummary,
        libris_core::LibraryDetail,
        libris_core::LibraryItemView,
        libris_core::ItemContent,
        libris_core::BookBrief,
        libris_core::LibraryBrief,
        libris_core::CopiedLibrary,
        libris_core::Ack,
        libris_core::Book,
        libris_core::User,
        libris_core::ReadingRecord,
        services::Credentials,
        services::AccessToken,
        books::CreateBookRequest,
        reading_records::StartReadingRequest,
        reading_records::ProgressRequest,
    )),
    tags(
        (name = "Libraries", description = "Media library aggregation"),
        (name = "Books", description = "Book catalogue"),
        (name = "Reading", description = "Reading sessions"),
        (name = "Auth", description = "Accounts and bearer tokens"),
    )
)]
pub struct ApiDoc;

// =============================================================================
// ROUTER
// =============================================================================

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api-docs/openapi.json", get(health::openapi_json))
        // Accounts
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/logout", post(auth::logout))
        // Books and tags
        .route("/books", post(books::create_book))
        .route("/books/my", get(books::list_my_books))
        .route("/books/:id", get(books::get_book))
        .route("/tags", get(tags::list_tags))
        // Reading sessions
        .route("/reading-records", post(reading_records::start_reading))
        .route("/reading-records/my", get(reading_records::list_my_reading))
        .route("/reading-records/last", get(reading_records::last_reading))
        .route(
            "/reading-records/:id/heartbeat",
            patch(reading_records::heartbeat),
        )
        .route("/reading-records/:id/end", post(reading_records::end_reading))
        // Media libraries
        .route("/media-libraries", post(libraries::create_library))
        .route("/media-libraries/my", get(libraries::list_my_libraries))
        .route(
            "/media-libraries/virtual/my-uploaded",
            get(libraries::get_virtual_uploaded),
        )
        .route(
            "/media-libraries/reading-record",
            get(libraries::get_reading_history),
        )
        .route(
            "/media-libraries/:id",
            get(libraries::get_library)
                .patch(libraries::update_library)
                .delete(libraries::delete_library),
        )
        .route(
            "/media-libraries/:id/books/:book_id",
            post(libraries::add_book),
        )
        .route(
            "/media-libraries/:id/libraries/:child_id",
            post(libraries::add_library),
        )
        .route(
            "/media-libraries/:id/items/:item_id",
            delete(libraries::remove_item),
        )
        .route("/media-libraries/:id/copy", post(libraries::copy_library))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.allowed_origins.clone()))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .allow_credentials(true)
                .max_age(Duration::from_secs(3600)),
        )
        .layer(CatchPanicLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

// =============================================================================
// RATE LIMITING MIDDLEWARE
// =============================================================================

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> std::result::Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            tracing::warn!(subsystem = "api", component = "rate_limit", "Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "error_description": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_disabled() {
        let config = ServerConfig {
            rate_limit_enabled: false,
            ..ServerConfig::default()
        };
        assert!(build_rate_limiter(&config).unwrap().is_none());
    }

    #[test]
    fn test_rate_limiter_rejects_zero_values() {
        let zero_requests = ServerConfig {
            rate_limit_requests: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            build_rate_limiter(&zero_requests),
            Err(Error::Config(_))
        ));

        let zero_period = ServerConfig {
            rate_limit_period_secs: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            build_rate_limiter(&zero_period),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_request_ids_are_uuid_v7() {
        let request = axum::http::Request::new(());
        let id = MakeRequestUuidV7
            .make_request_id(&request)
            .unwrap();
        let parsed = Uuid::parse_str(id.header_value().to_str().unwrap()).unwrap();
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn test_openapi_lists_library_schemas() {
        let doc = ApiDoc::openapi();
        let schemas = doc.components.unwrap().schemas;
        assert!(schemas.contains_key("LibraryDetail"));
        assert!(schemas.contains_key("CopiedLibrary"));
    }
}
