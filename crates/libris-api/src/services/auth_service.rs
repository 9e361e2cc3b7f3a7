//! Account registration, password login and opaque bearer tokens.
//!
//! Passwords are stored as Argon2id PHC strings. Access tokens are
//! `lb_at_` followed by random alphanumerics; only their SHA-256 hex digest
//! reaches the token store.

use std::sync::Arc;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use utoipa::ToSchema;

use libris_core::defaults::{
    ACCESS_TOKEN_PREFIX, ACCESS_TOKEN_SECRET_LEN, PASSWORD_MIN_LEN, USERNAME_MAX_LEN,
    USERNAME_MIN_LEN,
};
use libris_core::{Error, Result, TokenRepository, User, UserId, UserRepository};

use super::LibraryService;

const INVALID_CREDENTIALS: &str = "Invalid username or password";

/// Body of `POST /auth/register` and `POST /auth/login`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Issued bearer token.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<dyn TokenRepository>,
    libraries: LibraryService,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<dyn TokenRepository>,
        libraries: LibraryService,
        token_ttl_hours: i64,
    ) -> Self {
        Self {
            users,
            tokens,
            libraries,
            token_ttl: Duration::hours(token_ttl_hours),
        }
    }

    /// Create an account and provision its reading-history library.
    pub async fn register(&self, creds: Credentials) -> Result<User> {
        let username = validate_username(&creds.username)?;
        if creds.password.chars().count() < PASSWORD_MIN_LEN {
            return Err(Error::InvalidInput(format!(
                "Password must be at least {} characters",
                PASSWORD_MIN_LEN
            )));
        }

        let password_hash = hash_password(&creds.password)?;
        let user = self.users.create(&username, &password_hash).await?;
        self.libraries.ensure_reading_history(user.id).await?;

        info!(
            subsystem = "api",
            component = "auth",
            op = "register",
            user_id = user.id,
            "User registered"
        );
        Ok(user)
    }

    pub async fn login(&self, creds: Credentials) -> Result<AccessToken> {
        let username = creds.username.trim();
        let Some(stored) = self.users.find_credentials(username).await? else {
            return Err(Error::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };
        if !verify_password(&creds.password, &stored.password_hash)? {
            return Err(Error::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let token = format!(
            "{}{}",
            ACCESS_TOKEN_PREFIX,
            generate_secret(ACCESS_TOKEN_SECRET_LEN)
        );
        let expires_at = Utc::now() + self.token_ttl;
        self.tokens
            .store(stored.user.id, &hash_token(&token), expires_at)
            .await?;

        info!(
            subsystem = "api",
            component = "auth",
            op = "login",
            user_id = stored.user.id,
            "Access token issued"
        );
        Ok(AccessToken {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_at,
        })
    }

    /// Resolve a presented bearer token to its user, if valid and unexpired.
    pub async fn authenticate(&self, token: &str) -> Result<Option<UserId>> {
        if !token.starts_with(ACCESS_TOKEN_PREFIX) {
            debug!(subsystem = "api", component = "auth", "Unrecognized token format");
            return Ok(None);
        }
        self.tokens.resolve(&hash_token(token), Utc::now()).await
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.tokens.revoke(&hash_token(token)).await
    }

    pub async fn me(&self, user_id: UserId) -> Result<User> {
        self.users
            .get(user_id)
            .await?
            .ok_or_else(|| Error::Unauthorized("Authentication required".to_string()))
    }
}

fn validate_username(raw: &str) -> Result<String> {
    let username = raw.trim();
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err(Error::InvalidInput(format!(
            "Username must be between {} and {} characters",
            USERNAME_MIN_LEN, USERNAME_MAX_LEN
        )));
    }
    Ok(username.to_string())
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| Error::Internal(format!("Failed to encode salt: {}", e)))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| Error::Internal(format!("Malformed password hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Generate a random alphanumeric secret.
fn generate_secret(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::TagResolver;
    use libris_core::defaults::READING_HISTORY_LIBRARY_NAME;
    use libris_core::mock::MemoryStore;
    use libris_core::LibraryRepository;

    fn service() -> (Arc<MemoryStore>, AuthService) {
        let store = Arc::new(MemoryStore::new());
        let libraries = LibraryService::new(
            store.clone(),
            store.clone(),
            TagResolver::new(store.clone()),
        );
        let auth = AuthService::new(store.clone(), store.clone(), libraries, 24);
        (store, auth)
    }

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_generate_secret_is_alphanumeric() {
        let secret = generate_secret(48);
        assert_eq!(secret.len(), 48);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(secret, generate_secret(48));
    }

    #[test]
    fn test_hash_token_is_sha256_hex() {
        let digest = hash_token("lb_at_abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("lb_at_abc"));
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let (_, auth) = service();
        assert!(matches!(
            auth.register(creds("ab", "longenough")).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
        assert!(matches!(
            auth.register(creds("alice", "short")).await.unwrap_err(),
            Error::InvalidInput(_)
        ));
    }

    #[tokio::test]
    async fn test_register_provisions_reading_history_and_login_works() {
        let (store, auth) = service();
        let user = auth.register(creds(" alice ", "password1")).await.unwrap();
        assert_eq!(user.username, "alice");

        let history = store
            .find_by_owner_and_name(user.id, READING_HISTORY_LIBRARY_NAME)
            .await
            .unwrap()
            .unwrap();
        assert!(history.is_system);

        let dup = auth.register(creds("alice", "password1")).await.unwrap_err();
        assert!(matches!(dup, Error::Conflict(_)));

        let token = auth.login(creds("alice", "password1")).await.unwrap();
        assert!(token.access_token.starts_with(ACCESS_TOKEN_PREFIX));
        assert_eq!(token.token_type, "Bearer");
        assert_eq!(
            auth.authenticate(&token.access_token).await.unwrap(),
            Some(user.id)
        );

        auth.logout(&token.access_token).await.unwrap();
        assert_eq!(auth.authenticate(&token.access_token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_login_failures_share_message() {
        let (_, auth) = service();
        auth.register(creds("bob", "password1")).await.unwrap();

        let unknown = auth.login(creds("nobody", "password1")).await.unwrap_err();
        let wrong = auth.login(creds("bob", "password2")).await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(wrong, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_unknown_token_is_anonymous() {
        let (_, auth) = service();
        assert_eq!(auth.authenticate("lb_at_nope").await.unwrap(), None);
        assert_eq!(auth.authenticate("garbage").await.unwrap(), None);
    }
}
