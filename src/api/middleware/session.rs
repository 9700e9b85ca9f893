use axum::extract::FromRef;
use secrecy::{ExposeSecret, Secret};
use sqlx::PgPool;
use tower_sessions::{cookie::Key, service::SignedCookie, Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::Config;
use crate::services::storage::MediaStore;

/// Session keys used in the application
pub const SESSION_KEY_ADMIN_ID: &str = "admin_id";
pub const SESSION_KEY_ADMIN_USERNAME: &str = "admin_username";

/// Session layer with signed cookies backed by PostgreSQL
pub type AppSessionLayer = SessionManagerLayer<PostgresStore, SignedCookie>;

/// Minimum secret length accepted for signing session cookies
const MIN_SECRET_LEN: usize = 32;

/// Creates a session layer for Axum
pub async fn create_session_layer(
    pool: PgPool,
    session_secret: &Secret<String>,
    base_url: &str,
) -> anyhow::Result<AppSessionLayer> {
    let secret = session_secret.expose_secret().as_bytes();
    if secret.len() < MIN_SECRET_LEN {
        anyhow::bail!("SESSION_SECRET must be at least {} bytes", MIN_SECRET_LEN);
    }

    // Create the session store backed by PostgreSQL
    let session_store = PostgresStore::new(pool);
    session_store.migrate().await?;

    // Build the session layer
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(base_url.starts_with("https://"))
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::hours(24)))
        .with_signed(signing_key(secret));

    Ok(session_layer)
}

/// Expands the configured secret to the 64-byte master key cookie signing needs
pub fn signing_key(secret: &[u8]) -> Key {
    let digest = ring::digest::digest(&ring::digest::SHA512, secret);
    Key::from(digest.as_ref())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub media: MediaStore,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let media = MediaStore::new(config.upload_dir.clone());
        Self {
            pool,
            config,
            media,
        }
    }
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.pool.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_key_is_stable_per_secret() {
        let secret = "k".repeat(MIN_SECRET_LEN);

        let first = signing_key(secret.as_bytes());
        let second = signing_key(secret.as_bytes());
        let other = signing_key("j".repeat(MIN_SECRET_LEN).as_bytes());

        assert_eq!(first.master(), second.master());
        assert_ne!(first.master(), other.master());
        assert_eq!(first.master().len(), 64);
    }
}
