//! Memcached session storage implementation.
//!
//! This module requires the `memcached` feature flag.

use crate::backend::SaveLocation;
use crate::error::SessionResult;
use crate::traits::{SessionRecord, SessionStore, ttl_secs};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Key prefix for session records. Memcached keys cannot contain spaces.
pub const DEFAULT_KEY_PREFIX: &str = "eufony:session";

const RELATIVE_EXPIRY_LIMIT: u64 = 60 * 60 * 24 * 30;

/// Memcached-backed session store.
///
/// Like Redis, records carry a native expiry and writes are last-writer-wins.
///
/// # Feature Flag
///
/// ```toml
/// [dependencies]
/// eufony-session = { version = "0.1", features = ["memcached"] }
/// ```
pub struct MemcachedSessionStore {
    client: Arc<Mutex<memcache::Client>>,
    uri: String,
}

impl MemcachedSessionStore {
    /// Connect to the Memcached server at `uri` (`memcache://host:port`).
    pub async fn connect(uri: &str) -> SessionResult<Self> {
        let client = memcache::connect(uri)?;

        info!(location = %uri, "Connected Memcached session store");

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            uri: uri.to_string(),
        })
    }

    fn session_key(token: &str) -> String {
        format!("{}:{}", DEFAULT_KEY_PREFIX, token)
    }

    /// Memcached reads expirations above 30 days as absolute unix times.
    fn expiration(ttl: Duration) -> u32 {
        let secs = ttl_secs(ttl);
        let value = if secs > RELATIVE_EXPIRY_LIMIT {
            chrono::Utc::now().timestamp().max(0) as u64 + secs
        } else {
            secs
        };
        u32::try_from(value).unwrap_or(u32::MAX)
    }
}

#[async_trait]
impl SessionStore for MemcachedSessionStore {
    fn location(&self) -> SaveLocation {
        SaveLocation::Uri(self.uri.clone())
    }

    async fn load(&self, token: &str) -> SessionResult<Option<SessionRecord>> {
        let client = self.client.lock().await;
        let data: Option<String> = client.get(&Self::session_key(token))?;

        data.map(|json| SessionRecord::from_json(&json)).transpose()
    }

    async fn save(&self, record: &SessionRecord, ttl: Duration) -> SessionResult<()> {
        let json = record.to_json()?;
        let expiration = Self::expiration(ttl);

        let client = self.client.lock().await;
        client.set(&Self::session_key(&record.token), json.as_str(), expiration)?;

        Ok(())
    }

    async fn destroy(&self, token: &str) -> SessionResult<()> {
        let client = self.client.lock().await;

        // Memcached delete returns false if key doesn't exist, which is fine
        client.delete(&Self::session_key(token))?;

        Ok(())
    }

    async fn gc(&self, _max_lifetime: Duration) -> SessionResult<usize> {
        // Memcached automatically expires keys
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::generate_token;

    #[test]
    fn test_session_key() {
        assert!(MemcachedSessionStore::session_key("abc").starts_with("eufony:session:"));
    }

    #[test]
    fn test_long_ttl_becomes_absolute() {
        assert_eq!(MemcachedSessionStore::expiration(Duration::from_secs(900)), 900);

        let long = Duration::from_secs(RELATIVE_EXPIRY_LIMIT + 1);
        assert!(u64::from(MemcachedSessionStore::expiration(long)) > RELATIVE_EXPIRY_LIMIT * 2);
    }

    // Requires a running Memcached: cargo test --features memcached -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_memcached_round_trip() {
        let store = MemcachedSessionStore::connect("memcache://localhost:11211")
            .await
            .unwrap();
        let record = SessionRecord::new(generate_token());

        store.save(&record, Duration::from_secs(30)).await.unwrap();
        assert_eq!(store.load(&record.token).await.unwrap(), Some(record.clone()));

        store.destroy(&record.token).await.unwrap();
        assert_eq!(store.load(&record.token).await.unwrap(), None);
    }
}
