//! Redis session storage implementation.

use crate::backend::SaveLocation;
use crate::error::{SessionError, SessionResult};
use crate::traits::{SessionRecord, SessionStore, ttl_secs};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::info;

/// Key prefix for session records.
pub const DEFAULT_KEY_PREFIX: &str = "eufony:session";

/// Redis-backed session store.
///
/// Records are stored with `SET EX`, so Redis expires abandoned sessions
/// on its own and [`SessionStore::gc`] has nothing to do. Writes replace the
/// whole record (last writer wins).
///
/// # Examples
///
/// ```no_run
/// use eufony_session::{RedisSessionStore, SessionStore};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisSessionStore::connect("redis://localhost:6379").await?;
/// assert!(!store.exists("0123456789abcdef0123456789abcdef").await?);
/// # Ok(())
/// # }
/// ```
pub struct RedisSessionStore {
    conn: ConnectionManager,
    uri: String,
    prefix: String,
}

impl RedisSessionStore {
    /// Connect to the Redis server at `uri`.
    ///
    /// Connection failures are storage errors.
    pub async fn connect(uri: &str) -> SessionResult<Self> {
        let client = redis::Client::open(uri).map_err(|e| SessionError::Config(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;

        info!(location = %SaveLocation::Uri(uri.to_string()), "Connected Redis session store");

        Ok(Self {
            conn,
            uri: uri.to_string(),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    /// Use a different key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn session_key(&self, token: &str) -> String {
        format!("{}:{}", self.prefix, token)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    fn location(&self) -> SaveLocation {
        SaveLocation::Uri(self.uri.clone())
    }

    async fn load(&self, token: &str) -> SessionResult<Option<SessionRecord>> {
        let mut conn = self.conn.clone();
        let data: Option<String> = conn.get(self.session_key(token)).await?;

        data.map(|json| SessionRecord::from_json(&json)).transpose()
    }

    async fn save(&self, record: &SessionRecord, ttl: Duration) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        let json = record.to_json()?;

        let _: () = conn
            .set_ex(self.session_key(&record.token), json, ttl_secs(ttl))
            .await?;

        Ok(())
    }

    async fn destroy(&self, token: &str) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.session_key(token)).await?;

        Ok(())
    }

    async fn gc(&self, _max_lifetime: Duration) -> SessionResult<usize> {
        // Redis expires keys itself
        Ok(0)
    }

    async fn exists(&self, token: &str) -> SessionResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(self.session_key(token)).await?)
    }
}
