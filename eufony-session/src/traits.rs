//! Session record and store trait definition.

use crate::backend::SaveLocation;
use crate::error::{SessionError, SessionResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Persisted session state.
///
/// Keys are fully qualified (`namespace:key`); the record itself knows
/// nothing about namespaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque session token
    pub token: String,
    /// Session data as key-value pairs
    pub data: HashMap<String, serde_json::Value>,
    /// Session creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last write timestamp
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Create an empty record for `token`.
    pub fn new(token: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            token: token.into(),
            data: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Get a raw value.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Insert a raw value.
    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Check if a key exists in the session data.
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the record holds no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encode for storage.
    pub fn to_json(&self) -> SessionResult<String> {
        serde_json::to_string(self).map_err(|e| SessionError::Serialization(e.to_string()))
    }

    /// Decode from storage.
    pub fn from_json(json: &str) -> SessionResult<Self> {
        serde_json::from_str(json).map_err(|e| SessionError::Deserialization(e.to_string()))
    }
}

/// Physical storage for session records.
///
/// Stores are last-writer-wins: `save` replaces the whole record, so two
/// concurrent requests carrying the same token each persist their own view
/// and the later save discards the earlier one's changes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Where records are kept.
    fn location(&self) -> SaveLocation;

    /// Load a record by token.
    ///
    /// Returns `Ok(None)` if the record does not exist or has expired.
    async fn load(&self, token: &str) -> SessionResult<Option<SessionRecord>>;

    /// Save/replace a record, to be reclaimed after `ttl` without writes.
    async fn save(&self, record: &SessionRecord, ttl: Duration) -> SessionResult<()>;

    /// Delete a record. Deleting an absent record is not an error.
    async fn destroy(&self, token: &str) -> SessionResult<()>;

    /// Reclaim records untouched for longer than `max_lifetime`.
    ///
    /// Returns the number of records removed. Backends with native expiry
    /// report `0`.
    async fn gc(&self, max_lifetime: Duration) -> SessionResult<usize>;

    /// Check if a live record exists.
    async fn exists(&self, token: &str) -> SessionResult<bool> {
        Ok(self.load(token).await?.is_some())
    }
}

/// Generate a new unique session token.
pub fn generate_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Whether `token` has the shape of a token issued by [`generate_token`].
///
/// Anything else presented by a client is treated as no token at all.
pub fn is_valid_token(token: &str) -> bool {
    token.len() == 32 && token.bytes().all(|b| b.is_ascii_hexdigit())
}

/// TTL in whole seconds, never below one.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
