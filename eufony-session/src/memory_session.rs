//! In-process session storage.
//!
//! Useful for tests and single-process deployments. Records are lost when
//! the process exits.

use crate::backend::SaveLocation;
use crate::error::SessionResult;
use crate::traits::{SessionRecord, SessionStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Entry {
    record: SessionRecord,
    saved_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Memory-backed session store.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, Entry>>,
    gc_runs: AtomicUsize,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// How many times [`SessionStore::gc`] has run.
    pub fn gc_runs(&self) -> usize {
        self.gc_runs.load(Ordering::Relaxed)
    }

    /// Store a record synchronously, replacing any previous one.
    ///
    /// Lets callers seed state such as an old activity timestamp.
    pub fn insert(&self, record: SessionRecord, ttl: Duration) {
        let now = Utc::now();
        self.entries.write().insert(
            record.token.clone(),
            Entry {
                record,
                saved_at: now,
                expires_at: now + chrono::Duration::from_std(ttl).unwrap_or_default(),
            },
        );
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn location(&self) -> SaveLocation {
        SaveLocation::Memory
    }

    async fn load(&self, token: &str) -> SessionResult<Option<SessionRecord>> {
        let now = Utc::now();
        let mut entries = self.entries.write();

        match entries.get(token) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.record.clone())),
            Some(_) => {
                entries.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save(&self, record: &SessionRecord, ttl: Duration) -> SessionResult<()> {
        self.insert(record.clone(), ttl);
        Ok(())
    }

    async fn destroy(&self, token: &str) -> SessionResult<()> {
        self.entries.write().remove(token);
        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> SessionResult<usize> {
        self.gc_runs.fetch_add(1, Ordering::Relaxed);

        let cutoff = Utc::now() - chrono::Duration::from_std(max_lifetime).unwrap_or_default();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.saved_at > cutoff);

        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::generate_token;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemorySessionStore::new();
        let mut record = SessionRecord::new(generate_token());
        record.insert("default:x", json!(1));

        store.save(&record, Duration::from_secs(60)).await.unwrap();

        assert_eq!(store.load(&record.token).await.unwrap(), Some(record));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_record_is_absent() {
        let store = MemorySessionStore::new();
        let record = SessionRecord::new(generate_token());
        store.insert(record.clone(), Duration::ZERO);

        assert_eq!(store.load(&record.token).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_gc() {
        let store = MemorySessionStore::new();
        store
            .save(&SessionRecord::new(generate_token()), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.gc(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(store.gc(Duration::ZERO).await.unwrap(), 1);
        assert_eq!(store.gc_runs(), 2);
    }
}
