//! Local filesystem session storage.
//!
//! One JSON file per token (`sess_<token>`) in the session directory.
//! Writes go through a temporary file and an atomic rename, so a reader
//! never observes a torn record; concurrent writers are last-writer-wins.

use crate::backend::SaveLocation;
use crate::error::{SessionError, SessionResult};
use crate::traits::{SessionRecord, SessionStore, is_valid_token};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, warn};

const FILE_PREFIX: &str = "sess_";

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    expires_at: DateTime<Utc>,
    record: SessionRecord,
}

/// File-backed session store.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Create a store over an existing directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, token: &str) -> SessionResult<PathBuf> {
        if !is_valid_token(token) {
            return Err(SessionError::InvalidToken(token.to_string()));
        }
        Ok(self.dir.join(format!("{}{}", FILE_PREFIX, token)))
    }

    async fn remove_file(&self, path: &Path) -> SessionResult<bool> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SessionError::io(path, e)),
        }
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn location(&self) -> SaveLocation {
        SaveLocation::Path(self.dir.clone())
    }

    async fn load(&self, token: &str) -> SessionResult<Option<SessionRecord>> {
        let path = self.record_path(token)?;

        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::io(&path, e)),
        };

        let stored: StoredRecord = serde_json::from_str(&json)
            .map_err(|e| SessionError::Deserialization(e.to_string()))?;

        if stored.expires_at <= Utc::now() {
            self.remove_file(&path).await?;
            return Ok(None);
        }

        Ok(Some(stored.record))
    }

    async fn save(&self, record: &SessionRecord, ttl: Duration) -> SessionResult<()> {
        let path = self.record_path(&record.token)?;

        let stored = StoredRecord {
            expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default(),
            record: record.clone(),
        };
        let json = serde_json::to_vec(&stored)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        let tmp = self
            .dir
            .join(format!(".{}{}.{}", FILE_PREFIX, record.token, uuid::Uuid::new_v4().simple()));

        fs::write(&tmp, &json)
            .await
            .map_err(|e| SessionError::io(&tmp, e))?;

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(SessionError::io(&path, e));
        }

        debug!(path = ?path, size = json.len(), "Stored session file");
        Ok(())
    }

    async fn destroy(&self, token: &str) -> SessionResult<()> {
        let path = self.record_path(token)?;
        self.remove_file(&path).await?;
        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> SessionResult<usize> {
        let cutoff = SystemTime::now()
            .checked_sub(max_lifetime)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| SessionError::io(&self.dir, e))?;

        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessionError::io(&self.dir, e))?
        {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(FILE_PREFIX) {
                continue;
            }

            let modified = match entry.metadata().await.and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) => {
                    // Raced with a concurrent destroy or another sweeper.
                    warn!(path = ?entry.path(), error = %e, "Skipping unreadable session file");
                    continue;
                }
            };

            if modified <= cutoff && self.remove_file(&entry.path()).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, dir = ?self.dir, "Collected expired session files");
        }

        Ok(removed)
    }
}
