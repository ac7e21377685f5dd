//! Backend location resolution.
//!
//! Each [`BackendConfig`] variant turns its parameters into a
//! [`SaveLocation`]; [`open_store`] then attaches the matching record store
//! to that location. Adding a backend means adding a variant, a registry
//! entry and a store.

use crate::config::{BackendConfig, RemoteParams, SessionBackendKind};
use crate::error::{SessionError, SessionResult};
use crate::file_session::FileSessionStore;
use crate::traits::SessionStore;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// Directory under the storage root that holds session files.
pub const SESSION_DIR: &str = "sessions";

/// Where a backend keeps its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveLocation {
    /// A directory on the local filesystem
    Path(PathBuf),
    /// A connection URI for a remote cache
    Uri(String),
    /// Process memory
    Memory,
}

impl fmt::Display for SaveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveLocation::Path(path) => write!(f, "{}", path.display()),
            SaveLocation::Uri(uri) => f.write_str(&redact(uri)),
            SaveLocation::Memory => f.write_str("memory"),
        }
    }
}

/// Hide the credential of a URI for logging.
fn redact(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(mut url) if url.password().is_some() => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => uri.to_string(),
    }
}

impl BackendConfig {
    /// Resolve the location records are persisted to.
    ///
    /// For `files` this creates the session directory if it is missing and
    /// fails with a storage error when that is not possible. Remote backends
    /// fail with a configuration error when host or port is absent; no
    /// connection is attempted here.
    pub async fn resolve_location(&self) -> SessionResult<SaveLocation> {
        match self {
            BackendConfig::Files { storage_root } => {
                ensure_session_dir(storage_root).await.map(SaveLocation::Path)
            }
            BackendConfig::Redis(params) => {
                remote_uri("redis", "session.redis", params, true).map(SaveLocation::Uri)
            }
            BackendConfig::Memcached(params) => {
                remote_uri("memcache", "session.memcached", params, false).map(SaveLocation::Uri)
            }
        }
    }
}

async fn ensure_session_dir(storage_root: &Path) -> SessionResult<PathBuf> {
    let dir = storage_root.join(SESSION_DIR);

    let exists = fs::try_exists(&dir)
        .await
        .map_err(|e| SessionError::io(&dir, e))?;

    if !exists {
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| SessionError::io(&dir, e))?;
        info!(path = ?dir, "Created session directory");
    } else if !fs::metadata(&dir)
        .await
        .map_err(|e| SessionError::io(&dir, e))?
        .is_dir()
    {
        return Err(SessionError::io(
            &dir,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "not a directory"),
        ));
    }

    Ok(dir)
}

/// Build the connection URI. Credential and database index are Redis only;
/// the memcache client ignores both, so they are left out of its URI.
fn remote_uri(
    scheme: &str,
    section: &str,
    params: &RemoteParams,
    is_redis: bool,
) -> SessionResult<String> {
    let host = params
        .host
        .as_deref()
        .filter(|h| !h.trim().is_empty())
        .ok_or_else(|| SessionError::MissingParameter(format!("{}.host", section)))?;
    let port = params
        .port
        .ok_or_else(|| SessionError::MissingParameter(format!("{}.port", section)))?;

    let host = host.trim();
    let authority = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };

    let mut url = url::Url::parse(&format!("{}://{}", scheme, authority))
        .map_err(|e| SessionError::Config(format!("invalid {} host '{}': {}", section, host, e)))?;

    match params.password {
        Some(ref password) if is_redis => {
            url.set_password(Some(password))
                .map_err(|_| SessionError::Config(format!("cannot set {}.password", section)))?;
        }
        Some(_) => warn!("{}.password is not supported and is ignored", section),
        None => {}
    }

    if is_redis && let Some(db) = params.database {
        url.set_path(&format!("/{}", db));
    }

    Ok(url.to_string())
}

/// Open the record store for `backend` at an already resolved `location`.
pub async fn open_store(
    backend: &BackendConfig,
    location: &SaveLocation,
) -> SessionResult<Arc<dyn SessionStore>> {
    debug!(backend = %backend.kind(), %location, "Opening session store");

    match (backend.kind(), location) {
        (SessionBackendKind::Files, SaveLocation::Path(dir)) => {
            Ok(Arc::new(FileSessionStore::new(dir.clone())))
        }
        #[cfg(feature = "redis")]
        (SessionBackendKind::Redis, SaveLocation::Uri(uri)) => Ok(Arc::new(
            crate::redis_session::RedisSessionStore::connect(uri).await?,
        )),
        #[cfg(not(feature = "redis"))]
        (SessionBackendKind::Redis, _) => Err(SessionError::BackendUnavailable("redis")),
        #[cfg(feature = "memcached")]
        (SessionBackendKind::Memcached, SaveLocation::Uri(uri)) => Ok(Arc::new(
            crate::memcached_session::MemcachedSessionStore::connect(uri).await?,
        )),
        #[cfg(not(feature = "memcached"))]
        (SessionBackendKind::Memcached, _) => {
            Err(SessionError::BackendUnavailable("memcached"))
        }
        (kind, location) => Err(SessionError::Config(format!(
            "backend '{}' cannot use location {}",
            kind, location
        ))),
    }
}
