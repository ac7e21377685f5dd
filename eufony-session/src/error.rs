//! Error types for session operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Broad classification of a [`SessionError`].
///
/// Configuration errors surface at startup and are never retried. Storage
/// errors are fatal for the current request. Neither is a cache miss: an
/// absent key is `None`, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The process is misconfigured.
    Configuration,
    /// The backing store could not be read or written.
    Storage,
    /// A value could not be encoded or decoded.
    Data,
}

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Sessions are switched off by the host environment
    #[error("Sessions are disabled by the host environment")]
    Disabled,

    /// Backend name not present in the registry
    #[error("Unknown session backend: {0}")]
    UnknownBackend(String),

    /// Backend selected but not compiled into this build
    #[error("Session backend '{0}' is not enabled in this build")]
    BackendUnavailable(&'static str),

    /// Required backend parameter absent
    #[error("Missing required session parameter: {0}")]
    MissingParameter(String),

    /// Namespace identifier rejected
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration source error
    #[error("Configuration error: {0}")]
    ConfigSource(#[from] eufony_config::ConfigError),

    /// Filesystem error
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Redis-specific error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Memcached-specific error
    #[cfg(feature = "memcached")]
    #[error("Memcached error: {0}")]
    Memcached(#[from] memcache::MemcacheError),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Invalid session token
    #[error("Invalid session token: {0}")]
    InvalidToken(String),
}

impl SessionError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Disabled
            | Self::UnknownBackend(_)
            | Self::BackendUnavailable(_)
            | Self::MissingParameter(_)
            | Self::InvalidNamespace(_)
            | Self::Config(_)
            | Self::ConfigSource(_) => ErrorKind::Configuration,
            Self::Io { .. } | Self::Connection(_) => ErrorKind::Storage,
            #[cfg(feature = "redis")]
            Self::Redis(_) => ErrorKind::Storage,
            #[cfg(feature = "memcached")]
            Self::Memcached(_) => ErrorKind::Storage,
            Self::Serialization(_) | Self::Deserialization(_) | Self::InvalidToken(_) => {
                ErrorKind::Data
            }
        }
    }

    /// Whether this is a startup misconfiguration.
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    /// Whether the backing store failed.
    pub fn is_storage(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}
