// Configuration errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration key not found: {0}")]
    KeyNotFound(String),

    /// A source could not be read
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    /// A source was read but is not valid for its format
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Empty dotted path or empty path segment
    #[error("Invalid configuration path: '{0}'")]
    InvalidPath(String),

    #[error("Cannot store value: {0}")]
    SerializationError(String),

    /// Present, but not of the requested type
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Environment variable error: {0}")]
    EnvError(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
