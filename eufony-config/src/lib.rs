//! Configuration management for the Eufony framework.
//!
//! Values live in a single nested tree and are addressed by dotted paths
//! (`session.redis.host`). Sources are layered in the order they are loaded;
//! later sources override earlier ones key by key.
//!
//! ```
//! use eufony_config::ConfigManager;
//!
//! let config = ConfigManager::new();
//! config.set("session.timeout", 900).unwrap();
//!
//! let timeout: Option<u64> = config.get_opt("session.timeout").unwrap();
//! assert_eq!(timeout, Some(900));
//! assert!(!config.has("session.backend"));
//! ```

pub mod env;
pub mod error;
pub mod loader;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Main configuration manager
#[derive(Clone)]
pub struct ConfigManager {
    root: Arc<RwLock<Value>>,
    env_prefix: Option<String>,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self {
            root: Arc::new(RwLock::new(Value::Object(Map::new()))),
            env_prefix: None,
        }
    }

    /// Create with environment variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: Some(prefix.into()),
            ..Self::new()
        }
    }

    /// Create from an already parsed tree. The value must be an object.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(ConfigError::ParseError(
                "Top-level configuration must be an object".to_string(),
            ));
        }

        Ok(Self {
            root: Arc::new(RwLock::new(value)),
            env_prefix: None,
        })
    }

    /// Load configuration from environment variables
    pub fn load_env(&self) -> Result<()> {
        let loader = EnvLoader::new(self.env_prefix.clone());
        let entries = loader.load()?;

        let mut root = self.root.write();
        for (path, value) in entries {
            insert_path(&mut root, &path, value)?;
        }

        Ok(())
    }

    /// Load configuration from .env file
    pub fn load_dotenv(&self, path: Option<&Path>) -> Result<()> {
        if let Some(path) = path {
            dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
        } else {
            dotenvy::dotenv().ok(); // Ignore if .env doesn't exist
        }
        self.load_env()
    }

    /// Load configuration from file
    pub fn load_file(&self, path: impl AsRef<Path>, format: FileFormat) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::new(format).load_file(path)?;

        merge_values(&mut self.root.write(), data);
        debug!(path = %path.display(), ?format, "Loaded configuration file");

        Ok(())
    }

    /// Load configuration from file, detecting the format by extension
    pub fn load_file_auto(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = ConfigLoader::auto(path)?.load_file(path)?;

        merge_values(&mut self.root.write(), data);
        debug!(path = %path.display(), "Loaded configuration file");

        Ok(())
    }

    /// Set a configuration value
    pub fn set<T: serde::Serialize>(&self, path: &str, value: T) -> Result<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| ConfigError::SerializationError(e.to_string()))?;

        insert_path(&mut self.root.write(), path, json_value)
    }

    /// Remove a configuration value, returning it if present.
    pub fn remove(&self, path: &str) -> Option<Value> {
        let mut root = self.root.write();
        let (parent, leaf) = match path.rsplit_once('.') {
            Some((parent, leaf)) => (lookup_path_mut(&mut root, parent)?, leaf),
            None => (&mut *root, path),
        };

        parent.as_object_mut()?.remove(leaf)
    }

    /// Get a configuration value
    pub fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_opt(path)?
            .ok_or_else(|| ConfigError::KeyNotFound(path.to_string()))
    }

    /// Get a configuration value, `None` when the path is absent or null.
    ///
    /// A present value of the wrong type is an error rather than `None`.
    pub fn get_opt<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let root = self.root.read();

        match lookup_path(&root, path) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: path.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Get a configuration value with default
    pub fn get_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        self.get_opt(path).ok().flatten().unwrap_or(default)
    }

    /// Get a string value. Scalars are accepted in their text form.
    pub fn get_string(&self, path: &str) -> Result<String> {
        self.get_string_opt(path)?
            .ok_or_else(|| ConfigError::KeyNotFound(path.to_string()))
    }

    /// Get a string value, `None` when absent or null.
    ///
    /// Environment and `.env` sources type values eagerly, so a numeric or
    /// boolean scalar is turned back into its text form. Arrays and tables
    /// are an error.
    pub fn get_string_opt(&self, path: &str) -> Result<Option<String>> {
        match lookup_path(&self.root.read(), path) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(scalar @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(scalar.to_string())),
            Some(_) => Err(ConfigError::InvalidValue {
                key: path.to_string(),
                message: "expected a string, found a table or list".to_string(),
            }),
        }
    }

    /// Get an integer value
    pub fn get_int(&self, path: &str) -> Result<i64> {
        self.get(path)
    }

    /// Get a boolean value
    pub fn get_bool(&self, path: &str) -> Result<bool> {
        self.get(path)
    }

    /// Check if a path exists
    pub fn has(&self, path: &str) -> bool {
        lookup_path(&self.root.read(), path).is_some()
    }

    /// Snapshot of the subtree at `path`.
    pub fn section(&self, path: &str) -> Option<Value> {
        lookup_path(&self.root.read(), path).cloned()
    }

    /// Merge configuration from another manager; `other` wins on conflicts.
    pub fn merge(&self, other: &ConfigManager) {
        let incoming = other.root.read().clone();
        merge_values(&mut self.root.write(), incoming);
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ConfigError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Write `value` at the dotted `path`, creating intermediate tables.
/// A scalar in the way of a deeper path is replaced by a table.
pub(crate) fn insert_path(root: &mut Value, path: &str, value: Value) -> Result<()> {
    let segments = split_path(path)?;
    let (leaf, parents) = segments
        .split_last()
        .ok_or_else(|| ConfigError::InvalidPath(path.to_string()))?;

    let mut node = root;
    for segment in parents {
        node = ensure_object(node)
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    ensure_object(node).insert(leaf.to_string(), value);

    Ok(())
}

fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    split_path(path)
        .ok()?
        .into_iter()
        .try_fold(root, |node, segment| node.as_object()?.get(segment))
}

fn lookup_path_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    split_path(path)
        .ok()?
        .into_iter()
        .try_fold(root, |node, segment| node.as_object_mut()?.get_mut(segment))
}

fn merge_values(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, incoming) => *base = incoming,
    }
}
