// Environment variable loading

use crate::loader::parse_scalar;
use crate::{ConfigError, Result};
use serde_json::Value;
use std::env;

/// Separator between nesting levels in variable names.
///
/// `EUFONY_SESSION__REDIS__HOST` maps to the path `session.redis.host`.
pub const NESTING_SEPARATOR: &str = "__";

/// Environment variable loader
pub struct EnvLoader {
    prefix: Option<String>,
}

impl EnvLoader {
    /// Create a new environment loader
    pub fn new(prefix: Option<String>) -> Self {
        Self { prefix }
    }

    /// Load all matching environment variables as `(dotted path, value)` pairs.
    pub fn load(&self) -> Result<Vec<(String, Value)>> {
        let mut entries = Vec::new();

        for (key, value) in env::vars() {
            let name = match self.prefix {
                Some(ref prefix) => match key.strip_prefix(prefix.as_str()) {
                    Some(rest) if rest.starts_with('_') => &rest[1..],
                    _ => continue,
                },
                None => key.as_str(),
            };

            if name.is_empty() {
                continue;
            }

            entries.push((Self::path_for(name), parse_scalar(&value)));
        }

        Ok(entries)
    }

    /// Load the variable backing a dotted configuration path.
    pub fn load_var(&self, path: &str) -> Result<String> {
        env::var(self.var_name(path)).map_err(ConfigError::EnvError)
    }

    /// Load with default value
    pub fn load_var_or(&self, path: &str, default: &str) -> String {
        self.load_var(path).unwrap_or_else(|_| default.to_string())
    }

    /// Environment variable name for a dotted configuration path.
    pub fn var_name(&self, path: &str) -> String {
        let name = path.replace('.', NESTING_SEPARATOR).to_uppercase();
        match self.prefix {
            Some(ref prefix) => format!("{}_{}", prefix, name),
            None => name,
        }
    }

    fn path_for(name: &str) -> String {
        name.split(NESTING_SEPARATOR)
            .map(|segment| segment.to_lowercase())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl Default for EnvLoader {
    fn default() -> Self {
        Self::new(None)
    }
}
