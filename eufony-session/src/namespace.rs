//! Key partitioning within a shared session record.
//!
//! Every logical key is stored as `<partition>:<key>`. The partition is the
//! active [`Namespace`] for [`Scope::Namespace`] and the reserved `shared`
//! partition for [`Scope::Global`], so global writes resolve to the same
//! physical key from every namespace.

use crate::error::{SessionError, SessionResult};
use std::fmt;
use std::str::FromStr;

/// Partition that global-scope keys resolve into.
pub const GLOBAL_NAMESPACE: &str = "shared";

/// Separator between partition and logical key.
pub const KEY_SEPARATOR: char = ':';

/// Identifier used when the application does not partition its session.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Visibility of a session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// Private to the active namespace.
    #[default]
    Namespace,
    /// Shared by every namespace.
    Global,
}

impl Scope {
    /// `Global` when `global` is set, `Namespace` otherwise.
    pub fn global(global: bool) -> Self {
        if global { Scope::Global } else { Scope::Namespace }
    }
}

/// A validated partition identifier, e.g. one per subsite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Validate and wrap a namespace identifier.
    ///
    /// Identifiers must be non-empty, must not contain the key separator and
    /// must not be the reserved global partition.
    pub fn new(id: impl Into<String>) -> SessionResult<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(SessionError::InvalidNamespace(
                "namespace identifier cannot be empty".to_string(),
            ));
        }
        if id.contains(KEY_SEPARATOR) {
            return Err(SessionError::InvalidNamespace(format!(
                "'{}' contains the reserved separator '{}'",
                id, KEY_SEPARATOR
            )));
        }
        if id == GLOBAL_NAMESPACE {
            return Err(SessionError::InvalidNamespace(format!(
                "'{}' is reserved for global keys",
                id
            )));
        }

        Ok(Self(id))
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Physical key for `key` as seen from this namespace.
    pub fn resolve(&self, key: &str, scope: Scope) -> String {
        let partition = match scope {
            Scope::Global => GLOBAL_NAMESPACE,
            Scope::Namespace => self.0.as_str(),
        };
        format!("{}{}{}", partition, KEY_SEPARATOR, key)
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self(DEFAULT_NAMESPACE.to_string())
    }
}

impl FromStr for Namespace {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
