// Eufony - configuration and session lifecycle for Rust web applications
//
// This library re-exports the Eufony crates behind feature flags so an
// application can depend on a single crate.

// Re-export configuration
pub use eufony_config as config;
pub use eufony_config::{ConfigError, ConfigManager};

// Re-export optional crates
#[cfg(feature = "session")]
pub use eufony_session as session;

#[cfg(feature = "session")]
pub use eufony_session::{Namespace, Scope, Session, SessionError, SessionManager};

/// Build a [`ConfigManager`] from an optional file, then `.env` and the
/// process environment under `prefix`.
pub fn load_config(
    prefix: &str,
    file: Option<&std::path::Path>,
) -> Result<ConfigManager, ConfigError> {
    let config = ConfigManager::with_prefix(prefix);

    if let Some(path) = file {
        config.load_file_auto(path)?;
    }
    config.load_dotenv(None)?;

    Ok(config)
}

pub mod prelude {
    pub use eufony_config::ConfigManager;

    #[cfg(feature = "session")]
    pub use eufony_session::prelude::*;
}
