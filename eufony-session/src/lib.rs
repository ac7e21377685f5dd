//! Session lifecycle management for Eufony applications.
//!
//! A [`SessionManager`] is built once from configuration. It picks a storage
//! backend, validates its parameters and prepares the save location. Each
//! request then calls [`SessionManager::start`], which resumes or creates the
//! session, applies the idle timeout and hands back a [`Session`] scoped to a
//! [`Namespace`].
//!
//! Keys live either in the caller's namespace or in the global `shared`
//! namespace visible to every component.
//!
//! # Features
//!
//! - `redis` - Redis session storage (enabled by default)
//! - `memcached` - Memcached session storage (requires opt-in)
//!
//! The `files` backend is always available.
//!
//! # Examples
//!
//! ## Files Backend From Configuration
//!
//! ```no_run
//! use eufony_config::ConfigManager;
//! use eufony_session::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let config = ConfigManager::with_prefix("EUFONY");
//!     config.load_env()?;
//!
//!     let manager = SessionManager::from_config(&config).await?;
//!
//!     // Per request: read the token cookie, start, work, save.
//!     let token = token_from_header("EUFONYSESSID=0123; theme=dark", manager.cookie_name());
//!     let mut session = manager.start(token.as_deref(), Namespace::new("blog")?).await?;
//!
//!     session.set("last_post", 42, Scope::Namespace)?;
//!     let user = identity::ensure_user_id(&mut session)?;
//!     println!("user {}", user);
//!
//!     let cookie = session.save().await?;
//!     println!("Set-Cookie: {}", cookie);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Redis Backend
//!
//! ```no_run
//! use eufony_session::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let backend = BackendConfig::Redis(RemoteParams::new("localhost", 6379).with_database(1));
//!     let settings = SessionSettings::new(backend)
//!         .with_timeout(Duration::from_secs(1800))
//!         .with_user_identity();
//!
//!     let manager = SessionManager::new(settings).await?;
//!     let session = manager.start(None, Namespace::default()).await?;
//!     session.destroy().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod clock;
pub mod config;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod file_session;
pub mod identity;
pub mod manager;
pub mod memory_session;
pub mod namespace;
pub mod traits;

#[cfg(feature = "redis")]
pub mod redis_session;

#[cfg(feature = "memcached")]
pub mod memcached_session;

pub use backend::{SaveLocation, open_store};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BackendConfig, CarryOver, CookieSettings, GcSettings, RemoteParams, SessionBackendKind,
    SessionSettings,
};
pub use cookie::{SameSite, SessionCookie, token_from_header};
pub use engine::SessionEngine;
pub use error::{ErrorKind, SessionError, SessionResult};
pub use file_session::FileSessionStore;
pub use manager::{LAST_ACTIVITY_KEY, Session, SessionManager, USER_ID_KEY};
pub use memory_session::MemorySessionStore;
pub use namespace::{GLOBAL_NAMESPACE, Namespace, Scope};
pub use traits::{SessionRecord, SessionStore, generate_token};

#[cfg(feature = "redis")]
pub use redis_session::RedisSessionStore;

#[cfg(feature = "memcached")]
pub use memcached_session::MemcachedSessionStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{BackendConfig, RemoteParams, SessionSettings};
    pub use crate::cookie::{SessionCookie, token_from_header};
    pub use crate::error::{SessionError, SessionResult};
    pub use crate::identity::{ensure_user_id, user_id};
    pub use crate::manager::{Session, SessionManager};
    pub use crate::namespace::{Namespace, Scope};
    pub use crate::traits::{SessionRecord, SessionStore};

    #[cfg(feature = "redis")]
    pub use crate::redis_session::RedisSessionStore;

    #[cfg(feature = "memcached")]
    pub use crate::memcached_session::MemcachedSessionStore;
}
