//! Session configuration.

use crate::cookie::SameSite;
use crate::error::{SessionError, SessionResult};
use crate::namespace::Scope;
use eufony_config::ConfigManager;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// How long a record outlives the idle timeout, so the reset can still
/// read its carry-over keys.
pub const RETENTION_GRACE: Duration = Duration::from_secs(1440);

/// Record retention when no idle timeout is set.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60 * 24 * 30);

/// Default name of the token cookie.
pub const DEFAULT_COOKIE_NAME: &str = "EUFONYSESSID";

/// Session backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBackendKind {
    /// Records as files under the application's private storage root
    Files,
    /// Redis backend
    Redis,
    /// Memcached backend
    Memcached,
}

/// Registered backend names.
const BACKEND_REGISTRY: &[(&str, SessionBackendKind)] = &[
    ("files", SessionBackendKind::Files),
    ("redis", SessionBackendKind::Redis),
    ("memcached", SessionBackendKind::Memcached),
];

impl SessionBackendKind {
    /// Look up a backend by its registered name.
    pub fn from_name(name: &str) -> SessionResult<Self> {
        let wanted = name.trim();
        BACKEND_REGISTRY
            .iter()
            .find(|(registered, _)| registered.eq_ignore_ascii_case(wanted))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| SessionError::UnknownBackend(name.to_string()))
    }

    /// Registered name of this backend.
    pub fn name(&self) -> &'static str {
        BACKEND_REGISTRY
            .iter()
            .find(|(_, kind)| kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    /// All registered backend names.
    pub fn names() -> impl Iterator<Item = &'static str> {
        BACKEND_REGISTRY.iter().map(|(name, _)| *name)
    }
}

impl fmt::Display for SessionBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Connection parameters for a remote cache backend.
///
/// Fields stay optional here so that a missing value is reported when the
/// backend location is resolved, with the exact parameter name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    /// Database index (Redis only)
    pub database: Option<u8>,
}

impl RemoteParams {
    /// Parameters with both required fields set.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Default::default()
        }
    }

    /// Set the credential.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the database index.
    pub fn with_database(mut self, database: u8) -> Self {
        self.database = Some(database);
        self
    }

    fn from_config(config: &ConfigManager, section: &str) -> SessionResult<Self> {
        Ok(Self {
            host: config.get_string_opt(&format!("{}.host", section))?,
            port: config.get_opt(&format!("{}.port", section))?,
            password: config.get_string_opt(&format!("{}.password", section))?,
            database: config.get_opt(&format!("{}.database", section))?,
        })
    }
}

/// Backend selection together with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Local files; records live in `<storage_root>/sessions`.
    Files { storage_root: PathBuf },
    /// Redis cache.
    Redis(RemoteParams),
    /// Memcached cache.
    Memcached(RemoteParams),
}

impl BackendConfig {
    /// Files backend under `storage_root`.
    pub fn files(storage_root: impl Into<PathBuf>) -> Self {
        Self::Files {
            storage_root: storage_root.into(),
        }
    }

    /// The variant tag.
    pub fn kind(&self) -> SessionBackendKind {
        match self {
            Self::Files { .. } => SessionBackendKind::Files,
            Self::Redis(_) => SessionBackendKind::Redis,
            Self::Memcached(_) => SessionBackendKind::Memcached,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::files("./storage")
    }
}

/// Cookie attributes applied to the token cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSettings {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            path: "/".to_string(),
            domain: None,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

/// Garbage-collection sampling: each request sweeps abandoned records with
/// probability `probability / divisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcSettings {
    pub probability: u32,
    pub divisor: u32,
}

impl GcSettings {
    /// Never sweep.
    pub fn disabled() -> Self {
        Self {
            probability: 0,
            divisor: 100,
        }
    }

    /// Sweep on every request.
    pub fn always() -> Self {
        Self {
            probability: 1,
            divisor: 1,
        }
    }
}

impl Default for GcSettings {
    fn default() -> Self {
        Self {
            probability: 1,
            divisor: 100,
        }
    }
}

/// A key that survives an idle-timeout reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarryOver {
    pub key: String,
    pub scope: Scope,
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Whether the host allows sessions at all
    pub enabled: bool,
    /// Idle timeout; `None` disables the check
    pub timeout: Option<Duration>,
    /// Backend type and parameters
    pub backend: BackendConfig,
    /// Cookie attributes
    pub cookie: CookieSettings,
    /// Garbage-collection sampling
    pub gc: GcSettings,
    /// Keys copied into the replacement session on idle timeout
    pub carry_over: Vec<CarryOver>,
    /// How long an untouched record is kept; see [`SessionSettings::max_lifetime`]
    pub record_lifetime: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: None,
            backend: BackendConfig::default(),
            cookie: CookieSettings::default(),
            gc: GcSettings::default(),
            carry_over: Vec::new(),
            record_lifetime: None,
        }
    }
}

impl SessionSettings {
    /// Create settings for the given backend.
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Read settings from the `session.*` section of a configuration source.
    ///
    /// | Key | Meaning |
    /// |-----|---------|
    /// | `session.enabled` | `false` turns sessions off (default `true`) |
    /// | `session.timeout` | idle timeout in seconds (absent = none) |
    /// | `session.backend` | `files`, `redis` or `memcached` (default `files`) |
    /// | `session.storage_root` | private storage root for `files` |
    /// | `session.redis.{host,port,password,database}` | Redis target |
    /// | `session.memcached.{host,port}` | Memcached target |
    /// | `session.cookie_name`, `session.cookie_path`, `session.cookie_domain`, `session.cookie_secure` | cookie attributes |
    /// | `session.gc_probability`, `session.gc_divisor` | GC sampling |
    /// | `session.carry_over` | list of global keys kept across timeouts |
    /// | `session.record_lifetime` | seconds an untouched record is kept; must exceed the timeout |
    pub fn from_config(config: &ConfigManager) -> SessionResult<Self> {
        let defaults = Self::default();

        let enabled = config.get_opt("session.enabled")?.unwrap_or(true);

        let timeout = match config.get_opt::<u64>("session.timeout")? {
            Some(0) => {
                return Err(SessionError::Config(
                    "session.timeout must be a positive number of seconds".to_string(),
                ));
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let record_lifetime = match config.get_opt::<u64>("session.record_lifetime")? {
            Some(secs) if secs == 0 || timeout.is_some_and(|t| secs <= t.as_secs()) => {
                return Err(SessionError::Config(
                    "session.record_lifetime must be longer than session.timeout".to_string(),
                ));
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let backend_name = config
            .get_string_opt("session.backend")?
            .unwrap_or_else(|| SessionBackendKind::Files.name().to_string());

        let backend = match SessionBackendKind::from_name(&backend_name)? {
            SessionBackendKind::Files => BackendConfig::Files {
                storage_root: config
                    .get_opt("session.storage_root")?
                    .unwrap_or_else(|| PathBuf::from("./storage")),
            },
            SessionBackendKind::Redis => {
                BackendConfig::Redis(RemoteParams::from_config(config, "session.redis")?)
            }
            SessionBackendKind::Memcached => {
                BackendConfig::Memcached(RemoteParams::from_config(config, "session.memcached")?)
            }
        };

        let cookie = CookieSettings {
            name: config
                .get_string_opt("session.cookie_name")?
                .unwrap_or(defaults.cookie.name),
            path: config
                .get_string_opt("session.cookie_path")?
                .unwrap_or(defaults.cookie.path),
            domain: config.get_string_opt("session.cookie_domain")?,
            secure: config
                .get_opt("session.cookie_secure")?
                .unwrap_or(defaults.cookie.secure),
            ..defaults.cookie
        };

        let gc = GcSettings {
            probability: config
                .get_opt("session.gc_probability")?
                .unwrap_or(defaults.gc.probability),
            divisor: config
                .get_opt("session.gc_divisor")?
                .unwrap_or(defaults.gc.divisor),
        };

        let carry_over = config
            .get_opt::<Vec<String>>("session.carry_over")?
            .unwrap_or_default()
            .into_iter()
            .map(|key| CarryOver {
                key,
                scope: Scope::Global,
            })
            .collect();

        Ok(Self {
            enabled,
            timeout,
            backend,
            cookie,
            gc,
            carry_over,
            record_lifetime,
        })
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the cookie name.
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie.name = name.into();
        self
    }

    /// Set GC sampling.
    pub fn with_gc(mut self, gc: GcSettings) -> Self {
        self.gc = gc;
        self
    }

    /// Keep `key` across idle-timeout resets.
    pub fn with_carry_over(mut self, key: impl Into<String>, scope: Scope) -> Self {
        self.carry_over.push(CarryOver {
            key: key.into(),
            scope,
        });
        self
    }

    /// Keep the stable user identifier across idle-timeout resets.
    pub fn with_user_identity(self) -> Self {
        self.with_carry_over(crate::USER_ID_KEY, Scope::Global)
    }

    /// Keep untouched records for `lifetime`.
    pub fn with_record_lifetime(mut self, lifetime: Duration) -> Self {
        self.record_lifetime = Some(lifetime);
        self
    }

    /// Maximum age of an untouched record before the backend may reclaim it.
    ///
    /// Always longer than the idle timeout: an idle session must still be
    /// loadable when the reset runs, or its carry-over keys are lost.
    pub fn max_lifetime(&self) -> Duration {
        match (self.record_lifetime, self.timeout) {
            (Some(lifetime), Some(timeout)) if lifetime > timeout => lifetime,
            (Some(lifetime), None) => lifetime,
            (_, Some(timeout)) => timeout + RETENTION_GRACE,
            (None, None) => DEFAULT_RETENTION,
        }
    }

    /// Lifetime of the token cookie; `None` for a browser-session cookie.
    pub fn cookie_lifetime(&self) -> Option<Duration> {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_lookup() {
        assert_eq!(
            SessionBackendKind::from_name("files").unwrap(),
            SessionBackendKind::Files
        );
        assert_eq!(
            SessionBackendKind::from_name(" Redis ").unwrap(),
            SessionBackendKind::Redis
        );
        assert!(matches!(
            SessionBackendKind::from_name("database"),
            Err(SessionError::UnknownBackend(_))
        ));
        assert_eq!(SessionBackendKind::Memcached.to_string(), "memcached");
        assert_eq!(SessionBackendKind::names().count(), 3);
    }

    #[test]
    fn test_defaults_from_empty_config() {
        let settings = SessionSettings::from_config(&ConfigManager::new()).unwrap();

        assert!(settings.enabled);
        assert_eq!(settings.timeout, None);
        assert_eq!(settings.backend, BackendConfig::files("./storage"));
        assert_eq!(settings.cookie.same_site, SameSite::Lax);
        assert_eq!(settings.cookie.name, DEFAULT_COOKIE_NAME);
        assert_eq!(settings.gc, GcSettings::default());
        assert_eq!(settings.max_lifetime(), DEFAULT_RETENTION);
        assert_eq!(settings.cookie_lifetime(), None);
    }

    #[test]
    fn test_redis_from_config() {
        let config = ConfigManager::from_value(json!({
            "session": {
                "timeout": 60,
                "backend": "redis",
                "redis": {"host": "cache", "port": 6380, "password": "pw"},
                "carry_over": ["UserID"]
            }
        }))
        .unwrap();

        let settings = SessionSettings::from_config(&config).unwrap();

        assert_eq!(settings.timeout, Some(Duration::from_secs(60)));
        assert_eq!(settings.max_lifetime(), Duration::from_secs(60) + RETENTION_GRACE);
        assert_eq!(settings.cookie_lifetime(), Some(Duration::from_secs(60)));
        assert_eq!(
            settings.backend,
            BackendConfig::Redis(RemoteParams::new("cache", 6380).with_password("pw"))
        );
        assert_eq!(
            settings.carry_over,
            vec![CarryOver {
                key: "UserID".to_string(),
                scope: Scope::Global
            }]
        );
    }

    #[test]
    fn test_missing_remote_params_are_deferred_to_resolution() {
        let config = ConfigManager::from_value(json!({"session": {"backend": "redis"}})).unwrap();
        let settings = SessionSettings::from_config(&config).unwrap();

        assert_eq!(settings.backend, BackendConfig::Redis(RemoteParams::default()));
    }

    #[test]
    fn test_unknown_backend_is_configuration_error() {
        let config = ConfigManager::from_value(json!({"session": {"backend": "mongo"}})).unwrap();
        let err = SessionSettings::from_config(&config).unwrap_err();

        assert!(err.is_configuration());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ConfigManager::from_value(json!({"session": {"timeout": 0}})).unwrap();
        assert!(matches!(
            SessionSettings::from_config(&config),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_wrong_type_is_configuration_error() {
        let config =
            ConfigManager::from_value(json!({"session": {"timeout": "forever"}})).unwrap();
        let err = SessionSettings::from_config(&config).unwrap_err();

        assert!(matches!(err, SessionError::ConfigSource(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_record_lifetime_outlives_timeout() {
        let config = ConfigManager::from_value(json!({
            "session": {"timeout": 60, "record_lifetime": 600}
        }))
        .unwrap();
        let settings = SessionSettings::from_config(&config).unwrap();
        assert_eq!(settings.max_lifetime(), Duration::from_secs(600));

        let config = ConfigManager::from_value(json!({
            "session": {"timeout": 60, "record_lifetime": 60}
        }))
        .unwrap();
        assert!(matches!(
            SessionSettings::from_config(&config),
            Err(SessionError::Config(_))
        ));

        // A builder value that is too short falls back to the grace period
        let settings = SessionSettings::default()
            .with_timeout(Duration::from_secs(60))
            .with_record_lifetime(Duration::from_secs(30));
        assert_eq!(settings.max_lifetime(), Duration::from_secs(60) + RETENTION_GRACE);
    }

    #[test]
    fn test_scalar_remote_params_read_as_strings() {
        let config = ConfigManager::from_value(json!({
            "session": {
                "backend": "redis",
                "redis": {"host": "cache", "port": 6379, "password": 123456}
            }
        }))
        .unwrap();

        let settings = SessionSettings::from_config(&config).unwrap();
        assert_eq!(
            settings.backend,
            BackendConfig::Redis(RemoteParams::new("cache", 6379).with_password("123456"))
        );
    }

    #[test]
    fn test_builder_helpers() {
        let settings = SessionSettings::new(BackendConfig::files("/srv/app"))
            .with_timeout(Duration::from_secs(30))
            .with_cookie_name("SID")
            .with_gc(GcSettings::always())
            .with_user_identity();

        assert_eq!(settings.backend.kind(), SessionBackendKind::Files);
        assert_eq!(settings.cookie.name, "SID");
        assert_eq!(settings.gc.divisor, 1);
        assert_eq!(settings.carry_over[0].key, crate::USER_ID_KEY);
    }
}
