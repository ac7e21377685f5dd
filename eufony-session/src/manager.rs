//! Session lifecycle: bootstrap, idle timeout and namespaced access.

use crate::backend::{SaveLocation, open_store};
use crate::clock::{Clock, SystemClock};
use crate::config::SessionSettings;
use crate::cookie::SessionCookie;
use crate::engine::SessionEngine;
use crate::error::{SessionError, SessionResult};
use crate::namespace::{Namespace, Scope};
use crate::traits::{SessionRecord, SessionStore};
use eufony_config::ConfigManager;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reserved key holding the unix time of the last request, per namespace.
pub const LAST_ACTIVITY_KEY: &str = "LastActivity";

/// Reserved global key holding the stable user identifier.
pub const USER_ID_KEY: &str = "UserID";

/// Whether a session last active at `last` has been idle too long at `now`.
///
/// A session idle for exactly `timeout` seconds is still alive.
pub fn is_idle_expired(now: i64, last: i64, timeout: Duration) -> bool {
    let timeout = i64::try_from(timeout.as_secs()).unwrap_or(i64::MAX);
    now.saturating_sub(last) > timeout
}

/// Owns backend selection and the per-request session bootstrap.
///
/// Build one per process and share it; [`SessionManager::start`] is called
/// once per request.
///
/// ```no_run
/// use eufony_session::{Namespace, Scope, SessionManager, SessionSettings, BackendConfig};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), eufony_session::SessionError> {
/// let settings = SessionSettings::new(BackendConfig::files("/var/lib/app"))
///     .with_timeout(Duration::from_secs(1800))
///     .with_user_identity();
/// let manager = SessionManager::new(settings).await?;
///
/// // Per request:
/// let mut session = manager.start(None, Namespace::new("blog")?).await?;
/// session.set("draft", "hello", Scope::Namespace)?;
/// let cookie = session.save().await?;
/// println!("Set-Cookie: {}", cookie);
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    engine: Arc<SessionEngine>,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    /// Validate `settings`, resolve the backend and attach the engine to it.
    ///
    /// Configuration problems (sessions disabled, unknown backend, missing
    /// backend parameter) are reported here rather than on first use.
    pub async fn new(settings: SessionSettings) -> SessionResult<Self> {
        if !settings.enabled {
            return Err(SessionError::Disabled);
        }

        let location = settings.backend.resolve_location().await?;
        let store = open_store(&settings.backend, &location).await?;

        info!(
            backend = %settings.backend.kind(),
            %location,
            timeout = ?settings.timeout,
            "Session manager ready"
        );

        Ok(Self::assemble(settings, store))
    }

    /// Read `session.*` settings from `config` and build the manager.
    pub async fn from_config(config: &ConfigManager) -> SessionResult<Self> {
        Self::new(SessionSettings::from_config(config)?).await
    }

    /// Build on an already opened store, bypassing backend resolution.
    pub fn with_store(
        settings: SessionSettings,
        store: Arc<dyn SessionStore>,
    ) -> SessionResult<Self> {
        if !settings.enabled {
            return Err(SessionError::Disabled);
        }
        Ok(Self::assemble(settings, store))
    }

    fn assemble(settings: SessionSettings, store: Arc<dyn SessionStore>) -> Self {
        Self {
            engine: Arc::new(SessionEngine::new(store, &settings)),
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Active settings.
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Where records are persisted.
    pub fn location(&self) -> &SaveLocation {
        self.engine.location()
    }

    /// Name of the token cookie to read from requests.
    pub fn cookie_name(&self) -> &str {
        self.engine.cookie_name()
    }

    /// Bootstrap the session for one request.
    ///
    /// Resumes the record for `token` (creating one if needed), samples
    /// garbage collection, resets the session if it has been idle longer
    /// than the configured timeout, and stamps the activity time.
    pub async fn start(&self, token: Option<&str>, namespace: Namespace) -> SessionResult<Session> {
        let now = self.clock.now();
        let (mut record, mut is_new) = self.engine.resume(token).await?;

        self.engine.collect_garbage().await?;

        let activity_key = namespace.resolve(LAST_ACTIVITY_KEY, Scope::Namespace);
        let mut was_reset = false;

        if let Some(timeout) = self.settings.timeout
            && let Some(last) = record.get(&activity_key).and_then(|v| v.as_i64())
            && is_idle_expired(now, last, timeout)
        {
            record = self.reset(record, &namespace).await?;
            is_new = true;
            was_reset = true;
            debug!(namespace = %namespace, idle = now - last, "Session idle timeout; reset");
        }

        record.insert(activity_key, serde_json::Value::from(now));

        Ok(Session {
            engine: self.engine.clone(),
            record,
            namespace,
            is_new,
            was_reset,
            dirty: true,
        })
    }

    /// Destroy `old` and return a fresh record holding only the carry-over keys.
    async fn reset(&self, old: SessionRecord, namespace: &Namespace) -> SessionResult<SessionRecord> {
        self.engine.destroy(&old.token).await?;

        let mut fresh = self.engine.create();
        for carry in &self.settings.carry_over {
            let key = namespace.resolve(&carry.key, carry.scope);
            if let Some(value) = old.get(&key) {
                fresh.insert(key, value.clone());
            }
        }

        Ok(fresh)
    }
}

/// One request's view of a session.
///
/// Reads and writes act on the in-memory record immediately; call
/// [`Session::save`] to persist them.
pub struct Session {
    engine: Arc<SessionEngine>,
    record: SessionRecord,
    namespace: Namespace,
    is_new: bool,
    was_reset: bool,
    dirty: bool,
}

impl Session {
    /// The session token.
    pub fn token(&self) -> &str {
        &self.record.token
    }

    /// The active namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Whether this request created the session (including after a reset).
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Whether the previous session was discarded for being idle.
    pub fn was_reset(&self) -> bool {
        self.was_reset
    }

    /// The underlying record.
    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    /// Get a value, `None` if unset or not representable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, scope: Scope) -> Option<T> {
        self.get_value(key, scope)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get the raw stored value.
    pub fn get_value(&self, key: &str, scope: Scope) -> Option<&serde_json::Value> {
        self.record.get(&self.namespace.resolve(key, scope))
    }

    /// Check if a key is set.
    pub fn contains(&self, key: &str, scope: Scope) -> bool {
        self.record.contains(&self.namespace.resolve(key, scope))
    }

    /// Set a value.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T, scope: Scope) -> SessionResult<()> {
        let json_value = serde_json::to_value(value)
            .map_err(|e| SessionError::Serialization(e.to_string()))?;

        self.record
            .insert(self.namespace.resolve(key, scope), json_value);
        self.dirty = true;
        Ok(())
    }

    /// Remove a value. Removing an unset key is a no-op.
    pub fn unset(&mut self, key: &str, scope: Scope) -> Option<serde_json::Value> {
        let removed = self.record.remove(&self.namespace.resolve(key, scope));
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Activity time stamped for this namespace.
    pub fn last_activity(&self) -> Option<i64> {
        self.get(LAST_ACTIVITY_KEY, Scope::Namespace)
    }

    /// Issue a new token for the same contents and drop the old record.
    pub async fn regenerate(&mut self) -> SessionResult<()> {
        let old = std::mem::replace(&mut self.record.token, self.engine.create().token);
        self.engine.destroy(&old).await?;
        self.dirty = true;
        debug!("Session token regenerated");
        Ok(())
    }

    /// Persist the session and return the cookie for the response.
    pub async fn save(&mut self) -> SessionResult<SessionCookie> {
        self.engine.persist(&mut self.record).await?;
        self.dirty = false;
        Ok(self.cookie())
    }

    /// Delete the session and return a cookie that clears the client token.
    pub async fn destroy(mut self) -> SessionResult<SessionCookie> {
        self.engine.destroy(&self.record.token).await?;
        self.dirty = false;
        Ok(self.cookie().expired())
    }

    /// The cookie carrying this session's token.
    pub fn cookie(&self) -> SessionCookie {
        self.engine.cookie(&self.record.token)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.dirty {
            warn!(namespace = %self.namespace, "Session dropped with unsaved changes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::BackendConfig;
    use crate::memory_session::MemorySessionStore;
    use serde_json::json;

    const T0: i64 = 1_700_000_000;

    fn manager(settings: SessionSettings) -> (Arc<MemorySessionStore>, Arc<ManualClock>, SessionManager) {
        let store = Arc::new(MemorySessionStore::new());
        let clock = Arc::new(ManualClock::new(T0));
        let manager = SessionManager::with_store(settings, store.clone())
            .unwrap()
            .with_clock(clock.clone());
        (store, clock, manager)
    }

    fn ns(id: &str) -> Namespace {
        Namespace::new(id).unwrap()
    }

    #[test]
    fn test_idle_comparison() {
        let t = Duration::from_secs(60);
        assert!(!is_idle_expired(T0 + 60, T0, t));
        assert!(is_idle_expired(T0 + 61, T0, t));
        assert!(!is_idle_expired(T0 - 5, T0, t));
    }

    #[test]
    fn test_disabled() {
        let settings = SessionSettings {
            enabled: false,
            ..Default::default()
        };
        let result = SessionManager::with_store(settings, Arc::new(MemorySessionStore::new()));

        assert!(matches!(result, Err(SessionError::Disabled)));
    }

    #[tokio::test]
    async fn test_round_trip_values() {
        let (_, _, manager) = manager(SessionSettings::default());
        let mut session = manager.start(None, ns("app")).await.unwrap();

        let nested = json!({"a": [1, {"b": null}], "c": "d"});
        session.set("empty", "", Scope::Namespace).unwrap();
        session.set("nested", &nested, Scope::Namespace).unwrap();

        assert_eq!(session.get::<String>("empty", Scope::Namespace), Some(String::new()));
        assert_eq!(session.get::<serde_json::Value>("nested", Scope::Namespace), Some(nested));
        assert_eq!(session.get::<String>("missing", Scope::Namespace), None);
        session.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_unset_is_idempotent() {
        let (_, _, manager) = manager(SessionSettings::default());
        let mut session = manager.start(None, ns("app")).await.unwrap();

        session.set("x", 1, Scope::Namespace).unwrap();
        assert_eq!(session.unset("x", Scope::Namespace), Some(json!(1)));
        assert_eq!(session.unset("x", Scope::Namespace), None);
        assert!(!session.contains("x", Scope::Namespace));
        session.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_activity_stamped() {
        let (_, _, manager) = manager(SessionSettings::default());
        let mut session = manager.start(None, ns("app")).await.unwrap();

        assert!(session.is_new());
        assert_eq!(session.last_activity(), Some(T0));
        session.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_reset_keeps_carry_over() {
        let settings = SessionSettings::default()
            .with_timeout(Duration::from_secs(60))
            .with_user_identity();
        let (store, clock, manager) = manager(settings);

        let mut first = manager.start(None, ns("app")).await.unwrap();
        first.set(USER_ID_KEY, "user-42", Scope::Global).unwrap();
        first.set("cart", vec![1, 2], Scope::Namespace).unwrap();
        first.set("banner", "seen", Scope::Global).unwrap();
        first.save().await.unwrap();
        let old_token = first.token().to_string();

        clock.advance(61);
        let mut second = manager.start(Some(&old_token), ns("app")).await.unwrap();

        assert!(second.was_reset());
        assert_ne!(second.token(), old_token);
        assert_eq!(second.get::<String>(USER_ID_KEY, Scope::Global), Some("user-42".into()));
        assert_eq!(second.get::<Vec<i32>>("cart", Scope::Namespace), None);
        assert_eq!(second.get::<String>("banner", Scope::Global), None);
        assert_eq!(second.last_activity(), Some(T0 + 61));
        assert!(!store.exists(&old_token).await.unwrap());
        second.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_within_timeout_preserves_keys() {
        let (_, clock, manager) =
            manager(SessionSettings::default().with_timeout(Duration::from_secs(60)));

        let mut first = manager.start(None, ns("app")).await.unwrap();
        first.set("cart", "full", Scope::Namespace).unwrap();
        first.save().await.unwrap();

        clock.advance(60);
        let mut second = manager.start(Some(first.token()), ns("app")).await.unwrap();

        assert!(!second.was_reset());
        assert_eq!(second.token(), first.token());
        assert_eq!(second.get::<String>("cart", Scope::Namespace), Some("full".into()));
        assert_eq!(second.last_activity(), Some(T0 + 60));
        second.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_timeout_never_resets() {
        let (_, clock, manager) = manager(SessionSettings::default());

        let mut first = manager.start(None, ns("app")).await.unwrap();
        first.set("k", true, Scope::Namespace).unwrap();
        first.save().await.unwrap();

        clock.advance(10 * 365 * 24 * 3600);
        let mut second = manager.start(Some(first.token()), ns("app")).await.unwrap();

        assert!(!second.was_reset());
        assert_eq!(second.get::<bool>("k", Scope::Namespace), Some(true));
        second.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_namespace_isolation() {
        let (_, _, manager) = manager(SessionSettings::default());

        let mut a = manager.start(None, ns("a")).await.unwrap();
        a.set("k", "from-a", Scope::Namespace).unwrap();
        a.set("g", "global", Scope::Global).unwrap();
        a.save().await.unwrap();

        let mut b = manager.start(Some(a.token()), ns("b")).await.unwrap();
        assert_eq!(b.get::<String>("k", Scope::Namespace), None);
        assert_eq!(b.get::<String>("g", Scope::Global), Some("global".into()));
        assert_eq!(a.get::<String>("g", Scope::Global), Some("global".into()));
        b.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_regenerate_moves_contents() {
        let (store, _, manager) = manager(SessionSettings::default());
        let mut session = manager.start(None, ns("app")).await.unwrap();
        session.set("k", 1, Scope::Namespace).unwrap();
        session.save().await.unwrap();
        let old = session.token().to_string();

        session.regenerate().await.unwrap();
        session.save().await.unwrap();

        assert_ne!(session.token(), old);
        assert!(!store.exists(&old).await.unwrap());
        let resumed = manager.start(Some(session.token()), ns("app")).await.unwrap();
        assert_eq!(resumed.get::<i32>("k", Scope::Namespace), Some(1));
        drop(resumed);
    }

    #[tokio::test]
    async fn test_destroy_expires_cookie() {
        let (store, _, manager) = manager(SessionSettings::default());
        let mut session = manager.start(None, ns("app")).await.unwrap();
        session.save().await.unwrap();
        let token = session.token().to_string();

        let cookie = session.destroy().await.unwrap();

        assert_eq!(cookie.max_age, Some(Duration::ZERO));
        assert!(cookie.value.is_empty());
        assert!(!store.exists(&token).await.unwrap());
    }

    #[tokio::test]
    async fn test_gc_sampled_on_start() {
        let settings = SessionSettings::new(BackendConfig::default())
            .with_gc(crate::config::GcSettings::always());
        let (store, _, manager) = manager(settings);

        let mut session = manager.start(None, ns("app")).await.unwrap();
        assert_eq!(store.gc_runs(), 1);
        session.save().await.unwrap();
    }
}
