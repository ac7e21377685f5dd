//! Backend-agnostic record handling.
//!
//! The engine knows how to issue tokens, load and persist records, sample
//! garbage collection and describe the token cookie. It only sees a
//! [`SessionStore`] and never which backend sits behind it.

use crate::backend::SaveLocation;
use crate::config::{CookieSettings, GcSettings, SessionSettings};
use crate::cookie::SessionCookie;
use crate::error::SessionResult;
use crate::traits::{SessionRecord, SessionStore, generate_token, is_valid_token};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Session engine bound to one store.
pub struct SessionEngine {
    store: Arc<dyn SessionStore>,
    location: SaveLocation,
    cookie: CookieSettings,
    cookie_lifetime: Option<Duration>,
    gc: GcSettings,
    max_lifetime: Duration,
}

impl SessionEngine {
    /// Attach an engine to `store` with the cookie and GC parameters from
    /// `settings`.
    pub fn new(store: Arc<dyn SessionStore>, settings: &SessionSettings) -> Self {
        Self {
            location: store.location(),
            store,
            cookie: settings.cookie.clone(),
            cookie_lifetime: settings.cookie_lifetime(),
            gc: settings.gc,
            max_lifetime: settings.max_lifetime(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Where records are persisted.
    pub fn location(&self) -> &SaveLocation {
        &self.location
    }

    /// Age after which untouched records may be reclaimed.
    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// Name of the token cookie.
    pub fn cookie_name(&self) -> &str {
        &self.cookie.name
    }

    /// Resume the record for `token`, or create a fresh one.
    ///
    /// The flag is `true` when a new record was created because the client
    /// presented no token, a malformed one, or one the store does not know.
    pub async fn resume(&self, token: Option<&str>) -> SessionResult<(SessionRecord, bool)> {
        match token {
            Some(token) if is_valid_token(token) => {
                if let Some(record) = self.store.load(token).await? {
                    trace!(token = %token, "Resumed session");
                    return Ok((record, false));
                }
                debug!("Presented session token is unknown; issuing a new one");
            }
            Some(_) => debug!("Ignoring malformed session token"),
            None => {}
        }

        Ok((self.create(), true))
    }

    /// A new, empty, not yet persisted record.
    pub fn create(&self) -> SessionRecord {
        SessionRecord::new(generate_token())
    }

    /// Persist `record` synchronously.
    pub async fn persist(&self, record: &mut SessionRecord) -> SessionResult<()> {
        record.updated_at = Utc::now();
        self.store.save(record, self.max_lifetime).await
    }

    /// Remove the record for `token`.
    pub async fn destroy(&self, token: &str) -> SessionResult<()> {
        self.store.destroy(token).await
    }

    /// Roll the GC dice for this request.
    pub fn should_collect(&self) -> bool {
        let GcSettings {
            probability,
            divisor,
        } = self.gc;

        if probability == 0 || divisor == 0 {
            return false;
        }
        probability >= divisor || rand::random_range(0..divisor) < probability
    }

    /// Sweep abandoned records if this request was sampled.
    ///
    /// Returns the number of records removed, or `None` when not sampled.
    pub async fn collect_garbage(&self) -> SessionResult<Option<usize>> {
        if !self.should_collect() {
            return Ok(None);
        }

        let removed = self.store.gc(self.max_lifetime).await?;
        debug!(removed, location = %self.location, "Session garbage collection ran");
        Ok(Some(removed))
    }

    /// The cookie carrying `token` to the client.
    pub fn cookie(&self, token: &str) -> SessionCookie {
        SessionCookie {
            name: self.cookie.name.clone(),
            value: token.to_string(),
            path: self.cookie.path.clone(),
            domain: self.cookie.domain.clone(),
            secure: self.cookie.secure,
            http_only: self.cookie.http_only,
            same_site: self.cookie.same_site,
            max_age: self.cookie_lifetime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::cookie::SameSite;
    use crate::memory_session::MemorySessionStore;

    fn engine(settings: SessionSettings) -> (Arc<MemorySessionStore>, SessionEngine) {
        let store = Arc::new(MemorySessionStore::new());
        let engine = SessionEngine::new(store.clone(), &settings);
        (store, engine)
    }

    #[tokio::test]
    async fn test_resume_without_token_creates() {
        let (_, engine) = engine(SessionSettings::default());

        let (record, created) = engine.resume(None).await.unwrap();
        assert!(created);
        assert!(is_valid_token(&record.token));
    }

    #[tokio::test]
    async fn test_resume_known_token() {
        let (_, engine) = engine(SessionSettings::default());
        let (mut record, _) = engine.resume(None).await.unwrap();
        record.insert("default:k", serde_json::json!("v"));
        engine.persist(&mut record).await.unwrap();

        let (resumed, created) = engine.resume(Some(&record.token)).await.unwrap();
        assert!(!created);
        assert_eq!(resumed.get("default:k"), Some(&serde_json::json!("v")));
    }

    #[tokio::test]
    async fn test_resume_unknown_or_malformed_token() {
        let (_, engine) = engine(SessionSettings::default());

        let unknown = generate_token();
        let (record, created) = engine.resume(Some(&unknown)).await.unwrap();
        assert!(created);
        assert_ne!(record.token, unknown);

        let (_, created) = engine.resume(Some("not-a-token")).await.unwrap();
        assert!(created);
    }

    #[tokio::test]
    async fn test_gc_sampling_bounds() {
        let (store, never) = engine(
            SessionSettings::new(BackendConfig::default()).with_gc(GcSettings::disabled()),
        );
        assert_eq!(never.collect_garbage().await.unwrap(), None);
        assert_eq!(store.gc_runs(), 0);

        let (store, always) =
            engine(SessionSettings::new(BackendConfig::default()).with_gc(GcSettings::always()));
        assert_eq!(always.collect_garbage().await.unwrap(), Some(0));
        assert_eq!(store.gc_runs(), 1);
    }

    #[test]
    fn test_cookie_attributes() {
        let (_, session_only) = engine(SessionSettings::default());
        let cookie = session_only.cookie("abc");
        assert_eq!(cookie.same_site, SameSite::Lax);
        assert_eq!(cookie.max_age, None);

        let (_, timed) =
            engine(SessionSettings::default().with_timeout(Duration::from_secs(60)));
        assert_eq!(timed.cookie("abc").max_age, Some(Duration::from_secs(60)));
        assert!(timed.max_lifetime() > Duration::from_secs(60));
    }
}
