//! Stable user identifier kept in the global scope.
//!
//! The identifier is assigned on first use and, when
//! [`SessionSettings::with_user_identity`](crate::SessionSettings::with_user_identity)
//! is set, survives idle-timeout resets.

use crate::error::SessionResult;
use crate::manager::{Session, USER_ID_KEY};
use crate::namespace::Scope;
use tracing::debug;

/// The user identifier, if one has been assigned.
pub fn user_id(session: &Session) -> Option<String> {
    session.get(USER_ID_KEY, Scope::Global)
}

/// Return the user identifier, assigning a new one if absent.
pub fn ensure_user_id(session: &mut Session) -> SessionResult<String> {
    if let Some(id) = user_id(session) {
        return Ok(id);
    }

    let id = uuid::Uuid::new_v4().to_string();
    session.set(USER_ID_KEY, &id, Scope::Global)?;
    debug!(user_id = %id, "Assigned user identifier");
    Ok(id)
}

/// Bind the session to a known identifier, e.g. after login.
pub fn assign_user_id(session: &mut Session, id: impl Into<String>) -> SessionResult<()> {
    session.set(USER_ID_KEY, id.into(), Scope::Global)
}

/// Drop the identifier, e.g. on logout.
pub fn forget_user_id(session: &mut Session) -> Option<String> {
    session
        .unset(USER_ID_KEY, Scope::Global)
        .and_then(|v| v.as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionSettings;
    use crate::manager::SessionManager;
    use crate::memory_session::MemorySessionStore;
    use crate::namespace::Namespace;
    use std::sync::Arc;

    async fn session() -> Session {
        let manager =
            SessionManager::with_store(SessionSettings::default(), Arc::new(MemorySessionStore::new()))
                .unwrap();
        manager.start(None, Namespace::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_ensure_is_stable() {
        let mut session = session().await;
        assert_eq!(user_id(&session), None);

        let first = ensure_user_id(&mut session).unwrap();
        let second = ensure_user_id(&mut session).unwrap();
        assert_eq!(first, second);
        assert_eq!(user_id(&session), Some(first));
        session.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_assign_and_forget() {
        let mut session = session().await;

        assign_user_id(&mut session, "user-7").unwrap();
        assert_eq!(ensure_user_id(&mut session).unwrap(), "user-7");
        assert_eq!(forget_user_id(&mut session), Some("user-7".to_string()));
        assert_eq!(forget_user_id(&mut session), None);
        session.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_visible_from_every_namespace() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::with_store(SessionSettings::default(), store).unwrap();

        let mut blog = manager.start(None, Namespace::new("blog").unwrap()).await.unwrap();
        let id = ensure_user_id(&mut blog).unwrap();
        blog.save().await.unwrap();

        let mut shop = manager
            .start(Some(blog.token()), Namespace::new("shop").unwrap())
            .await
            .unwrap();
        assert_eq!(user_id(&shop), Some(id));
        shop.save().await.unwrap();
    }
}
