//! Integration tests for the eufony facade crate

use eufony::prelude::*;
use std::io::Write;

#[test]
fn test_load_config_layers_file_and_env() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(
        file,
        r#"{{"session": {{"backend": "files", "timeout": 60, "cookie_name": "FROMFILE"}}}}"#
    )
    .unwrap();

    unsafe {
        std::env::set_var("EUFONY_FACADE_SESSION__TIMEOUT", "300");
    }

    let config = eufony::load_config("EUFONY_FACADE", Some(file.path())).unwrap();

    assert_eq!(config.get_int("session.timeout").unwrap(), 300);
    assert_eq!(config.get_string("session.cookie_name").unwrap(), "FROMFILE");

    unsafe {
        std::env::remove_var("EUFONY_FACADE_SESSION__TIMEOUT");
    }
}

#[cfg(feature = "session")]
#[tokio::test]
async fn test_session_through_facade() {
    let root = tempfile::tempdir().unwrap();
    let config = ConfigManager::new();
    config
        .set("session.storage_root", root.path().to_string_lossy())
        .unwrap();

    let manager = SessionManager::from_config(&config).await.unwrap();
    let mut session = manager.start(None, Namespace::default()).await.unwrap();
    let id = ensure_user_id(&mut session).unwrap();
    let cookie = session.save().await.unwrap();

    let resumed = manager
        .start(Some(&cookie.value), Namespace::new("other").unwrap())
        .await
        .unwrap();
    assert_eq!(user_id(&resumed), Some(id));
    assert!(resumed.last_activity().is_some());
    assert!(resumed.record().contains("other:LastActivity"));
    drop(resumed);
}
