//! Walk one session through several requests against the files backend.
//!
//! Run with: cargo run --example session_flow

use eufony::prelude::*;
use eufony::session::ManualClock;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("eufony_session=debug".parse()?))
        .init();

    let root = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(1_700_000_000));

    let settings = SessionSettings::new(BackendConfig::files(root.path()))
        .with_timeout(Duration::from_secs(60))
        .with_user_identity();
    let manager = SessionManager::new(settings).await?.with_clock(clock.clone());

    println!("=== Request 1: new visitor ===");
    let mut session = manager.start(None, Namespace::new("shop")?).await?;
    let user = ensure_user_id(&mut session)?;
    session.set("cart", vec!["book", "pen"], Scope::Namespace)?;
    let cookie = session.save().await?;
    println!("user {} -> Set-Cookie: {}", user, cookie);

    println!("\n=== Request 2: 30s later ===");
    clock.advance(30);
    let header = format!("{}={}", cookie.name, cookie.value);
    let token = token_from_header(&header, manager.cookie_name());
    let mut session = manager.start(token.as_deref(), Namespace::new("shop")?).await?;
    let cart: Option<Vec<String>> = session.get("cart", Scope::Namespace);
    println!("cart still there: {:?}", cart);
    session.save().await?;

    println!("\n=== Request 3: idle for 2 minutes ===");
    clock.advance(120);
    let mut session = manager.start(token.as_deref(), Namespace::new("shop")?).await?;
    let cart: Option<Vec<String>> = session.get("cart", Scope::Namespace);
    println!("reset: {}, cart: {:?}, user: {:?}", session.was_reset(), cart, user_id(&session));
    let cookie = session.save().await?;
    println!("new token -> Set-Cookie: {}", cookie);

    println!("\n=== Request 4: logout ===");
    let session = manager.start(Some(&cookie.value), Namespace::new("shop")?).await?;
    println!("Set-Cookie: {}", session.destroy().await?);

    Ok(())
}
