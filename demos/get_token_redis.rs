//! Example: share one access_token between concurrent callers through Redis
//!
//! Five tasks ask for a token at once. Only the task holding the refresh lock
//! calls WeChat; the others read the refreshed entry or get `Locked` and can
//! retry later. Running several processes behaves the same, since both the
//! lock and the token live in Redis.
//!
//! Environment variables:
//! - WX_APP_ID, WX_APP_SECRET
//! - REDIS_URL (default redis://127.0.0.1/)
//! - REDIS_NAMESPACE, WX_LOCK_TTL_MS (optional)
//!
//! Run:
//! ```bash
//! cargo run --example get_token_redis
//! ```

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::task::JoinHandle;
use wxapi_rs::{RedisTokenStore, TokenManager, WxClient, WxConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = WxConfig::from_env().context("load config")?;
    let redis_url = cfg
        .redis_url
        .clone()
        .unwrap_or_else(|| "redis://127.0.0.1/".to_string());

    let mut store = RedisTokenStore::connect(&redis_url, &cfg.credentials.app_id)
        .await
        .context("connect redis")?
        .with_lock_ttl(cfg.lock_ttl);
    if let Some(ns) = &cfg.redis_namespace {
        store = store.with_namespace(ns);
    }
    println!("token key: {}", store.token_key());
    println!("lock key:  {}", store.lock_key());

    let mut client = WxClient::default();
    if let Some(domain) = &cfg.domain {
        client = client.with_domain(domain);
    }
    let tm = TokenManager::new(cfg.credentials.clone(), Arc::new(store), Arc::new(client));

    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    for i in 0..5 {
        let tm = tm.clone();
        handles.push(tokio::spawn(async move {
            match tm.get_access_token().await {
                Ok(token) => println!("[task {i}] OK, token len {}", token.len()),
                Err(e) => eprintln!("[task {i}] ERR: {e}"),
            }
        }));
    }
    for h in handles {
        h.await?;
    }

    Ok(())
}
