//! Example: fetch an access_token through the in-memory store
//!
//! The second call is served from the cache without contacting WeChat.
//!
//! Environment variables:
//! - WX_APP_ID, WX_APP_SECRET
//! - WX_DOMAIN (optional, e.g. api2.weixin.qq.com)
//!
//! Run:
//! ```bash
//! cargo run --example get_token
//! ```

use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use wxapi_rs::{MemoryTokenStore, TokenManager, TokenStore, WxClient, WxConfig, errcode};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = WxConfig::from_env().context("load config")?;
    let mut client = WxClient::default();
    if let Some(domain) = &cfg.domain {
        client = client.with_domain(domain);
    }

    let tm = TokenManager::new(
        cfg.credentials.clone(),
        Arc::new(MemoryTokenStore::new().with_lock_lease(cfg.lock_ttl)),
        Arc::new(client),
    );

    match tm.get_access_token().await {
        Ok(token) => {
            println!("[OK] access_token fetched (len {})", token.len());
            let again = tm.get_access_token().await?;
            println!("[OK] second call hit the cache: {}", again == token);
            let stored = tm.store().get_token().await?;
            println!("local expiry (epoch secs): {}", stored.expires_at);
        }
        Err(e) => {
            eprintln!("[ERR] access_token fetch failed: {e}");
            if let wxapi_rs::TokenError::Fetch(api) = &e {
                if let Some(code) = api.wx_code() {
                    eprintln!("{}", errcode::explain(code, ""));
                }
            }
            return Err(e.into());
        }
    }

    Ok(())
}
