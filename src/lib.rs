#![doc = r#"
wxapi-rs

WeChat Official Account / Mini Program server SDK.

Included:
- client: HTTP client, access_token grant, generic JSON helpers.
- token_store / redis_store / token_manager: cached access_token with a
  cross-process refresh lock (memory or Redis) and stale-token fallback.
- classify / message / dispatch: webhook XML classification and typed handler dispatch.
- signature: webhook signature checks.
- menu, user, qrcode, session: REST wrappers.
- errcode: errcode categories, hints and retry/refresh advice.
- config / app: environment configuration and the `WxApp` facade.

Quick usage:

```ignore
use std::sync::Arc;
use wxapi_rs::{Credentials, MemoryTokenStore, TokenManager, WxClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let tm = TokenManager::new(
        Credentials::new("your_appid", "your_appsecret"),
        Arc::new(MemoryTokenStore::new()),
        Arc::new(WxClient::default()),
    );
    let token = tm.get_access_token().await?;
    println!("access_token len: {}", token.len());
    Ok(())
}
```
"#]

pub mod app;
pub mod classify;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod errcode;
pub mod menu;
pub mod message;
pub mod qrcode;
pub mod redis_store;
pub mod session;
pub mod signature;
pub mod token_manager;
pub mod token_store;
pub mod user;

pub use app::{AppError, WxApp, WxAppBuilder};
pub use classify::{Classification, classify};
pub use client::*;
pub use config::WxConfig;
pub use dispatch::{DispatchError, Handler, HandlerRegistry, MessageDispatcher};
pub use message::*;
pub use menu::{Menu, MenuButton, SelfMenuInfo};
pub use qrcode::{QrCodeRequest, QrCodeTicket, qrcode_image_url};
pub use redis_store::RedisTokenStore;
pub use session::{PhoneInfo, Session};
pub use signature::{SignatureError, SignatureQuery, verify_plain_url_echostr, verify_url_signature};
pub use token_manager::{RefreshOutcome, SAFETY_MARGIN_SECS, TokenError, TokenManager};
pub use token_store::{MemoryTokenStore, StoreError, StoredToken, TokenStore};
pub use user::UserInfo;
