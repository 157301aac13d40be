//! Environment-driven configuration.
//!
//! | Variable            | Required | Meaning                                         |
//! |---------------------|----------|-------------------------------------------------|
//! | `WX_APP_ID`         | yes      | appid (starts with `wx`)                        |
//! | `WX_APP_SECRET`     | yes      | appsecret                                       |
//! | `WX_DOMAIN`         | no       | API domain override, e.g. `api2.weixin.qq.com`  |
//! | `WX_CALLBACK_TOKEN` | no       | webhook signature token                         |
//! | `REDIS_URL`         | no       | share tokens through Redis when set             |
//! | `REDIS_NAMESPACE`   | no       | Redis key namespace (default `wx_api`)          |
//! | `WX_LOCK_TTL_MS`    | no       | refresh lock lease in milliseconds (default 5000) |

use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::client::Credentials;
use crate::token_store::DEFAULT_LOCK_LEASE;

#[derive(Clone, Debug)]
pub struct WxConfig {
    pub credentials: Credentials,
    pub domain: Option<String>,
    pub callback_token: Option<String>,
    pub redis_url: Option<String>,
    pub redis_namespace: Option<String>,
    pub lock_ttl: Duration,
}

impl WxConfig {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            domain: None,
            callback_token: None,
            redis_url: None,
            redis_namespace: None,
            lock_ttl: DEFAULT_LOCK_LEASE,
        }
    }

    /// Read from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let app_id = get("WX_APP_ID").context("missing WX_APP_ID (appid starting with 'wx')")?;
        let secret = get("WX_APP_SECRET").context("missing WX_APP_SECRET")?;

        let lock_ttl = match get("WX_LOCK_TTL_MS") {
            Some(raw) => {
                let ms: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("WX_LOCK_TTL_MS is not a number: {raw:?}"))?;
                if ms == 0 {
                    bail!("WX_LOCK_TTL_MS must be greater than zero");
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_LOCK_LEASE,
        };

        Ok(Self {
            credentials: Credentials::new(app_id, secret),
            domain: get("WX_DOMAIN"),
            callback_token: get("WX_CALLBACK_TOKEN"),
            redis_url: get("REDIS_URL"),
            redis_namespace: get("REDIS_NAMESPACE"),
            lock_ttl,
        })
    }
}
