//! Redis-backed token store shared by every process using the same appid.
//!
//! Keys (namespace defaults to `wx_api`):
//! - Token: `{namespace}:access_token:{appid}` holding `{"token": .., "expiry": ..}` JSON,
//!   `expiry` is the local expiry (margin already taken off), while `PX` is the
//!   provider-side validity, so an expired token stays readable for
//!   [`SAFETY_MARGIN_SECS`] as a stale fallback before Redis evicts it.
//! - Lock: `{namespace}:refresh_lock:{appid}` written with `SET NX PX lease`.
//!
//! Example usage:
//! ```ignore
//! use std::sync::Arc;
//! use redis::aio::ConnectionManager;
//! use wxapi_rs::{Credentials, RedisTokenStore, TokenManager, WxClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = redis::Client::open("redis://127.0.0.1/")?;
//!     let redis = ConnectionManager::new(client).await?;
//!
//!     let credentials = Credentials::new(std::env::var("WX_APP_ID")?, std::env::var("WX_APP_SECRET")?);
//!     let store = RedisTokenStore::new(redis, &credentials.app_id).with_namespace("myapp");
//!     let tm = TokenManager::new(credentials, Arc::new(store), Arc::new(WxClient::default()));
//!
//!     let token = tm.get_access_token().await?;
//!     println!("access_token (redacted len): {}", token.len());
//!     Ok(())
//! }
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult, aio::ConnectionManager};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::client::redact_id;
use crate::token_manager::SAFETY_MARGIN_SECS;
use crate::token_store::{DEFAULT_LOCK_LEASE, StoreError, StoredToken, TokenStore, unix_now};

const DEFAULT_NAMESPACE: &str = "wx_api";

/// JSON payload stored in Redis for a cached token
#[derive(Clone, Debug, Serialize, Deserialize)]
struct CachedToken {
    token: String,
    /// Epoch seconds when the token should be considered expired locally
    expiry: i64,
}

/// Token store on a shared Redis instance
#[derive(Clone)]
pub struct RedisTokenStore {
    redis: ConnectionManager,
    app_id: String,
    namespace: String,
    lock_ttl: Duration,
}

impl RedisTokenStore {
    pub fn new(redis: ConnectionManager, app_id: impl Into<String>) -> Self {
        Self {
            redis,
            app_id: app_id.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            lock_ttl: DEFAULT_LOCK_LEASE,
        }
    }

    /// Connect to `redis_url` and build a store for `app_id`.
    pub async fn connect(redis_url: &str, app_id: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let cm = ConnectionManager::new(client).await?;
        Ok(Self::new(cm, app_id))
    }

    /// Override the Redis key namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Override the lock lease
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    pub fn token_key(&self) -> String {
        token_key(&self.namespace, &self.app_id)
    }

    pub fn lock_key(&self) -> String {
        lock_key(&self.namespace, &self.app_id)
    }
}

fn token_key(namespace: &str, app_id: &str) -> String {
    format!("{}:access_token:{}", namespace, app_id)
}

fn lock_key(namespace: &str, app_id: &str) -> String {
    format!("{}:refresh_lock:{}", namespace, app_id)
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get_token(&self) -> Result<StoredToken, StoreError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(self.token_key()).await?;
        match raw {
            Some(s) => {
                let ct: CachedToken = serde_json::from_str(&s)?;
                Ok(StoredToken::new(ct.token, ct.expiry))
            }
            None => {
                debug!("no token found in redis");
                Ok(StoredToken::default())
            }
        }
    }

    #[instrument(level = "debug", skip(self, token))]
    async fn update_token(&self, token: &str, expires_at: i64) -> Result<(), StoreError> {
        let now = unix_now();
        if expires_at <= now {
            return Err(StoreError::Expired { expires_at });
        }
        let ttl_ms = entry_ttl_ms(expires_at, now);
        let json = serde_json::to_string(&CachedToken {
            token: token.to_string(),
            expiry: expires_at,
        })?;

        let mut conn = self.redis.clone();
        let _: () = redis::cmd("SET")
            .arg(self.token_key())
            .arg(&json)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        debug!(
            "token stored for appid {}, ttl={}ms",
            redact_id(&self.app_id),
            ttl_ms
        );
        Ok(())
    }

    /// `SET lock_key val NX PX lease`; no ownership check on release, the lease bounds it.
    async fn lock(&self) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        let acquired: RedisResult<Option<String>> = redis::cmd("SET")
            .arg(self.lock_key())
            .arg(lock_value())
            .arg("NX")
            .arg("PX")
            .arg(u64::try_from(self.lock_ttl.as_millis()).unwrap_or(u64::MAX))
            .query_async(&mut conn)
            .await;

        match acquired {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(StoreError::AlreadyLocked),
            Err(e) => Err(StoreError::Redis(e)),
        }
    }

    async fn unlock(&self) {
        let mut conn = self.redis.clone();
        let res: RedisResult<()> = conn.del(self.lock_key()).await;
        if let Err(e) = res {
            warn!(key = %self.lock_key(), "failed to release refresh lock: {e}");
        }
    }
}

/// Milliseconds left until `expires_at` (epoch seconds)
fn remaining_ms(expires_at: i64, now: i64) -> i64 {
    expires_at.saturating_sub(now).saturating_mul(1000)
}

/// Redis `PX` for a token expiring locally at `expires_at`: the margin is added back.
fn entry_ttl_ms(expires_at: i64, now: i64) -> i64 {
    remaining_ms(expires_at.saturating_add(SAFETY_MARGIN_SECS), now)
}

/// Generate a simple lock value string (timestamp-based)
fn lock_value() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("ts-{}", now)
}
