//! access_token persistence and the refresh lock.
//!
//! A `TokenStore` holds the current token, its local expiry and a non-blocking
//! refresh lock for one application identity. Two implementations ship with the
//! crate:
//! - [`MemoryTokenStore`]: single process, not durable across restarts.
//! - [`crate::redis_store::RedisTokenStore`]: shared across processes via Redis.
//!
//! Stores never talk to the token endpoint; refresh policy belongs to
//! [`crate::token_manager::TokenManager`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

/// Default lease of the refresh lock
pub const DEFAULT_LOCK_LEASE: Duration = Duration::from_secs(5);

/// Last known token and its local expiry (epoch seconds).
///
/// An empty token with `expires_at == 0` means the store was never initialized.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: i64,
}

impl StoredToken {
    pub fn new(token: impl Into<String>, expires_at: i64) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }

    /// Usable only while `now < expires_at`
    pub fn is_valid_at(&self, now: i64) -> bool {
        !self.token.is_empty() && now < self.expires_at
    }
}

/// Storage-medium failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("refresh lock is already held")]
    AlreadyLocked,

    #[error("token expiry {expires_at} is not in the future")]
    Expired { expires_at: i64 },
}

/// Persistence capability for one application's token and refresh lock.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Last known token and expiry, even if already expired. Never performs token I/O.
    async fn get_token(&self) -> Result<StoredToken, StoreError>;

    /// Replace the stored token/expiry pair.
    async fn update_token(&self, token: &str, expires_at: i64) -> Result<(), StoreError>;

    /// Try to take the refresh lock; fails fast with `AlreadyLocked` when another holder is active.
    async fn lock(&self) -> Result<(), StoreError>;

    /// Release the refresh lock. Releasing an unlocked store is a no-op.
    async fn unlock(&self);
}

/// In-process token store.
///
/// The lock is a compare-and-swap over an atomic lease deadline (epoch millis,
/// 0 = unlocked), so a holder that never releases is evicted once its lease runs out.
#[derive(Debug)]
pub struct MemoryTokenStore {
    token: RwLock<StoredToken>,
    lock_deadline_ms: AtomicI64,
    lock_lease: Duration,
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self {
            token: RwLock::new(StoredToken::default()),
            lock_deadline_ms: AtomicI64::new(0),
            lock_lease: DEFAULT_LOCK_LEASE,
        }
    }

    /// Override the refresh lock lease
    pub fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get_token(&self) -> Result<StoredToken, StoreError> {
        Ok(self.token.read().clone())
    }

    async fn update_token(&self, token: &str, expires_at: i64) -> Result<(), StoreError> {
        *self.token.write() = StoredToken::new(token, expires_at);
        Ok(())
    }

    async fn lock(&self) -> Result<(), StoreError> {
        let now = unix_now_ms();
        let current = self.lock_deadline_ms.load(Ordering::Acquire);
        if current > now {
            return Err(StoreError::AlreadyLocked);
        }
        let lease_ms = i64::try_from(self.lock_lease.as_millis()).unwrap_or(i64::MAX);
        let deadline = now.saturating_add(lease_ms);
        match self.lock_deadline_ms.compare_exchange(
            current,
            deadline,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                if current != 0 {
                    debug!("took over an expired refresh lock");
                }
                Ok(())
            }
            Err(_) => Err(StoreError::AlreadyLocked),
        }
    }

    async fn unlock(&self) {
        self.lock_deadline_ms.store(0, Ordering::Release);
    }
}

/// Current epoch seconds
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_store_signals_refresh() {
        let store = MemoryTokenStore::new();
        let t = store.get_token().await.expect("get");
        assert!(t.is_empty());
        assert!(!t.is_valid_at(unix_now()));
    }

    #[tokio::test]
    async fn expired_token_is_still_returned() {
        let store = MemoryTokenStore::new();
        let past = unix_now() - 10;
        store.update_token("old", past).await.expect("update");
        let t = store.get_token().await.expect("get");
        assert_eq!(t, StoredToken::new("old", past));
        assert!(!t.is_valid_at(unix_now()));
    }

    #[tokio::test]
    async fn lock_is_exclusive_and_unlock_idempotent() {
        let store = MemoryTokenStore::new();
        store.lock().await.expect("first lock");
        assert!(matches!(store.lock().await, Err(StoreError::AlreadyLocked)));
        store.unlock().await;
        store.unlock().await;
        store.lock().await.expect("lock after unlock");
    }

    #[tokio::test]
    async fn lease_expiry_frees_the_lock() {
        let store = MemoryTokenStore::new().with_lock_lease(Duration::from_millis(20));
        store.lock().await.expect("lock");
        assert!(store.lock().await.is_err());
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.lock().await.expect("lease expired");
    }

    #[tokio::test]
    async fn oversized_lease_still_holds_the_lock() {
        let store = MemoryTokenStore::new().with_lock_lease(Duration::from_secs(u64::MAX));
        store.lock().await.expect("lock");
        assert!(matches!(store.lock().await, Err(StoreError::AlreadyLocked)));
        store.unlock().await;
        store.lock().await.expect("lock after unlock");
    }
}
