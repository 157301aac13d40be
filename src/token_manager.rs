//! access_token lifecycle: cache lookup, distributed refresh and stale fallback.
//!
//! Goals:
//! - Never call the token endpoint while the stored token is still valid.
//! - At most one refresh in flight per appid: the store's lock serializes refreshers,
//!   and losers return immediately instead of waiting.
//! - Degrade softly: when a refresh fails but a previously issued token exists, hand
//!   out that token and report the failure through logs.
//!
//! The stored expiry is always the provider TTL minus a 60 second safety margin.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::client::{Credentials, Error as ClientError, TokenProvider, redact_id};
use crate::token_store::{StoreError, TokenStore, unix_now};

/// Seconds subtracted from the provider-reported `expires_in`
pub const SAFETY_MARGIN_SECS: i64 = 60;

/// Token refresh/lookup failures
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token store {op} failed: {source}")]
    Store {
        op: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("token fetch error: {0}")]
    Fetch(#[from] ClientError),

    #[error("refresh lock held by another worker; retry shortly")]
    Locked,

    #[error("malformed token response: {reason}")]
    MalformedResponse { reason: String },

    #[error("token store returned no token after a successful refresh")]
    Unavailable,
}

impl TokenError {
    fn store(op: &'static str, source: StoreError) -> Self {
        TokenError::Store { op, source }
    }
}

/// Result of one refresh attempt
#[derive(Debug)]
pub enum RefreshOutcome {
    /// A new token was fetched and persisted
    Refreshed,
    /// Another holder owns the refresh lock; nothing was fetched
    Contended,
    /// The attempt failed; the lock has been released
    Failed(TokenError),
}

/// Manages the access_token of one application identity.
#[derive(Clone)]
pub struct TokenManager {
    credentials: Credentials,
    store: Arc<dyn TokenStore>,
    provider: Arc<dyn TokenProvider>,
}

impl TokenManager {
    pub fn new(
        credentials: Credentials,
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            credentials,
            store,
            provider,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Get the current access_token, refreshing it when missing or expired.
    ///
    /// Behavior:
    /// - Valid stored token: returned immediately, no lock, no network call.
    /// - Otherwise one refresh attempt; on success the store is re-read.
    /// - Refresh skipped or failed: the previous (expired) token is returned if there is one,
    ///   else the refresh error.
    #[instrument(level = "debug", skip(self), fields(appid = %redact_id(&self.credentials.app_id)))]
    pub async fn get_access_token(&self) -> Result<String, TokenError> {
        let current = self
            .store
            .get_token()
            .await
            .map_err(|e| TokenError::store("get_token", e))?;
        let now = unix_now();
        if current.is_valid_at(now) {
            debug!("token valid, remaining={}s", current.expires_at - now);
            return Ok(current.token);
        }
        if current.is_empty() {
            debug!("no token in store; refreshing");
        } else {
            debug!("token expired locally; refreshing");
        }

        match self.try_refresh().await {
            RefreshOutcome::Refreshed => {
                let fresh = self
                    .store
                    .get_token()
                    .await
                    .map_err(|e| TokenError::store("get_token", e))?;
                if fresh.is_empty() {
                    return Err(TokenError::Unavailable);
                }
                Ok(fresh.token)
            }
            RefreshOutcome::Contended if !current.is_empty() => {
                debug!("refresh in progress elsewhere; serving previous token");
                Ok(current.token)
            }
            RefreshOutcome::Contended => Err(TokenError::Locked),
            RefreshOutcome::Failed(e) if !current.is_empty() => {
                warn!("token refresh failed, serving previous token: {e}");
                Ok(current.token)
            }
            RefreshOutcome::Failed(e) => Err(e),
        }
    }

    /// Fetch a new token under the store's refresh lock.
    ///
    /// Returns `TokenError::Locked` without any provider call when another holder owns the lock.
    pub async fn refresh_token(&self) -> Result<(), TokenError> {
        match self.try_refresh().await {
            RefreshOutcome::Refreshed => Ok(()),
            RefreshOutcome::Contended => Err(TokenError::Locked),
            RefreshOutcome::Failed(e) => Err(e),
        }
    }

    /// One refresh attempt. The lock is released on every exit path, panics included.
    pub async fn try_refresh(&self) -> RefreshOutcome {
        match self.store.lock().await {
            Ok(()) => debug!("refresh lock acquired; fetching upstream token"),
            Err(StoreError::AlreadyLocked) => {
                debug!("refresh lock held by another worker");
                return RefreshOutcome::Contended;
            }
            Err(e) => return RefreshOutcome::Failed(TokenError::store("lock", e)),
        }

        let result = AssertUnwindSafe(self.fetch_and_store()).catch_unwind().await;
        self.store.unlock().await;

        match result {
            Ok(Ok(())) => RefreshOutcome::Refreshed,
            Ok(Err(e)) => RefreshOutcome::Failed(e),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn fetch_and_store(&self) -> Result<(), TokenError> {
        let resp = self.provider.fetch_token(&self.credentials).await?;
        if resp.access_token.is_empty() {
            return Err(TokenError::MalformedResponse {
                reason: "empty access_token".into(),
            });
        }
        let now = unix_now();
        let expires_at = expiry_from(now, resp.expires_in);
        if expires_at <= now {
            return Err(TokenError::MalformedResponse {
                reason: format!("expires_in={} leaves no validity", resp.expires_in),
            });
        }
        self.store
            .update_token(&resp.access_token, expires_at)
            .await
            .map_err(|e| TokenError::store("update_token", e))?;
        info!(
            "access_token refreshed for appid {}, valid for {}s",
            redact_id(&self.credentials.app_id),
            expires_at - now
        );
        Ok(())
    }
}

/// Local expiry for a token granted at `now` with the provider TTL `expires_in`
fn expiry_from(now: i64, expires_in: i64) -> i64 {
    now.saturating_add(expires_in).saturating_sub(SAFETY_MARGIN_SECS)
}
