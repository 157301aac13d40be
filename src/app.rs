//! `WxApp`: one application identity wired end to end.
//!
//! Bundles the HTTP client, the token manager (memory or Redis store) and the
//! inbound message dispatcher, and exposes the REST wrappers without passing
//! access_tokens around.
//!
//! When the provider rejects a token (40001, 40014, 42001) the error is returned
//! unchanged, and a refresh is attempted first so the caller's retry gets a new token.
//!
//! ```ignore
//! use wxapi_rs::{HandlerRegistry, TextMessage, WxApp, WxConfig};
//!
//! let cfg = WxConfig::from_env()?;
//! let handlers = HandlerRegistry::new().on(|m: TextMessage| async move {
//!     tracing::info!("{}", m.content);
//!     anyhow::Ok(())
//! });
//! let app = WxApp::from_config(&cfg, handlers).await?;
//! let info = app.user_info("o6_bmjrPTlm6_2sgVt7hMZOPfL2M", None).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::client::{self, Credentials, TokenProvider, WxClient};
use crate::config::WxConfig;
use crate::dispatch::{DispatchError, HandlerRegistry, MessageDispatcher};
use crate::errcode;
use crate::menu::{Menu, SelfMenuInfo};
use crate::qrcode::{QrCodeRequest, QrCodeTicket};
use crate::redis_store::RedisTokenStore;
use crate::session::{PhoneInfo, Session};
use crate::signature::{SignatureError, SignatureQuery};
use crate::token_manager::{TokenError, TokenManager};
use crate::token_store::{MemoryTokenStore, StoreError, TokenStore};
use crate::user::UserInfo;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Api(#[from] client::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("callback token is not configured")]
    CallbackTokenMissing,
}

#[derive(Clone)]
pub struct WxApp {
    client: WxClient,
    tokens: TokenManager,
    dispatcher: MessageDispatcher,
    callback_token: Option<String>,
}

impl std::fmt::Debug for WxApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WxApp")
            .field("credentials", self.tokens.credentials())
            .field("domain", &self.client.domain())
            .field("handlers", self.dispatcher.registry())
            .finish()
    }
}

pub struct WxAppBuilder {
    credentials: Credentials,
    client: WxClient,
    store: Option<Arc<dyn TokenStore>>,
    provider: Option<Arc<dyn TokenProvider>>,
    handlers: HandlerRegistry,
    callback_token: Option<String>,
}

impl WxAppBuilder {
    pub fn client(mut self, client: WxClient) -> Self {
        self.client = client;
        self
    }

    /// Defaults to a [`MemoryTokenStore`]
    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to the client's own token grant
    pub fn provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn callback_token(mut self, token: impl Into<String>) -> Self {
        self.callback_token = Some(token.into());
        self
    }

    pub fn build(self) -> WxApp {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(self.client.clone()));
        WxApp {
            tokens: TokenManager::new(self.credentials, store, provider),
            client: self.client,
            dispatcher: MessageDispatcher::new(self.handlers),
            callback_token: self.callback_token,
        }
    }
}

impl WxApp {
    pub fn builder(credentials: Credentials) -> WxAppBuilder {
        WxAppBuilder {
            credentials,
            client: WxClient::default(),
            store: None,
            provider: None,
            handlers: HandlerRegistry::new(),
            callback_token: None,
        }
    }

    /// Build from configuration; uses Redis when `redis_url` is set.
    pub async fn from_config(cfg: &WxConfig, handlers: HandlerRegistry) -> Result<Self, AppError> {
        let mut client = WxClient::default();
        if let Some(domain) = &cfg.domain {
            client = client.with_domain(domain);
        }

        let store: Arc<dyn TokenStore> = match &cfg.redis_url {
            Some(url) => {
                let mut store = RedisTokenStore::connect(url, &cfg.credentials.app_id)
                    .await?
                    .with_lock_ttl(cfg.lock_ttl);
                if let Some(ns) = &cfg.redis_namespace {
                    store = store.with_namespace(ns);
                }
                info!(key = %store.token_key(), "using redis token store");
                Arc::new(store)
            }
            None => {
                info!("using in-memory token store");
                Arc::new(MemoryTokenStore::new().with_lock_lease(cfg.lock_ttl))
            }
        };

        let mut builder = Self::builder(cfg.credentials.clone())
            .client(client)
            .store(store)
            .handlers(handlers);
        if let Some(token) = &cfg.callback_token {
            builder = builder.callback_token(token);
        }
        Ok(builder.build())
    }

    pub fn client(&self) -> &WxClient {
        &self.client
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub async fn access_token(&self) -> Result<String, AppError> {
        Ok(self.tokens.get_access_token().await?)
    }

    pub async fn refresh_token(&self) -> Result<(), AppError> {
        Ok(self.tokens.refresh_token().await?)
    }

    /// Dispatch a raw webhook body to the registered handler.
    pub async fn handle_message(&self, raw: &[u8]) -> Result<(), AppError> {
        Ok(self.dispatcher.dispatch(raw).await?)
    }

    /// Check the signature of a webhook POST.
    pub fn verify_signature(&self, query: &SignatureQuery) -> Result<(), AppError> {
        let token = self
            .callback_token
            .as_deref()
            .ok_or(AppError::CallbackTokenMissing)?;
        Ok(query.verify(token)?)
    }

    /// Answer the URL verification GET.
    pub fn verify_echostr(&self, query: &SignatureQuery) -> Result<String, AppError> {
        let token = self
            .callback_token
            .as_deref()
            .ok_or(AppError::CallbackTokenMissing)?;
        Ok(query.echo(token)?)
    }

    pub async fn create_menu(&self, menu: &Menu) -> Result<(), AppError> {
        self.with_token(|token| async move { self.client.create_menu(&token, menu).await })
            .await
    }

    pub async fn current_selfmenu_info(&self) -> Result<SelfMenuInfo, AppError> {
        self.with_token(|token| async move { self.client.current_selfmenu_info(&token).await })
            .await
    }

    pub async fn user_info(&self, openid: &str, lang: Option<&str>) -> Result<UserInfo, AppError> {
        self.with_token(|token| async move { self.client.user_info(&token, openid, lang).await })
            .await
    }

    pub async fn create_qrcode(&self, req: &QrCodeRequest) -> Result<QrCodeTicket, AppError> {
        self.with_token(|token| async move { self.client.create_qrcode(&token, req).await })
            .await
    }

    pub async fn phone_number(&self, code: &str) -> Result<PhoneInfo, AppError> {
        self.with_token(|token| async move { self.client.phone_number(&token, code).await })
            .await
    }

    /// jscode2session authenticates with the app secret; no access_token involved.
    pub async fn code_to_session(&self, js_code: &str) -> Result<Session, AppError> {
        Ok(self
            .client
            .code_to_session(self.tokens.credentials(), js_code)
            .await?)
    }

    async fn with_token<T, F, Fut>(&self, call: F) -> Result<T, AppError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = client::Result<T>>,
    {
        let token = self.tokens.get_access_token().await?;
        let result = call(token).await;
        if let Err(e) = &result {
            self.refresh_if_rejected(e).await;
        }
        Ok(result?)
    }

    async fn refresh_if_rejected(&self, err: &client::Error) {
        let Some(code) = err.wx_code() else {
            return;
        };
        if !errcode::should_refresh_token(code) {
            return;
        }
        warn!(code, "access_token rejected by provider; refreshing");
        match self.tokens.refresh_token().await {
            Ok(()) => debug!("access_token refreshed after rejection"),
            Err(TokenError::Locked) => debug!("refresh already in progress elsewhere"),
            Err(e) => warn!("refresh after rejection failed: {e}"),
        }
    }
}
