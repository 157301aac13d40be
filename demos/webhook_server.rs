//! Example: Official Account webhook server
//!
//! - GET  /wechat  URL verification (echoes `echostr` when the signature matches)
//! - POST /wechat  message push; signature check, then typed dispatch
//! - GET  /health
//!
//! Running this example:
//! ```bash
//! WX_APP_ID=wx... WX_APP_SECRET=... WX_CALLBACK_TOKEN=your_token \
//! cargo run --example webhook_server
//! ```
//!
//! The server listens on http://127.0.0.1:3000 (override with BIND_ADDR).

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use tracing::{error, info, warn};
use wxapi_rs::{
    AppError, ClickEvent, DispatchError, HandlerRegistry, ScanEvent, SignatureQuery,
    SubscribeEvent, TextMessage, UnsubscribeEvent, WxApp, WxConfig,
};

#[derive(Clone)]
struct AppState {
    app: Arc<WxApp>,
}

async fn verify_url(
    State(state): State<AppState>,
    Query(query): Query<SignatureQuery>,
) -> Result<String, StatusCode> {
    state.app.verify_echostr(&query).map_err(|e| {
        warn!("url verification failed: {e}");
        StatusCode::FORBIDDEN
    })
}

async fn receive(
    State(state): State<AppState>,
    Query(query): Query<SignatureQuery>,
    body: Bytes,
) -> Result<&'static str, StatusCode> {
    if let Err(e) = state.app.verify_signature(&query) {
        warn!("rejecting push: {e}");
        return Err(StatusCode::FORBIDDEN);
    }

    match state.app.handle_message(&body).await {
        Ok(()) => {}
        // Unhandled kinds are acknowledged so WeChat does not retry them
        Err(AppError::Dispatch(
            e @ (DispatchError::UnregisteredHandler(_)
            | DispatchError::InvalidMessageType(_)
            | DispatchError::InvalidEventType(_)),
        )) => info!("ignored push: {e}"),
        Err(e) => {
            error!("dispatch failed: {e}");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    }
    // An empty body or "success" means no passive reply
    Ok("success")
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

fn handlers() -> HandlerRegistry {
    HandlerRegistry::new()
        .on(|m: TextMessage| async move {
            info!(from = %m.from_user_name, msg_id = ?m.msg_id, "text: {}", m.content);
            anyhow::Ok(())
        })
        .on(|ev: ClickEvent| async move {
            info!(from = %ev.from_user_name, "menu click: {}", ev.event_key);
            anyhow::Ok(())
        })
        .on(|ev: SubscribeEvent| async move {
            match ev.event_key.as_deref().and_then(|k| k.strip_prefix("qrscene_")) {
                Some(scene) => info!(from = %ev.from_user_name, scene, "followed via QR code"),
                None => info!(from = %ev.from_user_name, "followed"),
            }
            anyhow::Ok(())
        })
        .on(|ev: ScanEvent| async move {
            info!(from = %ev.from_user_name, scene = %ev.event_key, "scanned QR code");
            anyhow::Ok(())
        })
        .on(|ev: UnsubscribeEvent| async move {
            info!(from = %ev.from_user_name, "unfollowed");
            anyhow::Ok(())
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let _ = dotenvy::dotenv();

    let cfg = WxConfig::from_env().context("load config")?;
    if cfg.callback_token.is_none() {
        anyhow::bail!("set WX_CALLBACK_TOKEN (the Token configured in the admin console)");
    }
    let app = WxApp::from_config(&cfg, handlers()).await?;
    info!(?app, "webhook app ready");

    let state = AppState { app: Arc::new(app) };
    let router = Router::new()
        .route("/health", get(health))
        .route("/wechat", get(verify_url).post(receive))
        .with_state(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router).await?;

    Ok(())
}
