//! WeChat Official Account / Mini Program HTTP client.
//!
//! Provides the credential type, the access_token grant call and the generic
//! JSON request helpers the REST wrappers are built on.
//!
//! Design:
//! - `WxClient` handles HTTP and maps provider errors; token caching/refresh lives in
//!   [`crate::token_manager::TokenManager`].
//! - Provider-reported failures (`errcode != 0`) surface as [`Error::Wx`] verbatim.
//! - Errors are unified via `Error`.
//!
//! Endpoint:
//! - GET https://api.weixin.qq.com/cgi-bin/token?grant_type=client_credential&appid=APPID&secret=APPSECRET
//!
//! Example (pseudo usage):
//! ```ignore
//! use wxapi_rs::{Credentials, WxClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = WxClient::default();
//!     let token = client
//!         .get_access_token(&Credentials::new("your_appid", "your_appsecret"))
//!         .await?;
//!     println!("token: {}, expires_in: {}", token.access_token, token.expires_in);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::errcode;

/// Default provider domain
pub const DEFAULT_DOMAIN: &str = "https://api.weixin.qq.com";

/// Application identity: appid + appsecret
#[derive(Clone)]
pub struct Credentials {
    pub app_id: String,
    pub secret: String,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            secret: secret.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &redact_id(&self.app_id))
            .field("secret", &"[redacted]")
            .finish()
    }
}

/// Successful access_token response
#[derive(Clone, Debug, Deserialize)]
pub struct AccessToken {
    /// Access token string
    pub access_token: String,
    /// Expiration in seconds
    pub expires_in: i64,
}

/// WeChat API error response
#[derive(Clone, Debug, Deserialize)]
pub struct WxError {
    pub errcode: i64,
    #[serde(default)]
    pub errmsg: String,
}

/// Raw token response (either success or error)
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum TokenRawResp {
    Ok(AccessToken),
    Err(WxError),
}

/// Envelope shared by every JSON API response; absent fields mean success.
#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Unified error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unexpected http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("weixin error {code}: {message}")]
    Wx { code: i64, message: String },

    #[error("unexpected response (status {status}): {error}; body: {body}")]
    UnexpectedResponse {
        status: u16,
        error: String,
        body: String,
    },
}

impl Error {
    /// Provider errcode, when the provider reported one
    pub fn wx_code(&self) -> Option<i64> {
        match self {
            Error::Wx { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Source of fresh access tokens.
///
/// `WxClient` is the production implementation; tests substitute their own.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self, credentials: &Credentials) -> Result<AccessToken>;
}

/// Base client for the WeChat server APIs
///
/// - Wraps `reqwest::Client`
/// - Provides token fetching (no caching/auto-refresh here)
/// - Easy to extend for more APIs
#[derive(Clone, Debug)]
pub struct WxClient {
    http: reqwest::Client,
    domain: String,
}

impl Default for WxClient {
    fn default() -> Self {
        let http = reqwest::Client::builder()
            .gzip(true)
            .build()
            .unwrap_or_default();
        Self {
            http,
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }
}

impl WxClient {
    /// Use a custom `reqwest::Client`
    pub fn with_http(http: reqwest::Client) -> Self {
        Self {
            http,
            domain: DEFAULT_DOMAIN.to_string(),
        }
    }

    /// Override the API domain, e.g. `api2.weixin.qq.com` for a regional entry point.
    ///
    /// A bare host gets an `https://` scheme.
    pub fn with_domain(mut self, domain: impl AsRef<str>) -> Self {
        let domain = domain.as_ref().trim_end_matches('/');
        self.domain = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        };
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Build an endpoint URL under the configured domain.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.domain, path)).map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    /// Endpoint URL carrying the `access_token` query parameter.
    pub(crate) fn endpoint_with_token(&self, path: &str, access_token: &str) -> Result<Url> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut()
            .append_pair("access_token", access_token);
        Ok(url)
    }

    /// Fetch access_token
    ///
    /// GET {domain}/cgi-bin/token
    /// params: grant_type=client_credential, appid, secret (do not log secrets)
    #[instrument(level = "debug", skip(self, credentials))]
    pub async fn get_access_token(&self, credentials: &Credentials) -> Result<AccessToken> {
        let mut url = self.endpoint("/cgi-bin/token")?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("grant_type", "client_credential");
            qp.append_pair("appid", &credentials.app_id);
            qp.append_pair("secret", &credentials.secret);
        }
        if credentials.app_id.starts_with("ww") {
            warn!(
                "Detected appid starting with 'ww' (likely a WeCom corpid). Official Account / Mini Program APIs need the wx... appid."
            );
        }
        debug!(
            "Requesting access_token (no secrets), appid hint: {}",
            redact_id(&credentials.app_id)
        );

        let resp = self.http.get(url).send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        parse_token_response(status, &bytes)
    }

    /// GET a JSON endpoint and decode it into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(path = url.path(), "GET");
        let resp = self.http.get(url).send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        decode_json(status, &bytes)
    }

    /// POST a JSON body and decode the JSON answer into `T`.
    pub async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(path = url.path(), "POST");
        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await?;
        decode_json(status, &bytes)
    }
}

#[async_trait]
impl TokenProvider for WxClient {
    async fn fetch_token(&self, credentials: &Credentials) -> Result<AccessToken> {
        self.get_access_token(credentials).await
    }
}

/// Decode the token grant answer (success or provider error).
pub(crate) fn parse_token_response(status: u16, bytes: &[u8]) -> Result<AccessToken> {
    match serde_json::from_slice::<TokenRawResp>(bytes) {
        Ok(TokenRawResp::Ok(ok)) => Ok(ok),
        // errcode 0 is success, but there is no token to return
        Ok(TokenRawResp::Err(err)) if err.errcode == 0 => Err(Error::UnexpectedResponse {
            status,
            error: "missing access_token".to_string(),
            body: redact_body(bytes),
        }),
        Ok(TokenRawResp::Err(err)) => {
            let mut message = err.errmsg;
            if let Some(hint) = errcode::credential_hint(err.errcode) {
                message.push_str("; hint: ");
                message.push_str(hint);
            }
            Err(Error::Wx {
                code: err.errcode,
                message,
            })
        }
        Err(de_err) => Err(Error::UnexpectedResponse {
            status,
            error: de_err.to_string(),
            body: redact_body(bytes),
        }),
    }
}

/// Decode a generic JSON API answer, mapping non-2xx and `errcode != 0` to errors.
pub(crate) fn decode_json<T: DeserializeOwned>(status: u16, bytes: &[u8]) -> Result<T> {
    if !(200..300).contains(&status) {
        return Err(Error::HttpStatus {
            status,
            body: redact_body(bytes),
        });
    }
    if let Ok(env) = serde_json::from_slice::<Envelope>(bytes) {
        if env.errcode != 0 {
            return Err(Error::Wx {
                code: env.errcode,
                message: env.errmsg,
            });
        }
    }
    serde_json::from_slice::<T>(bytes).map_err(|de_err| Error::UnexpectedResponse {
        status,
        error: de_err.to_string(),
        body: redact_body(bytes),
    })
}

/// Redact and truncate a response body so tokens never reach error messages or logs.
fn redact_body(bytes: &[u8]) -> String {
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if let Ok(mut v) = serde_json::from_str::<serde_json::Value>(&body) {
        if let Some(obj) = v.as_object_mut() {
            for field in ["access_token", "session_key"] {
                if obj.contains_key(field) {
                    obj.insert(
                        field.to_string(),
                        serde_json::Value::String("[redacted]".into()),
                    );
                }
            }
        }
        if let Ok(s) = serde_json::to_string(&v) {
            body = s;
        }
    }
    if body.len() > 2048 {
        let mut cut = 2048;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

/// Redact an ID for logs: keep first 2 and last 2 chars where possible
pub(crate) fn redact_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    if chars.len() <= 4 {
        format!("{}***", id)
    } else {
        let head: String = chars[..2].iter().collect();
        let tail: String = chars[chars.len() - 2..].iter().collect();
        format!("{head}***{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_success_body() {
        let tok = parse_token_response(200, br#"{"access_token":"ACCESS_TOKEN","expires_in":7200}"#)
            .expect("token");
        assert_eq!(tok.access_token, "ACCESS_TOKEN");
        assert_eq!(tok.expires_in, 7200);
    }

    #[test]
    fn token_error_body_keeps_code() {
        let err = parse_token_response(200, br#"{"errcode":40013,"errmsg":"invalid appid"}"#)
            .unwrap_err();
        match err {
            Error::Wx { code, message } => {
                assert_eq!(code, 40013);
                assert!(message.starts_with("invalid appid"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn token_garbage_body_is_unexpected() {
        let err = parse_token_response(502, b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse { status: 502, .. }));
    }

    #[test]
    fn token_zero_errcode_without_token_is_unexpected() {
        let err = parse_token_response(200, br#"{"errcode":0,"errmsg":"ok"}"#).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse { status: 200, .. }));
        assert_eq!(err.wx_code(), None);
    }

    #[test]
    fn json_errcode_maps_to_wx_error() {
        let err = decode_json::<serde_json::Value>(200, br#"{"errcode":45009,"errmsg":"reach max api daily quota limit"}"#)
            .unwrap_err();
        assert_eq!(err.wx_code(), Some(45009));
    }

    #[test]
    fn json_zero_errcode_is_success() {
        #[derive(Deserialize)]
        struct Ticket {
            ticket: String,
        }
        let t: Ticket = decode_json(200, br#"{"errcode":0,"errmsg":"ok","ticket":"T"}"#).expect("ok");
        assert_eq!(t.ticket, "T");
    }

    #[test]
    fn non_success_status_redacts_token() {
        let err = decode_json::<serde_json::Value>(500, br#"{"access_token":"SECRET","expires_in":7200}"#)
            .unwrap_err();
        match err {
            Error::HttpStatus { status, body } => {
                assert_eq!(status, 500);
                assert!(!body.contains("SECRET"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn domain_override_adds_scheme() {
        let client = WxClient::default().with_domain("api2.weixin.qq.com/");
        assert_eq!(client.domain(), "https://api2.weixin.qq.com");
        let url = client.endpoint_with_token("/cgi-bin/menu/create", "TOK").expect("url");
        assert_eq!(
            url.as_str(),
            "https://api2.weixin.qq.com/cgi-bin/menu/create?access_token=TOK"
        );
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let c = Credentials::new("wx1234567890", "topsecret");
        let s = format!("{c:?}");
        assert!(!s.contains("topsecret"));
        assert!(s.contains("wx***90"));
    }
}
