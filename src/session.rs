//! Mini Program login and phone number
//!
//! Endpoints:
//!   GET  https://api.weixin.qq.com/sns/jscode2session?appid=APPID&secret=SECRET&js_code=JSCODE&grant_type=authorization_code
//!   POST https://api.weixin.qq.com/wxa/business/getuserphonenumber?access_token=ACCESS_TOKEN
//!        body: {"code": "e31968a7f94cc5ee25fafc2aef2773f0bb8c3937b22520eb8ee345274d00c144"}
//!
//! Notes:
//! - jscode2session authenticates with appid/secret, not access_token.
//! - Each `js_code` from wx.login() and each phone `code` is single-use.
//! - `session_key` must stay on the server; it is redacted from Debug output.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::{Credentials, Result, WxClient, redact_id};

#[derive(Clone, Deserialize)]
pub struct Session {
    pub openid: String,
    pub session_key: String,
    /// Present when the Mini Program is bound to an Open Platform account
    #[serde(default)]
    pub unionid: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("openid", &self.openid)
            .field("session_key", &"[redacted]")
            .field("unionid", &self.unionid)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhoneInfo {
    /// With country code for non-mainland numbers
    pub phone_number: String,
    pub pure_phone_number: String,
    pub country_code: String,
    pub watermark: Watermark,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Watermark {
    pub timestamp: i64,
    pub appid: String,
}

#[derive(Serialize)]
struct PhoneNumberRequest<'a> {
    code: &'a str,
}

#[derive(Deserialize)]
struct PhoneNumberResponse {
    phone_info: PhoneInfo,
}

impl WxClient {
    /// Exchange a wx.login() code for the user's openid and session_key.
    #[instrument(level = "debug", skip_all)]
    pub async fn code_to_session(&self, credentials: &Credentials, js_code: &str) -> Result<Session> {
        let url = self.jscode2session_url(credentials, js_code)?;
        debug!(appid = %redact_id(&credentials.app_id), "jscode2session");
        self.get_json(url).await
    }

    /// Exchange a getPhoneNumber button code for the bound phone number.
    #[instrument(level = "debug", skip_all)]
    pub async fn phone_number(&self, access_token: &str, code: &str) -> Result<PhoneInfo> {
        let url = self.endpoint_with_token("/wxa/business/getuserphonenumber", access_token)?;
        let resp: PhoneNumberResponse = self.post_json(url, &PhoneNumberRequest { code }).await?;
        Ok(resp.phone_info)
    }

    fn jscode2session_url(&self, credentials: &Credentials, js_code: &str) -> Result<Url> {
        let mut url = self.endpoint("/sns/jscode2session")?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("appid", &credentials.app_id);
            qp.append_pair("secret", &credentials.secret);
            qp.append_pair("js_code", js_code);
            qp.append_pair("grant_type", "authorization_code");
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Error, decode_json};

    #[test]
    fn jscode2session_query() {
        let url = WxClient::default()
            .jscode2session_url(&Credentials::new("wxapp", "sec"), "CODE")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.weixin.qq.com/sns/jscode2session?appid=wxapp&secret=sec&js_code=CODE&grant_type=authorization_code"
        );
    }

    #[test]
    fn session_debug_hides_session_key() {
        let s: Session = decode_json(
            200,
            br#"{"openid":"oUser","session_key":"tiihtNczf5v6AKRyjwEUhQ==","unionid":"uX"}"#,
        )
        .expect("decode");
        let dbg = format!("{s:?}");
        assert!(dbg.contains("oUser"));
        assert!(!dbg.contains("tiihtNczf5v6AKRyjwEUhQ"));
    }

    #[test]
    fn used_code_is_provider_error() {
        let err = decode_json::<Session>(200, br#"{"errcode":40163,"errmsg":"code been used"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::Wx { code: 40163, .. }));
    }

    #[test]
    fn phone_info_decodes() {
        let resp: PhoneNumberResponse = decode_json(
            200,
            br#"{
                "errcode": 0,
                "errmsg": "ok",
                "phone_info": {
                    "phoneNumber": "+86 13800138000",
                    "purePhoneNumber": "13800138000",
                    "countryCode": "86",
                    "watermark": {"timestamp": 1637744274, "appid": "wxapp"}
                }
            }"#,
        )
        .expect("decode");
        assert_eq!(resp.phone_info.pure_phone_number, "13800138000");
        assert_eq!(resp.phone_info.watermark.appid, "wxapp");
    }
}
