//! Parametric QR codes
//!
//! Endpoints:
//!   POST https://api.weixin.qq.com/cgi-bin/qrcode/create?access_token=ACCESS_TOKEN
//!   GET  https://mp.weixin.qq.com/cgi-bin/showqrcode?ticket=TICKET   (image, no token)
//!
//! Request body examples:
//!   temporary, integer scene:
//!   {"expire_seconds": 604800, "action_name": "QR_SCENE", "action_info": {"scene": {"scene_id": 123}}}
//!   permanent, string scene:
//!   {"action_name": "QR_LIMIT_STR_SCENE", "action_info": {"scene": {"scene_str": "test"}}}
//!
//! Successful response example:
//! {"ticket": "gQH47joAAAAAAAAAASxodHRwOi8vd2VpeGluLnFxLmNvbS9xL2taZ2Z3TVRtNzJXV1Brb3ZhYmJJAAIEZ23sUwMEmm3sUw==",
//!  "expire_seconds": 60, "url": "http://weixin.qq.com/q/kZgfwMTm72WWPkovabbI"}
//!
//! Scanning a code pushes `subscribe` (new follower, `EventKey` = `qrscene_` + scene)
//! or `SCAN` (existing follower, `EventKey` = scene) with the code's `Ticket`.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::client::{Error, Result, WxClient};

/// Longest lifetime of a temporary code (30 days)
pub const MAX_TEMPORARY_EXPIRE_SECS: u32 = 2_592_000;

const SHOW_QRCODE_URL: &str = "https://mp.weixin.qq.com/cgi-bin/showqrcode";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QrCodeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_seconds: Option<u32>,
    /// QR_SCENE, QR_STR_SCENE, QR_LIMIT_SCENE, QR_LIMIT_STR_SCENE
    pub action_name: &'static str,
    pub action_info: ActionInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionInfo {
    pub scene: Scene,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scene {
    Id { scene_id: u32 },
    Str { scene_str: String },
}

impl QrCodeRequest {
    /// Temporary code with an integer scene; `expire_seconds` is capped at 30 days.
    pub fn temporary(scene_id: u32, expire_seconds: u32) -> Self {
        Self {
            expire_seconds: Some(expire_seconds.min(MAX_TEMPORARY_EXPIRE_SECS)),
            action_name: "QR_SCENE",
            action_info: ActionInfo {
                scene: Scene::Id { scene_id },
            },
        }
    }

    pub fn temporary_str(scene_str: impl Into<String>, expire_seconds: u32) -> Self {
        Self {
            expire_seconds: Some(expire_seconds.min(MAX_TEMPORARY_EXPIRE_SECS)),
            action_name: "QR_STR_SCENE",
            action_info: ActionInfo {
                scene: Scene::Str {
                    scene_str: scene_str.into(),
                },
            },
        }
    }

    /// Permanent code; scene_id must be 1..=100000.
    pub fn permanent(scene_id: u32) -> Self {
        Self {
            expire_seconds: None,
            action_name: "QR_LIMIT_SCENE",
            action_info: ActionInfo {
                scene: Scene::Id { scene_id },
            },
        }
    }

    pub fn permanent_str(scene_str: impl Into<String>) -> Self {
        Self {
            expire_seconds: None,
            action_name: "QR_LIMIT_STR_SCENE",
            action_info: ActionInfo {
                scene: Scene::Str {
                    scene_str: scene_str.into(),
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QrCodeTicket {
    pub ticket: String,
    /// Absent for permanent codes
    #[serde(default)]
    pub expire_seconds: Option<u32>,
    /// Content encoded in the image; render it yourself to skip showqrcode
    pub url: String,
}

impl QrCodeTicket {
    pub fn image_url(&self) -> Result<Url> {
        qrcode_image_url(&self.ticket)
    }
}

/// Image URL for a ticket. The ticket is URL-encoded.
pub fn qrcode_image_url(ticket: &str) -> Result<Url> {
    Url::parse_with_params(SHOW_QRCODE_URL, &[("ticket", ticket)])
        .map_err(|e| Error::InvalidUrl(e.to_string()))
}

impl WxClient {
    /// Call qrcode/create
    #[instrument(level = "debug", skip(self, access_token))]
    pub async fn create_qrcode(
        &self,
        access_token: &str,
        req: &QrCodeRequest,
    ) -> Result<QrCodeTicket> {
        let url = self.endpoint_with_token("/cgi-bin/qrcode/create", access_token)?;
        self.post_json(url, req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_shapes() {
        assert_eq!(
            serde_json::to_value(QrCodeRequest::temporary(123, 604800)).expect("json"),
            json!({"expire_seconds": 604800, "action_name": "QR_SCENE", "action_info": {"scene": {"scene_id": 123}}})
        );
        assert_eq!(
            serde_json::to_value(QrCodeRequest::permanent_str("test")).expect("json"),
            json!({"action_name": "QR_LIMIT_STR_SCENE", "action_info": {"scene": {"scene_str": "test"}}})
        );
    }

    #[test]
    fn temporary_expiry_is_capped() {
        let req = QrCodeRequest::temporary_str("promo", u32::MAX);
        assert_eq!(req.expire_seconds, Some(MAX_TEMPORARY_EXPIRE_SECS));
    }

    #[test]
    fn ticket_is_url_encoded() {
        let ticket: QrCodeTicket = serde_json::from_value(json!({
            "ticket": "gQH47joAAAAAAAAAASxodHRw+Lw==",
            "expire_seconds": 60,
            "url": "http://weixin.qq.com/q/kZgfwMTm72WWPkovabbI"
        }))
        .expect("decode");
        let url = ticket.image_url().expect("url");
        assert_eq!(
            url.as_str(),
            "https://mp.weixin.qq.com/cgi-bin/showqrcode?ticket=gQH47joAAAAAAAAAASxodHRw%2BLw%3D%3D"
        );
    }
}
