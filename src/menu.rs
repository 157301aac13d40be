//! Custom menu API
//!
//! Endpoints:
//!   POST https://api.weixin.qq.com/cgi-bin/menu/create?access_token=ACCESS_TOKEN
//!   GET  https://api.weixin.qq.com/cgi-bin/get_current_selfmenu_info?access_token=ACCESS_TOKEN
//!
//! Request body example:
//! {
//!   "button": [
//!     { "type": "click", "name": "今日歌曲", "key": "V1001_TODAY_MUSIC" },
//!     {
//!       "name": "菜单",
//!       "sub_button": [
//!         { "type": "view", "name": "搜索", "url": "http://www.soso.com/" }
//!       ]
//!     }
//!   ]
//! }
//!
//! Notes:
//! - Up to 3 top-level buttons, each with up to 5 sub buttons.
//! - Clicking a `click` button pushes a `CLICK` event carrying `key` as `EventKey`;
//!   `view` buttons push a `VIEW` event.
//! - Menu changes may take a few minutes to reach clients.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::client::{Result, WxClient, WxError};

/// Full menu definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Menu {
    pub button: Vec<MenuButton>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuButton {
    /// click, view, miniprogram, scancode_push, ...; absent on parent buttons
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Mini Program appid (`miniprogram` buttons)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagepath: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_button: Vec<MenuButton>,
}

impl MenuButton {
    pub fn click(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: Some("click".into()),
            name: name.into(),
            key: Some(key.into()),
            ..Default::default()
        }
    }

    pub fn view(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: Some("view".into()),
            name: name.into(),
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// `url` is the fallback page for clients without Mini Program support.
    pub fn mini_program(
        name: impl Into<String>,
        appid: impl Into<String>,
        pagepath: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            kind: Some("miniprogram".into()),
            name: name.into(),
            url: Some(url.into()),
            appid: Some(appid.into()),
            pagepath: Some(pagepath.into()),
            ..Default::default()
        }
    }

    pub fn parent(name: impl Into<String>, sub_button: Vec<MenuButton>) -> Self {
        Self {
            name: name.into(),
            sub_button,
            ..Default::default()
        }
    }
}

/// Response for get_current_selfmenu_info
#[derive(Debug, Clone, Deserialize)]
pub struct SelfMenuInfo {
    /// 1 when a menu is enabled
    pub is_menu_open: i32,
    /// Menu tree as configured (admin console or API); shape varies by button type
    #[serde(default)]
    pub selfmenu_info: Option<serde_json::Value>,
}

impl WxClient {
    /// Call menu/create, replacing the current menu.
    #[instrument(level = "debug", skip(self, access_token, menu))]
    pub async fn create_menu(&self, access_token: &str, menu: &Menu) -> Result<()> {
        let url = self.endpoint_with_token("/cgi-bin/menu/create", access_token)?;
        let _: WxError = self.post_json(url, menu).await?;
        Ok(())
    }

    /// Current menu configuration
    #[instrument(level = "debug", skip(self, access_token))]
    pub async fn current_selfmenu_info(&self, access_token: &str) -> Result<SelfMenuInfo> {
        let url = self.selfmenu_info_url(access_token)?;
        self.get_json(url).await
    }

    fn selfmenu_info_url(&self, access_token: &str) -> Result<Url> {
        self.endpoint_with_token("/cgi-bin/get_current_selfmenu_info", access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn menu_serializes_without_empty_fields() {
        let menu = Menu {
            button: vec![
                MenuButton::click("今日歌曲", "V1001_TODAY_MUSIC"),
                MenuButton::parent(
                    "菜单",
                    vec![
                        MenuButton::view("搜索", "http://www.soso.com/"),
                        MenuButton::mini_program(
                            "wxa",
                            "wx286b93c14bbf93aa",
                            "pages/lunar/index",
                            "http://mp.weixin.qq.com",
                        ),
                    ],
                ),
            ],
        };
        let v = serde_json::to_value(&menu).expect("json");
        assert_eq!(
            v,
            json!({
                "button": [
                    {"type": "click", "name": "今日歌曲", "key": "V1001_TODAY_MUSIC"},
                    {
                        "name": "菜单",
                        "sub_button": [
                            {"type": "view", "name": "搜索", "url": "http://www.soso.com/"},
                            {
                                "type": "miniprogram",
                                "name": "wxa",
                                "url": "http://mp.weixin.qq.com",
                                "appid": "wx286b93c14bbf93aa",
                                "pagepath": "pages/lunar/index"
                            }
                        ]
                    }
                ]
            })
        );
    }

    #[test]
    fn selfmenu_url_carries_token() {
        let client = WxClient::default().with_domain("api2.weixin.qq.com");
        let url = client.selfmenu_info_url("TOKEN").expect("url");
        assert_eq!(
            url.as_str(),
            "https://api2.weixin.qq.com/cgi-bin/get_current_selfmenu_info?access_token=TOKEN"
        );
    }

    #[test]
    fn selfmenu_info_decodes() {
        let info: SelfMenuInfo = serde_json::from_value(json!({
            "is_menu_open": 1,
            "selfmenu_info": {"button": [{"type": "click", "name": "今日歌曲", "key": "V1001"}]}
        }))
        .expect("decode");
        assert_eq!(info.is_menu_open, 1);
        assert!(info.selfmenu_info.is_some());
    }
}
