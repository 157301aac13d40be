//! User management: basic profile of a follower
//!
//! Endpoint (GET):
//!   https://api.weixin.qq.com/cgi-bin/user/info?access_token=ACCESS_TOKEN&openid=OPENID&lang=zh_CN
//!
//! Successful response example:
//! {
//!   "subscribe": 1,
//!   "openid": "o6_bmjrPTlm6_2sgVt7hMZOPfL2M",
//!   "language": "zh_CN",
//!   "subscribe_time": 1382694957,
//!   "unionid": "o6_bmasdasdsad6_2sgVt7hMZOPfL",
//!   "remark": "",
//!   "groupid": 0,
//!   "tagid_list": [128, 2],
//!   "subscribe_scene": "ADD_SCENE_QR_CODE",
//!   "qr_scene": 98765,
//!   "qr_scene_str": ""
//! }
//!
//! When `subscribe` is 0 the user does not follow the account and only `openid`
//! (plus `unionid` when bound) is returned.

use reqwest::Url;
use serde::Deserialize;
use tracing::instrument;

use crate::client::{Result, WxClient};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UserInfo {
    /// 1 = following, 0 = not following
    #[serde(default)]
    pub subscribe: i32,
    pub openid: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub subscribe_time: Option<i64>,
    #[serde(default)]
    pub unionid: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub groupid: Option<i64>,
    #[serde(default)]
    pub tagid_list: Vec<i64>,
    /// ADD_SCENE_SEARCH, ADD_SCENE_QR_CODE, ...
    #[serde(default)]
    pub subscribe_scene: Option<String>,
    #[serde(default)]
    pub qr_scene: Option<i64>,
    #[serde(default)]
    pub qr_scene_str: Option<String>,
}

impl UserInfo {
    pub fn is_following(&self) -> bool {
        self.subscribe == 1
    }
}

impl WxClient {
    /// Call user/info. `lang` defaults to `zh_CN` on the server when `None`.
    #[instrument(level = "debug", skip(self, access_token))]
    pub async fn user_info(
        &self,
        access_token: &str,
        openid: &str,
        lang: Option<&str>,
    ) -> Result<UserInfo> {
        let url = self.user_info_url(access_token, openid, lang)?;
        self.get_json(url).await
    }

    fn user_info_url(&self, access_token: &str, openid: &str, lang: Option<&str>) -> Result<Url> {
        let mut url = self.endpoint_with_token("/cgi-bin/user/info", access_token)?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("openid", openid);
            if let Some(lang) = lang {
                qp.append_pair("lang", lang);
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_includes_openid_and_lang() {
        let url = WxClient::default()
            .user_info_url("TOKEN", "o6_bmjrPTlm6", Some("en"))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.weixin.qq.com/cgi-bin/user/info?access_token=TOKEN&openid=o6_bmjrPTlm6&lang=en"
        );
        let url = WxClient::default()
            .user_info_url("TOKEN", "o6", None)
            .expect("url");
        assert!(!url.as_str().contains("lang="));
    }

    #[test]
    fn follower_profile_decodes() {
        let info: UserInfo = serde_json::from_value(json!({
            "subscribe": 1,
            "openid": "o6_bmjrPTlm6_2sgVt7hMZOPfL2M",
            "language": "zh_CN",
            "subscribe_time": 1382694957,
            "unionid": "o6_bmasdasdsad6_2sgVt7hMZOPfL",
            "remark": "",
            "groupid": 0,
            "tagid_list": [128, 2],
            "subscribe_scene": "ADD_SCENE_QR_CODE",
            "qr_scene": 98765,
            "qr_scene_str": ""
        }))
        .expect("decode");
        assert!(info.is_following());
        assert_eq!(info.tagid_list, vec![128, 2]);
        assert_eq!(info.qr_scene, Some(98765));
    }

    #[test]
    fn non_follower_has_only_openid() {
        let info: UserInfo =
            serde_json::from_value(json!({"subscribe": 0, "openid": "oX"})).expect("decode");
        assert!(!info.is_following());
        assert_eq!(info.subscribe_time, None);
        assert!(info.tagid_list.is_empty());
    }
}
