//! Webhook signature checks.
//!
//! WeChat signs every push (and the URL verification GET) with
//! `sha1(sort([token, timestamp, nonce]).concat())` in lowercase hex and passes it
//! as the `signature` query parameter.

use serde::Deserialize;
use sha1::{Digest, Sha1};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature mismatch")]
    Mismatch,
    #[error("missing query parameter: {0}")]
    MissingParam(&'static str),
}

/// SHA1 over the lexicographically sorted parts, lowercase hex.
pub fn sha1_signature(parts: &[&str]) -> String {
    let mut v = parts.to_vec();
    v.sort_unstable();
    let mut hasher = Sha1::new();
    for p in v {
        hasher.update(p.as_bytes());
    }
    hex::encode(hasher.finalize())
}

pub fn verify_url_signature(token: &str, timestamp: &str, nonce: &str, signature: &str) -> bool {
    let calc = sha1_signature(&[token, timestamp, nonce]);
    calc.eq_ignore_ascii_case(signature)
}

/// Server URL verification: returns `echostr` when the signature matches.
pub fn verify_plain_url_echostr(
    token: &str,
    timestamp: &str,
    nonce: &str,
    signature: &str,
    echostr: &str,
) -> Result<String, SignatureError> {
    if verify_url_signature(token, timestamp, nonce, signature) {
        Ok(echostr.to_string())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Query string WeChat appends to webhook requests.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureQuery {
    pub signature: Option<String>,
    pub timestamp: Option<String>,
    pub nonce: Option<String>,
    /// Only present on the URL verification GET
    pub echostr: Option<String>,
    pub openid: Option<String>,
}

impl SignatureQuery {
    pub fn verify(&self, token: &str) -> Result<(), SignatureError> {
        let signature = require(&self.signature, "signature")?;
        let timestamp = require(&self.timestamp, "timestamp")?;
        let nonce = require(&self.nonce, "nonce")?;
        if verify_url_signature(token, timestamp, nonce, signature) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Verify and hand back `echostr` for the GET handshake.
    pub fn echo(&self, token: &str) -> Result<String, SignatureError> {
        self.verify(token)?;
        require(&self.echostr, "echostr").map(str::to_string)
    }
}

fn require<'a>(v: &'a Option<String>, name: &'static str) -> Result<&'a str, SignatureError> {
    v.as_deref().ok_or(SignatureError::MissingParam(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_order_independent() {
        let a = sha1_signature(&["token", "1700000000", "nonce"]);
        let b = sha1_signature(&["nonce", "token", "1700000000"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_digest() {
        // sha1("abc")
        assert_eq!(
            sha1_signature(&["b", "c", "a"]),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn echostr_only_on_match() {
        let sig = sha1_signature(&["tok", "123", "n"]);
        assert_eq!(
            verify_plain_url_echostr("tok", "123", "n", &sig.to_uppercase(), "echo").as_deref(),
            Ok("echo")
        );
        assert_eq!(
            verify_plain_url_echostr("other", "123", "n", &sig, "echo"),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn query_reports_missing_params() {
        let q = SignatureQuery {
            signature: Some(sha1_signature(&["tok", "1", "2"])),
            timestamp: Some("1".into()),
            nonce: Some("2".into()),
            ..Default::default()
        };
        assert_eq!(q.verify("tok"), Ok(()));
        assert_eq!(q.echo("tok"), Err(SignatureError::MissingParam("echostr")));

        let empty = SignatureQuery::default();
        assert_eq!(empty.verify("tok"), Err(SignatureError::MissingParam("signature")));
    }
}
