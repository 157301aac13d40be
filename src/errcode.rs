//! Official Account / Mini Program errcode helpers
//!
//! Maps well-known global `errcode` values to categories, hints and a retry /
//! token-refresh recommendation.
//!
//! Program logic should depend on `errcode`, never on `errmsg`; `errmsg` may change
//! and is only diagnostic text. Unknown codes are categorized as `Unknown` with a
//! conservative policy: no retry, no token refresh.

/// High-level classification for an error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// errcode = 0
    Success,
    /// System busy; retryable
    TemporarySystem,
    /// Credential / token problem (fix credentials or refresh token)
    Auth,
    /// Caller IP not whitelisted or API not granted
    Permission,
    /// Invalid parameter
    InvalidParam,
    /// Quota or frequency limit
    Limit,
    Unknown,
}

/// Recommendation for retry strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAdvice {
    pub retry: bool,
    /// First backoff in milliseconds (if retry)
    pub initial_backoff_ms: Option<u64>,
    pub max_retries: Option<u8>,
    pub reason: &'static str,
}

impl RetryAdvice {
    pub const NO: RetryAdvice = RetryAdvice {
        retry: false,
        initial_backoff_ms: None,
        max_retries: None,
        reason: "do not retry",
    };
    pub const TRANSIENT_3: RetryAdvice = RetryAdvice {
        retry: true,
        initial_backoff_ms: Some(300),
        max_retries: Some(3),
        reason: "transient/system busy; retry with backoff",
    };
    pub const AFTER_REFRESH: RetryAdvice = RetryAdvice {
        retry: true,
        initial_backoff_ms: Some(0),
        max_retries: Some(1),
        reason: "token rejected; refresh access_token then retry once",
    };
}

/// A compact, friendly explanation for an errcode.
#[derive(Debug, Clone)]
pub struct ErrorHelp {
    pub code: i64,
    pub category: ErrorCategory,
    pub summary: &'static str,
    pub hint: &'static str,
    pub retry: RetryAdvice,
    /// Whether the access_token should be re-acquired
    pub refresh_token: bool,
}

/// Classify errcode into a category.
pub fn category_for(code: i64) -> ErrorCategory {
    match code {
        0 => ErrorCategory::Success,
        -1 => ErrorCategory::TemporarySystem,
        40001 | 40013 | 40014 | 40125 | 41001 | 42001 => ErrorCategory::Auth,
        40164 | 48001 | 50001 => ErrorCategory::Permission,
        40002 | 40003 | 40029 | 40163 | 40053 | 40054 | 40055 | 41002 | 41004 => {
            ErrorCategory::InvalidParam
        }
        45009 | 45011 | 45030 => ErrorCategory::Limit,
        _ => ErrorCategory::Unknown,
    }
}

/// Short, stable summary for a code.
pub fn summary_for(code: i64) -> &'static str {
    match code {
        -1 => "System busy",
        0 => "Success",
        40001 => "Invalid credential or access_token",
        40002 => "Invalid grant_type",
        40003 => "Invalid openid",
        40013 => "Invalid appid",
        40014 => "Invalid access_token",
        40029 => "Invalid code",
        40053 | 40054 | 40055 => "Invalid menu button",
        40125 => "Invalid appsecret",
        40163 => "Code already used",
        40164 => "Caller IP not in whitelist",
        41001 => "Missing access_token",
        41002 => "Missing appid",
        41004 => "Missing appsecret",
        42001 => "access_token expired",
        45009 => "API daily quota reached",
        45011 => "API frequency limit",
        45030 => "Too many QR codes",
        48001 => "API unauthorized",
        50001 => "User not authorized for this API",
        _ => "Unknown error",
    }
}

/// Returns a friendly hint for a known errcode.
pub fn hint_for(code: i64) -> &'static str {
    match code {
        -1 => "System busy; retry with backoff (<=3 attempts).",
        0 => "Success.",
        40001 => {
            "Credential rejected; verify the appsecret, or another service refreshed the token (each grant invalidates older tokens). Refresh and retry."
        }
        40002 => "grant_type must be client_credential for the token endpoint.",
        40013 => "Invalid appid; Official Account and Mini Program appids start with 'wx'.",
        40014 => "Invalid access_token; reacquire it, then retry.",
        40029 => "Invalid js_code; each wx.login() code is single-use and short-lived.",
        40125 => "Invalid appsecret; reset it in the admin console if it was rotated.",
        40163 => "The code was already exchanged; call wx.login() again.",
        40164 => "Add the caller's egress IP to the API IP whitelist in the admin console.",
        41001 => "Request is missing the access_token query parameter.",
        42001 => "access_token expired; refresh it and retry.",
        45009 => "Daily quota reached; the quota resets at midnight or can be cleared once via clear_quota.",
        45011 => "Calling too frequently; slow down and retry later.",
        48001 => "The account lacks permission for this API; check account type and verification.",
        _ => "Unknown code; refer to official docs and logs for details.",
    }
}

/// Extra hint appended to token-grant failures that usually stem from wrong credentials.
pub(crate) fn credential_hint(code: i64) -> Option<&'static str> {
    match code {
        40001 | 40013 | 40125 | 40164 | 40002 => Some(hint_for(code)),
        _ => None,
    }
}

/// Whether to retry, and how.
pub fn should_retry(code: i64) -> RetryAdvice {
    match code {
        -1 => RetryAdvice::TRANSIENT_3,
        40001 | 40014 | 42001 => RetryAdvice::AFTER_REFRESH,
        _ => RetryAdvice::NO,
    }
}

/// Whether to refresh/reacquire access_token for this code.
pub fn should_refresh_token(code: i64) -> bool {
    matches!(code, 40001 | 40014 | 42001)
}

/// Build a structured help object for a given errcode.
pub fn lookup(code: i64) -> ErrorHelp {
    ErrorHelp {
        code,
        category: category_for(code),
        summary: summary_for(code),
        hint: hint_for(code),
        retry: should_retry(code),
        refresh_token: should_refresh_token(code),
    }
}

/// Produce a concise, human-readable explanation string.
pub fn explain(errcode: i64, errmsg: &str) -> String {
    let help = lookup(errcode);
    let mut parts = vec![
        format!("errcode={} ({:?})", help.code, help.category),
        help.summary.to_string(),
        format!("hint: {}", help.hint),
    ];

    if help.retry.retry {
        let mut retry_line = String::from("retry: yes");
        if let Some(ms) = help.retry.initial_backoff_ms {
            retry_line.push_str(&format!(", initial_backoff_ms={}", ms));
        }
        if let Some(n) = help.retry.max_retries {
            retry_line.push_str(&format!(", max_retries={}", n));
        }
        retry_line.push_str(&format!(" ({})", help.retry.reason));
        parts.push(retry_line);
    } else {
        parts.push(format!("retry: no ({})", help.retry.reason));
    }

    parts.push(format!(
        "refresh_token: {}",
        if help.refresh_token { "yes" } else { "no" }
    ));

    if !errmsg.is_empty() {
        parts.push(format!("errmsg: {errmsg}"));
    }

    parts.join(" | ")
}
