//! Redaction of credentials embedded in URLs before they reach logs.

use url::Url;

/// Query parameters whose values are never logged.
const SENSITIVE_PARAMS: &[&str] = &["key", "api_key", "access_token", "token"];

const REDACTED: &str = "[REDACTED]";

/// Render `url` with sensitive query values and userinfo replaced.
pub fn redact_url(url: &Url) -> String {
    let mut redacted = url.clone();
    if !redacted.username().is_empty() {
        let _ = redacted.set_username(REDACTED);
    }
    if redacted.password().is_some() {
        let _ = redacted.set_password(Some(REDACTED));
    }

    if redacted.query().is_some() {
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| {
                let value = if SENSITIVE_PARAMS.contains(&k.to_lowercase().as_str()) {
                    REDACTED.to_string()
                } else {
                    v.into_owned()
                };
                (k.into_owned(), value)
            })
            .collect();
        redacted.query_pairs_mut().clear().extend_pairs(pairs);
    }

    redacted.to_string()
}
