//! Error types for the wishing machine.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Video error: {0}")]
    Video(#[from] VideoError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Text generation provider errors.
///
/// None of these reach an HTTP caller: the transcript generator logs them
/// and substitutes the fallback letter.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("No API key configured for provider {provider}")]
    MissingApiKey { provider: String },

    #[error("Simulated outage: {0}")]
    Simulated(String),
}

/// Video job errors. Every variant is terminal for the request.
#[derive(Debug, thiserror::Error)]
pub enum VideoError {
    #[error("Invalid video prompt: {reason}")]
    InvalidPrompt { reason: String },

    #[error("No API key configured for video provider {provider}")]
    MissingCredential { provider: String },

    #[error("Video submission to {provider} failed: {reason}")]
    Submission { provider: String, reason: String },

    #[error("Video operation {operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("Video operation {operation} completed without a result")]
    NoResult { operation: String },

    #[error("Video operation {operation} not done after {attempts} polls ({elapsed:?})")]
    PollTimeout {
        operation: String,
        attempts: u32,
        elapsed: Duration,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl VideoError {
    /// Whether the caller sent something unusable, as opposed to the
    /// provider failing.
    pub fn is_validation(&self) -> bool {
        matches!(self, VideoError::InvalidPrompt { .. })
    }
}

/// Media relay errors.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid locator: {reason}")]
    InvalidLocator { reason: String },

    #[error("Host not allowed: {reason}")]
    HostNotAllowed { reason: String },

    #[error("No API key configured to fetch from {host}")]
    MissingCredential { host: String },

    #[error("Upstream returned status {status}")]
    UpstreamStatus { status: u16 },

    #[error("Upstream redirect refused: {reason}")]
    RedirectRefused { reason: String },

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl ProxyError {
    /// Whether the locator itself was rejected before any fetch.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProxyError::InvalidLocator { .. } | ProxyError::HostNotAllowed { .. }
        )
    }
}

/// HTTP server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Server failed to start on {addr}: {reason}")]
    StartupFailed { addr: String, reason: String },
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    // --- ConfigError ---

    #[test]
    fn test_config_error_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            key: "PORT".to_string(),
            message: "must be a number".to_string(),
        };
        assert!(err.to_string().contains("PORT"));
        assert!(err.to_string().contains("must be a number"));
    }

    #[test]
    fn test_config_error_missing_required_display() {
        let err = ConfigError::MissingRequired {
            key: "MOCK_VIDEO_URL".to_string(),
            hint: "Set a sample clip URL".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("MOCK_VIDEO_URL"));
        assert!(msg.contains("Set a sample clip URL"));
    }

    // --- LlmError ---

    #[test]
    fn test_llm_error_rate_limited_display() {
        let err = LlmError::RateLimited {
            provider: "gemini".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        let msg = err.to_string();
        assert!(msg.contains("gemini"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn test_llm_error_simulated_display() {
        let err = LlmError::Simulated("frosty".to_string());
        assert!(err.to_string().contains("frosty"));
    }

    // --- VideoError ---

    #[test]
    fn test_video_error_poll_timeout_display() {
        let err = VideoError::PollTimeout {
            operation: "operations/abc".to_string(),
            attempts: 60,
            elapsed: Duration::from_secs(300),
        };
        let msg = err.to_string();
        assert!(msg.contains("operations/abc"));
        assert!(msg.contains("60"));
        assert!(msg.contains("300"));
    }

    #[test]
    fn test_video_error_validation_kind() {
        let invalid = VideoError::InvalidPrompt {
            reason: "empty".to_string(),
        };
        let upstream = VideoError::NoResult {
            operation: "operations/abc".to_string(),
        };
        assert!(invalid.is_validation());
        assert!(!upstream.is_validation());
    }

    // --- ProxyError ---

    #[test]
    fn test_proxy_error_validation_kind() {
        assert!(
            ProxyError::HostNotAllowed {
                reason: "evil.com".to_string()
            }
            .is_validation()
        );
        assert!(!ProxyError::UpstreamStatus { status: 404 }.is_validation());
        assert!(
            !ProxyError::MissingCredential {
                host: "generativelanguage.googleapis.com".to_string()
            }
            .is_validation()
        );
    }

    #[test]
    fn test_proxy_redirect_refused_is_not_validation() {
        let err = ProxyError::RedirectRefused {
            reason: "host '10.0.0.1' not in allowlist".to_string(),
        };
        assert!(!err.is_validation());
        assert!(err.to_string().contains("10.0.0.1"));
    }

    #[test]
    fn test_proxy_error_upstream_status_display() {
        let err = ProxyError::UpstreamStatus { status: 403 };
        assert!(err.to_string().contains("403"));
    }

    // --- From conversions into top-level Error ---

    #[test]
    fn test_error_from_config_error() {
        let inner = ConfigError::InvalidValue {
            key: "WISH_MODE".to_string(),
            message: "unknown".to_string(),
        };
        let err = Error::from(inner);
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_from_video_error() {
        let inner = VideoError::NoResult {
            operation: "op".to_string(),
        };
        let err = Error::from(inner);
        assert!(err.to_string().contains("Video error"));
    }

    #[test]
    fn test_error_debug_is_implemented() {
        let err = Error::Proxy(ProxyError::UpstreamStatus { status: 500 });
        let debug = format!("{:?}", err);
        assert!(!debug.is_empty());
    }
}
