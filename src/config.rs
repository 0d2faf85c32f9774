//! Runtime configuration.
//!
//! Everything is read once at startup from the process environment (after
//! `.env` has been loaded by the binary) into a [`Config`] that is handed to
//! each component constructor. Nothing re-reads the environment per request.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Host serving the Gemini/Veo REST API and its generated files.
pub const PROVIDER_HOST: &str = "generativelanguage.googleapis.com";

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_VIDEO_MODEL: &str = "veo-2.0-generate-001";
const DEFAULT_REDIRECT_HOSTS: &str = "*.googleusercontent.com";
const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";
const DEFAULT_MOCK_VIDEO_URL: &str =
    "https://storage.googleapis.com/gtv-videos-bucket/sample/ForBiggerJoyrides.mp4";

/// Whether generation calls go to the real provider or are simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Live,
    Mock,
}

impl GenerationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Mock => "mock",
        }
    }
}

impl FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "mock" => Ok(Self::Mock),
            other => Err(format!("expected 'live' or 'mock', got '{other}'")),
        }
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider endpoint and credential.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Absent is valid: transcripts fall back, video and proxied provider
    /// downloads are refused.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub text_model: String,
    pub video_model: String,
}

/// Video job parameters and polling bounds.
#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub duration_seconds: u32,
    pub poll_interval: Duration,
    pub max_poll_attempts: u32,
    pub poll_deadline: Duration,
}

/// Media relay settings.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Hosts that may be fetched in addition to the provider host.
    pub extra_hosts: Vec<String>,
    /// Hosts reachable only as a redirect target of an allowed fetch.
    pub redirect_hosts: Vec<String>,
    pub chunk_size: usize,
}

/// Behaviour of the simulated backend used in mock mode.
#[derive(Debug, Clone)]
pub struct MockSettings {
    pub latency: Duration,
    pub failure_rate: f64,
    pub video_url: String,
    pub video_ticks: u32,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: GenerationMode,
    pub provider: ProviderSettings,
    pub video: VideoSettings,
    pub proxy: ProxySettings,
    pub mock: MockSettings,
    pub server: ServerSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Live,
            provider: ProviderSettings {
                api_key: None,
                base_url: DEFAULT_BASE_URL.to_string(),
                text_model: DEFAULT_TEXT_MODEL.to_string(),
                video_model: DEFAULT_VIDEO_MODEL.to_string(),
            },
            video: VideoSettings {
                duration_seconds: 6,
                poll_interval: Duration::from_secs(5),
                max_poll_attempts: 60,
                poll_deadline: Duration::from_secs(360),
            },
            proxy: ProxySettings {
                extra_hosts: Vec::new(),
                redirect_hosts: split_list(DEFAULT_REDIRECT_HOSTS),
                chunk_size: 8 * 1024,
            },
            mock: MockSettings {
                latency: Duration::from_secs(2),
                failure_rate: 0.2,
                video_url: DEFAULT_MOCK_VIDEO_URL.to_string(),
                video_ticks: 2,
            },
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8000,
                cors_origins: split_list(DEFAULT_CORS_ORIGINS),
            },
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Unset or blank keys keep their defaults; set keys must parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(mode) = get("WISH_MODE") {
            config.mode = parse_value("WISH_MODE", &mode)?;
        }

        config.provider.api_key = get("GEMINI_API_KEY").map(SecretString::from);
        if let Some(url) = get("GEMINI_BASE_URL") {
            url::Url::parse(&url).map_err(|e| ConfigError::InvalidValue {
                key: "GEMINI_BASE_URL".to_string(),
                message: e.to_string(),
            })?;
            config.provider.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = get("GEMINI_TEXT_MODEL") {
            config.provider.text_model = model;
        }
        if let Some(model) = get("VEO_MODEL") {
            config.provider.video_model = model;
        }

        if let Some(v) = get("VIDEO_DURATION_SECS") {
            config.video.duration_seconds = parse_value("VIDEO_DURATION_SECS", &v)?;
        }
        if let Some(v) = get("VIDEO_POLL_INTERVAL_SECS") {
            config.video.poll_interval =
                Duration::from_secs(parse_value("VIDEO_POLL_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("VIDEO_POLL_MAX_ATTEMPTS") {
            config.video.max_poll_attempts = parse_value("VIDEO_POLL_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("VIDEO_POLL_DEADLINE_SECS") {
            config.video.poll_deadline =
                Duration::from_secs(parse_value("VIDEO_POLL_DEADLINE_SECS", &v)?);
        }
        if config.video.max_poll_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "VIDEO_POLL_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if config.video.poll_interval > config.video.poll_deadline {
            return Err(ConfigError::InvalidValue {
                key: "VIDEO_POLL_INTERVAL_SECS".to_string(),
                message: format!(
                    "interval {:?} exceeds the {:?} poll deadline",
                    config.video.poll_interval, config.video.poll_deadline
                ),
            });
        }

        if let Some(v) = get("PROXY_ALLOWED_HOSTS") {
            config.proxy.extra_hosts = split_list(&v);
        }
        // Unlike other keys, an explicitly blank value clears the default.
        if let Some(v) = lookup("PROXY_REDIRECT_HOSTS") {
            config.proxy.redirect_hosts = split_list(&v);
        }
        if let Some(v) = get("PROXY_CHUNK_SIZE") {
            config.proxy.chunk_size = parse_value("PROXY_CHUNK_SIZE", &v)?;
        }
        if config.proxy.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PROXY_CHUNK_SIZE".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if let Some(v) = get("MOCK_LATENCY_MS") {
            config.mock.latency = Duration::from_millis(parse_value("MOCK_LATENCY_MS", &v)?);
        }
        if let Some(v) = get("MOCK_FAILURE_RATE") {
            let rate: f64 = parse_value("MOCK_FAILURE_RATE", &v)?;
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::InvalidValue {
                    key: "MOCK_FAILURE_RATE".to_string(),
                    message: format!("{rate} is outside 0.0..=1.0"),
                });
            }
            config.mock.failure_rate = rate;
        }
        if let Some(v) = get("MOCK_VIDEO_URL") {
            config.mock.video_url = v;
        }
        if let Some(v) = get("MOCK_VIDEO_TICKS") {
            config.mock.video_ticks = parse_value("MOCK_VIDEO_TICKS", &v)?;
        }
        if config.mode == GenerationMode::Mock && mock_video_host(&config.mock.video_url).is_none()
        {
            return Err(ConfigError::MissingRequired {
                key: "MOCK_VIDEO_URL".to_string(),
                hint: "Mock mode needs an absolute http(s) URL for the sample clip".to_string(),
            });
        }

        if let Some(host) = get("HOST") {
            config.server.host = host;
        }
        if let Some(port) = get("PORT") {
            config.server.port = parse_value("PORT", &port)?;
        }
        if let Some(origins) = get("CORS_ALLOWED_ORIGINS") {
            config.server.cors_origins = split_list(&origins);
        }

        Ok(config)
    }

    /// Hosts the media relay may fetch from.
    ///
    /// Always the provider host, plus configured extras, plus the sample
    /// clip host when running in mock mode.
    pub fn proxy_allowed_hosts(&self) -> Vec<String> {
        let mut hosts = vec![PROVIDER_HOST.to_string()];
        hosts.extend(self.proxy.extra_hosts.iter().cloned());
        if self.mode == GenerationMode::Mock
            && let Some(host) = mock_video_host(&self.mock.video_url)
        {
            hosts.push(host);
        }
        hosts.sort();
        hosts.dedup();
        hosts
    }

    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }
}

fn mock_video_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(|h| h.to_lowercase())
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
