//! Request and response payloads exchanged with the client application.

use serde::{Deserialize, Serialize};

/// What a child told Santa. Only `name` and `gifts` are required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WishDetails {
    pub name: String,
    #[serde(default)]
    pub nice_items: String,
    #[serde(default)]
    pub naughty_items: String,
    pub gifts: String,
}

/// Free-form description of the clip to render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoPrompt {
    pub prompt: String,
}

/// Body returned by `/generate-transcript`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationResult {
    pub transcript: String,
}

/// Body returned by `/generate-video`: a same-origin path that redeems the
/// finished clip through the media relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoJobReference {
    pub video_uri: String,
}

impl VideoJobReference {
    /// Wrap a remote locator as a relay path under `proxy_path`.
    pub fn for_locator(proxy_path: &str, locator: &str) -> Self {
        Self {
            video_uri: format!("{}?uri={}", proxy_path, urlencoding::encode(locator)),
        }
    }
}
