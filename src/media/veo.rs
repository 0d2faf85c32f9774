//! Veo video provider on the Generative Language REST API.
//!
//! Jobs are started with `predictLongRunning` and tracked as operations:
//! `GET {base}/v1beta/{operation.name}` until `done` is true.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::VideoError;
use crate::media::video::{Operation, OperationState, VideoProvider, VideoRequest};

const PROVIDER: &str = "veo";

/// Veo provider configuration.
#[derive(Debug, Clone)]
pub struct VeoConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

impl VeoConfig {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            api_key,
            model: model.into(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

pub struct VeoProvider {
    client: reqwest::Client,
    config: VeoConfig,
}

impl VeoProvider {
    pub fn new(client: reqwest::Client, config: VeoConfig) -> Self {
        Self { client, config }
    }

    fn submit_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:predictLongRunning",
            self.config.base_url, self.config.model
        )
    }

    fn operation_url(&self, name: &str) -> String {
        format!(
            "{}/v1beta/{}",
            self.config.base_url,
            name.trim_start_matches('/')
        )
    }

    async fn read_operation(
        response: reqwest::Response,
        context: &str,
    ) -> Result<VeoOperation, String> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let msg = serde_json::from_str::<VeoOperation>(&error_text)
                .ok()
                .and_then(|op| op.error.map(|e| e.message))
                .unwrap_or(error_text);
            return Err(format!("{} returned status {}: {}", context, status, msg));
        }
        response
            .json::<VeoOperation>()
            .await
            .map_err(|e| format!("Failed to parse {} response: {}", context, e))
    }
}

// -- Veo API request/response types --

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Debug, Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    duration_seconds: u32,
}

#[derive(Debug, Deserialize)]
struct VeoOperation {
    #[serde(default)]
    name: String,
    #[serde(default)]
    done: bool,
    response: Option<VeoOperationResponse>,
    error: Option<VeoStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoOperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<GeneratedVideo>,
}

#[derive(Debug, Deserialize)]
struct GeneratedVideo {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VeoStatus {
    message: String,
}

impl VeoOperation {
    fn into_operation(self, fallback_name: &str) -> Operation {
        let name = if self.name.is_empty() {
            fallback_name.to_string()
        } else {
            self.name
        };

        let state = if let Some(error) = self.error {
            OperationState::Failed {
                message: error.message,
            }
        } else if !self.done {
            OperationState::Pending
        } else {
            let locator = self
                .response
                .and_then(|r| r.generate_video_response)
                .and_then(|r| r.generated_samples.into_iter().next())
                .and_then(|s| s.video)
                .and_then(|v| v.uri);
            OperationState::Done { locator }
        };

        Operation { name, state }
    }
}

#[async_trait]
impl VideoProvider for VeoProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn submit(&self, request: &VideoRequest) -> Result<Operation, VideoError> {
        let body = PredictRequest {
            instances: vec![PredictInstance {
                prompt: &request.prompt,
            }],
            parameters: PredictParameters {
                sample_count: request.sample_count,
                duration_seconds: request.duration_seconds,
            },
        };

        let response = self
            .client
            .post(self.submit_url())
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| VideoError::Submission {
                provider: PROVIDER.to_string(),
                reason: format!("HTTP request failed: {}", e),
            })?;

        let operation = Self::read_operation(response, "predictLongRunning")
            .await
            .map_err(|reason| VideoError::Submission {
                provider: PROVIDER.to_string(),
                reason,
            })?;

        if operation.name.is_empty() && !operation.done {
            return Err(VideoError::Submission {
                provider: PROVIDER.to_string(),
                reason: "response carried no operation name".to_string(),
            });
        }

        Ok(operation.into_operation("operations/unnamed"))
    }

    async fn poll(&self, operation: &str) -> Result<Operation, VideoError> {
        let response = self
            .client
            .get(self.operation_url(operation))
            .header("x-goog-api-key", self.config.api_key.expose_secret())
            .send()
            .await?;

        let current = Self::read_operation(response, "operation poll")
            .await
            .map_err(|reason| VideoError::OperationFailed {
                operation: operation.to_string(),
                reason,
            })?;

        Ok(current.into_operation(operation))
    }
}
