//! Video job submission and completion polling.
//!
//! A job is one long-running operation on the provider. The submitter
//! starts it, polls on a fixed interval until it reports completion, and
//! hands back a same-origin relay reference instead of the provider URL.
//! Polling is bounded by both an attempt count and an overall deadline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::VideoError;
use crate::wish::{VideoJobReference, VideoPrompt};

/// Parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub prompt: String,
    /// Number of clips to render.
    pub sample_count: u32,
    pub duration_seconds: u32,
}

/// Snapshot of a long-running operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    /// Finished; carries the first generated clip's locator if any.
    Done { locator: Option<String> },
    /// Finished with a provider-reported error.
    Failed { message: String },
}

/// Handle to an in-progress operation plus its most recent state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub state: OperationState,
}

/// Trait for asynchronous video generation backends.
#[async_trait]
pub trait VideoProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Start a generation job.
    async fn submit(&self, request: &VideoRequest) -> Result<Operation, VideoError>;

    /// Fetch the current state of a job.
    async fn poll(&self, operation: &str) -> Result<Operation, VideoError>;
}

/// How long to keep asking whether a job is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
            deadline: Duration::from_secs(360),
        }
    }
}

/// Where video jobs go.
pub enum VideoBackend {
    Live(Arc<dyn VideoProvider>),
    /// Live mode without a credential: every request is refused.
    Unconfigured { provider: String },
}

/// Submits video jobs and waits for them to finish.
pub struct VideoJobSubmitter {
    backend: VideoBackend,
    policy: PollPolicy,
    duration_seconds: u32,
    proxy_path: String,
}

impl VideoJobSubmitter {
    pub fn new(backend: VideoBackend, policy: PollPolicy, duration_seconds: u32) -> Self {
        Self {
            backend,
            policy,
            duration_seconds,
            proxy_path: "/api/proxy-video".to_string(),
        }
    }

    /// Override the relay path embedded in returned references.
    pub fn with_proxy_path(mut self, path: impl Into<String>) -> Self {
        self.proxy_path = path.into();
        self
    }

    /// Render a clip for `prompt` and return a relay reference to it.
    ///
    /// Single attempt: a failed submission is not retried. Dropping the
    /// returned future abandons the job's polling loop.
    pub async fn submit(&self, prompt: &VideoPrompt) -> Result<VideoJobReference, VideoError> {
        if prompt.prompt.trim().is_empty() {
            return Err(VideoError::InvalidPrompt {
                reason: "prompt must not be empty".to_string(),
            });
        }

        let provider = match &self.backend {
            VideoBackend::Live(provider) => provider,
            VideoBackend::Unconfigured { provider } => {
                return Err(VideoError::MissingCredential {
                    provider: provider.clone(),
                });
            }
        };

        let request = VideoRequest {
            prompt: prompt.prompt.clone(),
            sample_count: 1,
            duration_seconds: self.duration_seconds,
        };

        let operation = provider.submit(&request).await?;
        tracing::info!(
            provider = provider.name(),
            operation = %operation.name,
            "Video job submitted"
        );

        let locator = self.wait_for(provider.as_ref(), operation).await?;
        Ok(VideoJobReference::for_locator(&self.proxy_path, &locator))
    }

    async fn wait_for(
        &self,
        provider: &dyn VideoProvider,
        mut operation: Operation,
    ) -> Result<String, VideoError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            match operation.state {
                OperationState::Done {
                    locator: Some(locator),
                } => {
                    tracing::info!(
                        operation = %operation.name,
                        attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Video job complete"
                    );
                    return Ok(locator);
                }
                OperationState::Done { locator: None } => {
                    return Err(VideoError::NoResult {
                        operation: operation.name,
                    });
                }
                OperationState::Failed { message } => {
                    return Err(VideoError::OperationFailed {
                        operation: operation.name,
                        reason: message,
                    });
                }
                OperationState::Pending => {}
            }

            let elapsed = started.elapsed();
            if attempts >= self.policy.max_attempts
                || elapsed + self.policy.interval > self.policy.deadline
            {
                return Err(VideoError::PollTimeout {
                    operation: operation.name,
                    attempts,
                    elapsed,
                });
            }

            tokio::time::sleep(self.policy.interval).await;
            attempts += 1;
            tracing::debug!(operation = %operation.name, attempt = attempts, "Polling video job");

            let remaining = self.policy.deadline.saturating_sub(started.elapsed());
            operation = match tokio::time::timeout(remaining, provider.poll(&operation.name)).await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(VideoError::PollTimeout {
                        operation: operation.name,
                        attempts,
                        elapsed: started.elapsed(),
                    });
                }
            };
        }
    }
}

/// Default lifetime of an unfinished mock job.
const MOCK_JOB_TTL: Duration = Duration::from_secs(600);

struct PendingJob {
    remaining: u32,
    expires_at: Instant,
}

/// Scripted provider for mock mode: every job completes on its N-th poll
/// and yields a fixed sample clip.
///
/// Jobs nobody finishes polling (timed out, client gone) expire after the
/// configured TTL and are pruned on the next submit or poll.
pub struct MockVideoProvider {
    locator: String,
    ticks: u32,
    ttl: Duration,
    // Never held across an await.
    pending: Mutex<HashMap<String, PendingJob>>,
}

impl MockVideoProvider {
    pub fn new(locator: impl Into<String>, ticks: u32) -> Self {
        Self {
            locator: locator.into(),
            ticks,
            ttl: MOCK_JOB_TTL,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Number of unfinished, unexpired jobs.
    pub fn in_flight(&self) -> usize {
        match self.pending.lock() {
            Ok(mut pending) => {
                prune_expired(&mut pending);
                pending.len()
            }
            Err(_) => 0,
        }
    }

    fn done(&self, name: String) -> Operation {
        Operation {
            name,
            state: OperationState::Done {
                locator: Some(self.locator.clone()),
            },
        }
    }
}

#[async_trait]
impl VideoProvider for MockVideoProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit(&self, request: &VideoRequest) -> Result<Operation, VideoError> {
        let name = format!("operations/mock-{}", uuid::Uuid::new_v4());
        tracing::debug!(operation = %name, prompt = %request.prompt, "Mock video job accepted");

        if self.ticks == 0 {
            return Ok(self.done(name));
        }
        let mut pending = self.pending.lock().map_err(|_| VideoError::Submission {
            provider: "mock".to_string(),
            reason: "operation table poisoned".to_string(),
        })?;
        prune_expired(&mut pending);
        pending.insert(
            name.clone(),
            PendingJob {
                remaining: self.ticks,
                expires_at: Instant::now() + self.ttl,
            },
        );
        drop(pending);
        Ok(Operation {
            name,
            state: OperationState::Pending,
        })
    }

    async fn poll(&self, operation: &str) -> Result<Operation, VideoError> {
        let mut pending = self.pending.lock().map_err(|_| VideoError::OperationFailed {
            operation: operation.to_string(),
            reason: "operation table poisoned".to_string(),
        })?;
        prune_expired(&mut pending);

        let job = pending
            .get_mut(operation)
            .ok_or_else(|| VideoError::OperationFailed {
                operation: operation.to_string(),
                reason: "unknown or expired operation".to_string(),
            })?;
        job.remaining = job.remaining.saturating_sub(1);

        if job.remaining == 0 {
            pending.remove(operation);
            drop(pending);
            Ok(self.done(operation.to_string()))
        } else {
            Ok(Operation {
                name: operation.to_string(),
                state: OperationState::Pending,
            })
        }
    }
}

fn prune_expired(pending: &mut HashMap<String, PendingJob>) {
    let now = Instant::now();
    pending.retain(|_, job| job.expires_at > now);
}
