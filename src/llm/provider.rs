//! Text generation provider abstraction.

use async_trait::async_trait;

use crate::error::LlmError;

/// A single-turn completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Persona or behavioural instruction, sent separately from the prompt
    /// when the provider supports it.
    pub system_instruction: Option<String>,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system_instruction: None,
            prompt: prompt.into(),
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Why the model stopped producing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

/// Generated text plus usage accounting.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// Trait for text generation backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Model identifier requests are sent to.
    fn model_name(&self) -> &str;

    /// Run one completion. Implementations must not retry.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = CompletionRequest::new("Write a letter")
            .with_system_instruction("You are Santa")
            .with_temperature(0.9)
            .with_max_tokens(512);
        assert_eq!(req.prompt, "Write a letter");
        assert_eq!(req.system_instruction.as_deref(), Some("You are Santa"));
        assert_eq!(req.temperature, Some(0.9));
        assert_eq!(req.max_tokens, Some(512));
    }

    #[test]
    fn test_request_defaults() {
        let req = CompletionRequest::new("hi");
        assert!(req.system_instruction.is_none());
        assert!(req.temperature.is_none());
        assert!(req.max_tokens.is_none());
    }
}
