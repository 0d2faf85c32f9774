//! Text generation providers.

mod gemini;
mod provider;

pub use gemini::{GeminiConfig, GeminiProvider};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
