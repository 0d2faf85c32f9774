//! Santa letter generation.
//!
//! The generator never fails from the caller's point of view: whatever goes
//! wrong with the text backend is logged and the deterministic fallback
//! letter is returned instead.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::error::LlmError;
use crate::llm::{CompletionRequest, FinishReason, LlmProvider};
use crate::wish::{GenerationResult, WishDetails};

/// Phrase used when the child listed no good deeds.
pub const DEFAULT_NICE: &str = "being a good child";

/// Phrase used when the child listed no misdeeds.
pub const DEFAULT_NAUGHTY: &str = "nothing at all! You've been perfect";

const SIMULATED_OUTAGE: &str = "North Pole internet connection frosty. Try again later.";

const PERSONA: &str = "You are Santa Claus: warm, jolly and kind. You speak directly to one \
child in a short spoken message. Never break character and never mention being an AI.";

fn nice_or_default(details: &WishDetails) -> &str {
    non_blank_or(&details.nice_items, DEFAULT_NICE)
}

fn naughty_or_default(details: &WishDetails) -> &str {
    non_blank_or(&details.naughty_items, DEFAULT_NAUGHTY)
}

fn non_blank_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

/// Build the instruction sent to the text model.
pub fn build_prompt(details: &WishDetails) -> String {
    format!(
        "Write a personalized message from Santa Claus to a child named {name}.\n\
         \n\
         Good things they have done: {nice}.\n\
         Things they could work on: {naughty}.\n\
         Gifts they are wishing for: {gifts}.\n\
         \n\
         Guidelines:\n\
         - Greet {name} by name with a hearty \"Ho ho ho!\".\n\
         - Be encouraging and specific about the good things.\n\
         - Gently mention the things to work on, without scolding.\n\
         - Mention the wished-for gifts, but do not promise them.\n\
         - Keep it under two minutes when read aloud.\n\
         - Stay in the Santa persona for the whole message.",
        name = details.name,
        nice = nice_or_default(details),
        naughty = naughty_or_default(details),
        gifts = details.gifts,
    )
}

/// The letter returned whenever the text backend cannot be used.
pub fn fallback_transcript(details: &WishDetails) -> String {
    format!(
        "Ho ho ho! Merry Christmas!\n\
         \n\
         Well now, let me see... Ah, yes! {name}! I've been looking at my list.\n\
         \n\
         I see you've been doing some wonderful things, like: {nice}. That's what I like to see!\n\
         \n\
         Now, I also see a few things we might need to work on, like: {naughty}. But don't worry, I know you'll try harder next year!\n\
         \n\
         And about those gifts... I see you're wishing for {gifts}. Well, the elves and I will see what we can do!\n\
         \n\
         Keep being good, and I'll see you on Christmas Eve! Ho ho ho!",
        name = details.name,
        nice = nice_or_default(details),
        naughty = naughty_or_default(details),
        gifts = details.gifts,
    )
}

/// Where letters come from.
pub enum TranscriptBackend {
    /// A real text model.
    Live(Arc<dyn LlmProvider>),
    /// Live mode without a credential: every request falls back.
    Unconfigured,
    /// Local testing: fixed latency and a synthetic failure rate. A
    /// simulated success yields the templated letter.
    Simulated { latency: Duration, failure_rate: f64 },
}

/// Produces Santa letters for wish lists.
pub struct TranscriptGenerator {
    backend: TranscriptBackend,
}

impl TranscriptGenerator {
    pub fn new(backend: TranscriptBackend) -> Self {
        Self { backend }
    }

    /// Generate a letter. Always returns a non-empty transcript.
    pub async fn generate(&self, details: &WishDetails) -> GenerationResult {
        let transcript = match self.draft(details).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!(child = %details.name, "Text backend returned an empty letter, using fallback");
                fallback_transcript(details)
            }
            Err(e) => {
                tracing::warn!(child = %details.name, error = %e, "Transcript generation failed, using fallback");
                fallback_transcript(details)
            }
        };

        GenerationResult { transcript }
    }

    async fn draft(&self, details: &WishDetails) -> Result<String, LlmError> {
        match &self.backend {
            TranscriptBackend::Live(provider) => {
                let request = CompletionRequest::new(build_prompt(details))
                    .with_system_instruction(PERSONA)
                    .with_temperature(0.9)
                    .with_max_tokens(1024);
                let response = provider.complete(request).await?;
                tracing::debug!(
                    provider = provider.name(),
                    model = provider.model_name(),
                    output_tokens = response.output_tokens,
                    finish_reason = ?response.finish_reason,
                    "Letter generated"
                );
                match response.finish_reason {
                    // A filtered reply is partial at best.
                    FinishReason::ContentFilter => Err(LlmError::InvalidResponse {
                        provider: provider.name().to_string(),
                        reason: "reply blocked by content filter".to_string(),
                    }),
                    FinishReason::Length => {
                        tracing::warn!(child = %details.name, "Letter hit the token limit");
                        Ok(response.content)
                    }
                    FinishReason::Stop | FinishReason::Unknown => Ok(response.content),
                }
            }
            TranscriptBackend::Unconfigured => Err(LlmError::MissingApiKey {
                provider: "gemini".to_string(),
            }),
            TranscriptBackend::Simulated {
                latency,
                failure_rate,
            } => {
                tokio::time::sleep(*latency).await;
                let failed = rand::thread_rng().gen_bool(failure_rate.clamp(0.0, 1.0));
                if failed {
                    return Err(LlmError::Simulated(SIMULATED_OUTAGE.to_string()));
                }
                Ok(fallback_transcript(details))
            }
        }
    }
}
