//! Backend for the Santa wishing machine.
//!
//! Three request-scoped operations sit behind an axum HTTP surface:
//! - Letter generation with a deterministic fallback
//! - Video job submission with bounded completion polling
//! - A chunked media relay with host allowlisting

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod media;
pub mod safety;
pub mod transcript;
pub mod wish;

pub use config::{Config, GenerationMode};
pub use error::{Error, Result};
