//! Outbound request safety: host allowlisting and secret redaction.

mod allowlist;
mod redaction;

pub use allowlist::{DomainAllowlist, DomainPattern, DomainValidationResult};
pub use redaction::redact_url;
