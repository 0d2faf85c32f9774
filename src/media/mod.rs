//! Video generation and media relay.
//!
//! - Video job submission with bounded completion polling
//! - Veo provider on the Generative Language API
//! - Scripted provider for mock mode
//! - Chunked streaming relay for finished clips

mod proxy;
mod veo;
mod video;

pub use proxy::{
    ByteStream, CREDENTIAL_PARAM, DEFAULT_CHUNK_SIZE, MAX_REDIRECTS, MediaProxy, MediaStream,
    VIDEO_CONTENT_TYPE, attach_credential, rechunk, redirect_policy,
};
pub use veo::{VeoConfig, VeoProvider};
pub use video::{
    MockVideoProvider, Operation, OperationState, PollPolicy, VideoBackend, VideoJobSubmitter,
    VideoProvider, VideoRequest,
};
