//! Generation client subsystem.
//!
//! The generative model is an opaque text-in/text-out service behind the
//! [`GenerationService`] trait. Providers:
//!
//! - [`HttpGenerationClient`]: an OpenAI-compatible chat-completions endpoint
//! - [`ReplayClient`]: recorded raw artifacts read from a directory
//!
//! [`RetryingClient`] wraps either one and retries transient failures with
//! exponential backoff.

mod client;
mod replay;
mod retry;

pub use client::{HttpGenerationClient, classify_status};
pub use replay::ReplayClient;
pub use retry::RetryingClient;

use crate::prompt::GenerationRequest;
use async_trait::async_trait;
use thiserror::Error;

/// Why the generation service produced no text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The request exceeded its deadline (transient).
    #[error("generation timed out: {0}")]
    Timeout(String),

    /// The service refused for rate or quota reasons (transient).
    #[error("generation quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The service rejected the request payload itself.
    #[error("generation payload rejected: {0}")]
    PayloadRejected(String),

    /// Connection failure or server-side error.
    #[error("generation transport error: {0}")]
    Transport(String),

    /// The service answered with something other than a completion.
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),

    /// No recorded artifact exists for the request.
    #[error("no recorded artifact: {0}")]
    NotRecorded(String),
}

impl GenerationError {
    /// Whether the failure may succeed on a later try.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::QuotaExceeded(_))
    }

    /// Short machine-readable kind used in attempt records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "generation-timeout",
            Self::QuotaExceeded(_) => "generation-quota-exceeded",
            Self::PayloadRejected(_) => "generation-payload-rejected",
            Self::Transport(_) => "generation-transport",
            Self::MalformedResponse(_) => "generation-malformed-response",
            Self::NotRecorded(_) => "generation-not-recorded",
        }
    }
}

/// A text-in/text-out generation service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Send one request and return the raw generated text.
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}
