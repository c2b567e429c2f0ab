//! Provider contracts - embedding and LLM backends
//!
//! The engine never talks HTTP itself. Hosts supply implementations of
//! these traits; the engine only cares about the contracts:
//!
//! - [`EmbeddingProvider`]: `embed(text) -> vector`, batch variant with
//!   order preserved, and a fixed declared dimension.
//! - [`LlmProvider`]: `complete(system, user) -> text`, expected to carry a
//!   single JSON object (possibly fenced) for extraction prompts.
//!
//! [`ProviderError::is_transient`] is the one piece of policy here: only
//! network-level failures, timeouts, and 5xx responses count as transient.
//! Everything else (bad request, auth, malformed output) is permanent and
//! must not be retried.

use async_trait::async_trait;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Error from an external provider call
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Network-level failure (connect, DNS, reset)
    #[error("Network error: {0}")]
    Network(String),
    /// Request timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
    /// HTTP error status from the provider
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    /// Provider returned an unusable payload
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Anything else
    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether a retry without application-level correction could succeed.
    ///
    /// 5xx and network/timeout conditions are transient; 4xx and malformed
    /// payloads are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::Timeout(_) => true,
            ProviderError::Http { status, .. } => *status >= 500,
            ProviderError::InvalidResponse(_) | ProviderError::Other(_) => false,
        }
    }
}

/// Provider result type
pub type Result<T> = std::result::Result<T, ProviderError>;

// ============================================================================
// CONTRACTS
// ============================================================================

/// Turns text into fixed-dimension vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts; output order matches input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Fixed output dimension, must match the configured vector index
    fn dimensions(&self) -> usize;
}

/// Turns a prompt into a JSON-bearing text completion
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run a completion with a system prompt and a single user message
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

// ============================================================================
// TESTS
// ============================================================================
