//! Failure modes callers must be able to distinguish.
//!
//! Most orchestration uses `anyhow`; these enums exist for the two signals
//! with dedicated recovery paths: quota exhaustion from the generative
//! provider (degrades a single file to Uncategorized) and querying the QA
//! engine before any index exists (surfaced immediately, never retried).

use thiserror::Error;

/// Error from the generative-AI provider.
#[derive(Debug, Error)]
pub enum GenAiError {
    /// The provider signalled quota exhaustion (HTTP 429 or an explicit
    /// RESOURCE_EXHAUSTED status). Recoverable at the per-file level.
    #[error("generation quota exhausted: {0}")]
    Quota(String),

    /// Any other provider failure: network, non-retryable HTTP status,
    /// or an unparseable response envelope.
    #[error("generation failed: {0}")]
    Provider(String),
}

/// Error from the question-answering engine.
#[derive(Debug, Error)]
pub enum QaError {
    /// No vector index has been created or loaded yet.
    #[error("vector index not initialized; ingest documents first")]
    IndexNotInitialized,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
