// src/error.rs
//
// Error taxonomy for the estimation stages. Nothing here escapes the
// pipeline as an unhandled error: the orchestrator folds every variant
// into a displayable report string, so a broken AI backend never blocks
// the reporting workflow. Display strings are load-bearing — downstream
// consumers match on their prefixes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EstimationError {
    /// The segmentation network never loaded; the offline path cannot run.
    #[error("Error: Offline AI model missing.")]
    ModelUnavailable,

    /// Segmentation inference failed after the model loaded.
    #[error("Offline Analysis Error: {0}")]
    Segmentation(String),

    /// The chat completion endpoint answered with a non-200 status.
    #[error("Chat API Failed: {0}")]
    ChatService(u16),

    /// Transport or parse failure anywhere in the online two-call chain.
    #[error("Chain Error: {0}")]
    RemoteChain(String),
}
