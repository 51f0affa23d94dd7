//! Error types. Collaborator errors are recovered inside a diagnosis; only feed,
//! config, storage and dispatch errors reach the caller of a pipeline run.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for `Result<T, SentinelError>`.
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Failure reading the update stream.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("feed rejected request: {0}")]
    Rejected(String),
}

/// Failure of one call to the reasoning collaborator.
#[derive(Error, Debug)]
pub enum ReasoningError {
    #[error("reasoning request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("reasoning service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("reasoning service returned no content")]
    EmptyResponse,

    #[error("malformed reasoning response: {0}")]
    Malformed(String),

    #[error("reasoning call timed out after {0:?}")]
    Timeout(Duration),

    #[error("reasoning service not configured: {0}")]
    NotConfigured(String),
}

/// Failure of one evidence lookup.
#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("evidence source unavailable: {0}")]
    Unavailable(String),

    #[error("evidence call timed out after {0:?}")]
    Timeout(Duration),

    #[error("topology file {path}: {reason}")]
    Topology { path: String, reason: String },
}

/// Failure loading or querying historical cases.
#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("case library I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("case library decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure persisting a sealed trace.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("report I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("dispatch queue is closed")]
    Closed,
}

/// Top-level error type that all module errors convert into.
#[derive(Error, Debug)]
pub enum SentinelError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Reasoning(#[from] ReasoningError),
}
