//! Error taxonomy for remote synchronization.
//!
//! The Remote Client classifies raw HTTP/network failures into `SyncError`
//! kinds; the Task Processor retries only the kinds marked retryable. The
//! Webhook Ingestor has its own small error type because its failure modes
//! map directly onto HTTP responses.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classified synchronization failure
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing/inactive connection or missing credentials. Terminal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Remote rejected the access token (401). Terminal, needs operator action.
    #[error("remote authentication failed: {0}")]
    Authentication(String),

    /// Remote denied the operation (403). Terminal.
    #[error("remote permission denied: {0}")]
    Permission(String),

    /// Remote order or shop no longer exists (404). Terminal.
    #[error("remote resource not found: {0}")]
    NotFound(String),

    /// Remote rate limit (429). Retried with backoff.
    #[error("remote rate limit exceeded")]
    RateLimited,

    /// Timeout, DNS failure, connection refused, TLS error, 5xx. Retried.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Unexpected remote status/body. Terminal.
    #[error("remote error: {0}")]
    Remote(String),

    /// Persistence collaborator failure
    #[error("store error: {0}")]
    Store(#[source] BoxError),
}

impl SyncError {
    /// Only rate limits and transient network failures are retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient(_))
    }

    /// Short stable tag for logs and task error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Authentication(_) => "authentication",
            Self::Permission(_) => "permission",
            Self::NotFound(_) => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Transient(_) => "transient",
            Self::Remote(_) => "remote",
            Self::Store(_) => "store",
        }
    }

    pub fn store(e: impl Into<BoxError>) -> Self {
        Self::Store(e.into())
    }
}

/// Webhook ingestion failure, mapped to an HTTP status by the API adapter
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature mismatch or unknown shop. 401, no body detail.
    #[error("webhook authentication failed")]
    Auth,

    /// Missing headers or unparseable payload. 400.
    #[error("webhook validation failed: {0}")]
    Validation(String),

    /// Persistence collaborator failure. 500.
    #[error("store error: {0}")]
    Store(#[source] BoxError),
}

impl WebhookError {
    pub fn store(e: impl Into<BoxError>) -> Self {
        Self::Store(e.into())
    }
}
