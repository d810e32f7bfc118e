//! Structured error envelope for the migration job.
//!
//! Mirrors the error-kind table from the job's design: every failure that
//! can occur while inlining a single piece of media is tagged with a kind
//! so callers can tell a permanently-bad URL from a transient network blip
//! without string-matching a message.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidUrl,
    RetryableHttp { status: u16 },
    NonRetryableHttp { status: u16 },
    Transport,
    Transcode,
    Storage,
    Persist,
}

impl ErrorKind {
    /// True when the queue manager should retry this failure with backoff
    /// rather than surface it to the caller immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RetryableHttp { .. })
    }
}

/// Envelope wrapping the underlying cause with the kind classification used
/// to drive retry/backoff and per-resource error isolation.
#[derive(Debug, Error)]
#[error("data import error ({kind:?}): {message}")]
pub struct DataImportError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl DataImportError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        DataImportError { kind, message: message.into(), source: None }
    }

    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        DataImportError { kind, message: message.into(), source: Some(source.into()) }
    }

    pub fn invalid_url(url: &str) -> Self {
        Self::new(ErrorKind::InvalidUrl, format!("could not parse host from url: {}", url))
    }

    pub fn status(status: u16, retryable_statuses: &[u16]) -> Self {
        if retryable_statuses.contains(&status) {
            Self::new(ErrorKind::RetryableHttp { status }, format!("retryable status {}", status))
        } else {
            Self::new(ErrorKind::NonRetryableHttp { status }, format!("non-retryable status {}", status))
        }
    }

    pub fn transport(source: reqwest::Error) -> Self {
        Self::with_source(ErrorKind::Transport, "transport error", source)
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            ErrorKind::RetryableHttp { status } | ErrorKind::NonRetryableHttp { status } => Some(status),
            _ => None,
        }
    }
}
