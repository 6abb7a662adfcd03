//! Ingestion and init error types.

use std::time::Duration;

use thiserror::Error;

use cloudperf_state::StateError;

pub type IngestResult<T> = Result<T, IngestError>;

/// Failure to deliver a payload to an admin target.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvokeError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("target answered {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("event rule {index} is invalid: {reason}")]
    InvalidRule { index: usize, reason: String },

    #[error("invocation of {target} for {key} failed: {reason}")]
    InvocationFailed {
        target: String,
        key: String,
        reason: String,
    },

    #[error("malformed notification: {0}")]
    MalformedNotification(String),

    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Error)]
pub enum InitError {
    #[error("init invocation is invalid: {0}")]
    Invalid(String),

    #[error("init invocation {identity} is already running (attempt {attempts})")]
    InProgress { identity: String, attempts: u32 },

    #[error("init invocation {identity} failed: {reason}")]
    InvocationFailed { identity: String, reason: String },

    #[error(transparent)]
    State(#[from] StateError),
}
