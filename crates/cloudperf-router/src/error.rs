//! Router error types.

use std::time::Duration;

use thiserror::Error;

/// Build-time violations of the rule table invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleTableError {
    #[error("duplicate rule priority: {0}")]
    DuplicatePriority(u32),

    #[error("more than one catch-all rule (priorities {first} and {second})")]
    MultipleCatchAll { first: u32, second: u32 },

    #[error("catch-all rule at priority {catch_all} must come after priority {highest}")]
    CatchAllNotLast { catch_all: u32, highest: u32 },

    #[error("rule {priority} forwards to unknown target {target}")]
    UnknownTarget { priority: u32, target: String },

    #[error("rule {priority} has an invalid condition: {reason}")]
    InvalidCondition { priority: u32, reason: String },

    #[error("rule {priority} has an invalid fixed response: {reason}")]
    InvalidResponse { priority: u32, reason: String },
}

/// A forwarded invocation that did not produce a response.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("exchange with {endpoint} failed: {reason}")]
    Exchange { endpoint: String, reason: String },
}

/// Per-request dispatch failures. None of these are retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no rule matched {method} {path}")]
    NoRuleMatched { method: String, path: String },

    #[error("target not registered: {0}")]
    UnknownTarget(String),

    #[error("target {0} is unhealthy")]
    TargetUnhealthy(String),

    #[error("forward to {target} failed: {source}")]
    ForwardFailed {
        target: String,
        #[source]
        source: ForwardError,
    },

    #[error("forward to {target} timed out after {timeout:?}")]
    ForwardTimedOut { target: String, timeout: Duration },
}

impl DispatchError {
    /// Status surfaced to the caller. Bodies never carry the error detail.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::NoRuleMatched { .. } => 404,
            DispatchError::UnknownTarget(_) => 500,
            DispatchError::TargetUnhealthy(_) => 503,
            DispatchError::ForwardFailed { .. } => 502,
            DispatchError::ForwardTimedOut { .. } => 504,
        }
    }
}
