//! Scope and registry error types.

use thiserror::Error;

pub type ScopeResult<T> = Result<T, ScopeError>;

/// Errors raised while building the registry or exercising a scope.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("duplicate target id: {0}")]
    DuplicateTarget(String),

    #[error("invalid CIDR {value}: {reason}")]
    InvalidCidr { value: String, reason: String },

    #[error("invalid scope for target {target}: {reason}")]
    InvalidScope { target: String, reason: String },

    #[error("invalid budget for target {target}: {reason}")]
    InvalidBudget { target: String, reason: String },

    #[error("{store} store port must be {expected}, got {port}")]
    InvalidStorePort { store: String, port: u16, expected: u16 },

    #[error("network scope does not reach {store}: {reason}")]
    NetworkDenied { store: String, reason: String },

    #[error("credential scope does not grant secret {0}")]
    SecretDenied(String),

    #[error("secret not present in vault: {0}")]
    SecretMissing(String),
}
