//! Deployment errors.

use thiserror::Error;

use cloudperf_ingest::{IngestError, InitError};
use cloudperf_router::RuleTableError;
use cloudperf_scope::ScopeError;
use cloudperf_state::StateError;

pub type StackResult<T> = Result<T, StackError>;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("scope: {0}")]
    Scope(#[from] ScopeError),

    #[error("rule table: {0}")]
    Rules(#[from] RuleTableError),

    #[error("event rules: {0}")]
    EventRules(#[from] IngestError),

    #[error("init: {0}")]
    Init(#[from] InitError),

    #[error("state: {0}")]
    State(#[from] StateError),

    #[error("config: {0}")]
    Config(String),

    #[error("stack {0} has no completed deployment")]
    NotDeployed(String),

    #[error("stack {stack} was deployed with config {deployed}, current config is {current}")]
    ConfigChanged {
        stack: String,
        deployed: String,
        current: String,
    },
}
