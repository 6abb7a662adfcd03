//! Per-target resource and time budgets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use cloudperf_core::{TargetConfig, TargetKind, parse_duration};

use crate::error::{ScopeError, ScopeResult};

/// Memory, scratch storage and invocation timeout granted to a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBudget {
    pub timeout: Duration,
    pub memory_mb: u32,
    pub ephemeral_storage_mb: u32,
}

impl ResourceBudget {
    /// Defaults per kind. Admin runs bulk schema and import work, so it gets
    /// far more memory, scratch space and time than the request-serving kinds.
    pub fn for_kind(kind: TargetKind) -> Self {
        match kind {
            TargetKind::WebRenderer => Self {
                timeout: Duration::from_secs(60),
                memory_mb: 128,
                ephemeral_storage_mb: 512,
            },
            TargetKind::ApiCompute => Self {
                timeout: Duration::from_secs(5 * 60),
                memory_mb: 128,
                ephemeral_storage_mb: 512,
            },
            TargetKind::AdminCompute => Self {
                timeout: Duration::from_secs(15 * 60),
                memory_mb: 4096,
                ephemeral_storage_mb: 8 * 1024,
            },
        }
    }

    /// Kind defaults with the overrides from a target's config applied.
    pub fn from_config(config: &TargetConfig) -> ScopeResult<Self> {
        let mut budget = Self::for_kind(config.kind);
        if let Some(timeout) = &config.timeout {
            budget.timeout = parse_duration(timeout)
                .filter(|d| !d.is_zero())
                .ok_or_else(|| ScopeError::InvalidBudget {
                    target: config.id.clone(),
                    reason: format!("unparseable timeout {timeout:?}"),
                })?;
        }
        if let Some(memory) = config.memory_mb {
            budget.memory_mb = memory;
        }
        if let Some(storage) = config.ephemeral_storage_mb {
            budget.ephemeral_storage_mb = storage;
        }
        Ok(budget)
    }
}
