//! Shared target health view.
//!
//! Written by the health monitor, read by the dispatcher before forwarding
//! to a target whose action enables health checking.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use cloudperf_core::TargetId;

/// Last known health of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetHealth {
    /// No check result yet. Treated as routable.
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl TargetHealth {
    pub fn is_routable(&self) -> bool {
        !matches!(self, TargetHealth::Unhealthy)
    }
}

/// Cheaply cloneable handle to the health of every target.
#[derive(Debug, Clone, Default)]
pub struct HealthBoard {
    inner: Arc<RwLock<HashMap<TargetId, TargetHealth>>>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, target: &str) -> TargetHealth {
        let inner = self.inner.read().expect("health lock");
        inner.get(target).copied().unwrap_or_default()
    }

    /// Record a new status. Returns the previous one.
    pub fn set(&self, target: &str, health: TargetHealth) -> TargetHealth {
        let mut inner = self.inner.write().expect("health lock");
        let previous = inner.insert(target.to_string(), health).unwrap_or_default();
        if previous != health {
            debug!(target, ?previous, current = ?health, "target health changed");
        }
        previous
    }

    pub fn snapshot(&self) -> HashMap<TargetId, TargetHealth> {
        self.inner.read().expect("health lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_by_default_and_routable() {
        let board = HealthBoard::new();
        assert_eq!(board.status("api"), TargetHealth::Unknown);
        assert!(board.status("api").is_routable());
    }

    #[test]
    fn clones_share_state() {
        let board = HealthBoard::new();
        let view = board.clone();
        assert_eq!(board.set("api", TargetHealth::Unhealthy), TargetHealth::Unknown);
        assert_eq!(view.status("api"), TargetHealth::Unhealthy);
        assert!(!view.status("api").is_routable());
        assert_eq!(view.snapshot().len(), 1);
    }
}
