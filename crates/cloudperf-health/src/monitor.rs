//! Health monitor — one background check loop per health-checked target.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use cloudperf_core::{HealthCheckConfig, TargetId, parse_duration};
use cloudperf_router::{HealthBoard, RuleTable};
use cloudperf_scope::{Target, TargetRegistry};

use crate::checker::{HealthTracker, http_check};

struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Runs check loops and publishes results to a [`HealthBoard`].
pub struct HealthMonitor {
    board: HealthBoard,
    monitors: Arc<RwLock<HashMap<TargetId, MonitorSlot>>>,
}

impl HealthMonitor {
    pub fn new(board: HealthBoard) -> Self {
        Self {
            board,
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn board(&self) -> &HealthBoard {
        &self.board
    }

    /// Start a loop for every target that enables health checking in its
    /// own config or is the target of a health-checked forward. Returns how
    /// many were started.
    pub async fn start_all(&self, registry: &TargetRegistry, table: &RuleTable) -> usize {
        let gated = table.health_checked_targets();
        let mut started = 0;
        for target in registry
            .iter()
            .filter(|t| t.health_check_enabled() || gated.contains(t.id.as_str()))
        {
            self.start_monitor(target).await;
            started += 1;
        }
        started
    }

    /// Start probing a target, replacing any loop already running for it.
    pub async fn start_monitor(&self, target: &Target) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let id = target.id.clone();
        let config = target.health_check.clone();
        let endpoint = target.endpoint.clone();
        let board = self.board.clone();

        let handle = tokio::spawn(async move {
            run_health_loop(&id, &config, &endpoint, board, shutdown_rx).await;
        });

        let mut monitors = self.monitors.write().await;
        if let Some(old) = monitors.insert(target.id.clone(), MonitorSlot { handle, shutdown_tx }) {
            let _ = old.shutdown_tx.send(true);
            old.handle.abort();
        }

        info!(target = %target.id, path = %target.health_check.path, "health monitor started");
    }

    pub async fn stop_monitor(&self, target: &str) {
        let mut monitors = self.monitors.write().await;
        if let Some(slot) = monitors.remove(target) {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            info!(target, "health monitor stopped");
        }
    }

    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (id, slot) in monitors.drain() {
            let _ = slot.shutdown_tx.send(true);
            slot.handle.abort();
            debug!(target = %id, "health monitor stopped");
        }
        info!("all health monitors stopped");
    }

    pub async fn active_monitors(&self) -> Vec<TargetId> {
        self.monitors.read().await.keys().cloned().collect()
    }

    pub async fn is_monitoring(&self, target: &str) -> bool {
        self.monitors.read().await.contains_key(target)
    }
}

async fn run_health_loop(
    target: &str,
    config: &HealthCheckConfig,
    endpoint: &str,
    board: HealthBoard,
    mut shutdown: watch::Receiver<bool>,
) {
    let timeout = parse_duration(&config.timeout).unwrap_or(Duration::from_secs(2));
    let mut tracker = HealthTracker::new(config);

    debug!(target, path = %config.path, "health loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(tracker.next_interval()) => {
                let result = http_check(endpoint, &config.path, timeout).await;
                let previous = tracker.status();
                let current = tracker.record(result);
                if current != previous {
                    board.set(target, current);
                }
            }
            _ = shutdown.changed() => {
                debug!(target, "health loop shutting down");
                break;
            }
        }
    }
}
