//! One-shot init invocation.
//!
//! The ledger remembers every identity that completed. A deploy with an
//! identity already `Completed` skips the invocation; a failed identity is
//! invoked again on the next deploy.

use std::sync::Arc;

use tracing::{info, warn};

use cloudperf_core::{InitSpec, TargetKind};
use cloudperf_scope::TargetRegistry;
use cloudperf_state::{InitClaim, InitStatus, StateStore, epoch_secs};

use crate::error::InitError;
use crate::invoker::{AdminInvoker, invoke_within_budget};

/// Grace added to the invocation timeout before a `Pending` record is stale.
const INIT_LEASE_SLACK_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// The invocation ran and succeeded.
    Invoked { attempts: u32 },
    /// A previous deployment already completed this identity.
    AlreadyCompleted,
}

pub struct Initializer {
    spec: InitSpec,
    registry: Arc<TargetRegistry>,
    invoker: Arc<dyn AdminInvoker>,
    state: StateStore,
}

impl Initializer {
    /// Validate the declaration against the registry.
    pub fn new(
        spec: InitSpec,
        registry: Arc<TargetRegistry>,
        invoker: Arc<dyn AdminInvoker>,
        state: StateStore,
    ) -> Result<Self, InitError> {
        validate_init(&spec, &registry)?;
        Ok(Self {
            spec,
            registry,
            invoker,
            state,
        })
    }

    pub fn identity(&self) -> &str {
        &self.spec.identity
    }

    pub async fn run(&self) -> Result<InitOutcome, InitError> {
        let identity = &self.spec.identity;
        let target = self
            .registry
            .get(&self.spec.target)
            .ok_or_else(|| InitError::Invalid(format!("unknown target {}", self.spec.target)))?;

        let lease = target.budget.timeout.as_secs().saturating_add(INIT_LEASE_SLACK_SECS);
        let mut record = match self.state.begin_init(identity, &target.id, lease)? {
            InitClaim::Started(record) => record,
            InitClaim::AlreadyCompleted => {
                info!(%identity, "init already completed, skipping");
                return Ok(InitOutcome::AlreadyCompleted);
            }
            InitClaim::InProgress(record) => {
                warn!(%identity, attempts = record.attempts, "init already running elsewhere");
                return Err(InitError::InProgress {
                    identity: identity.clone(),
                    attempts: record.attempts,
                });
            }
        };
        let attempts = record.attempts;

        info!(
            %identity,
            target = %target.id,
            action = %self.spec.payload.action,
            param = %self.spec.payload.param,
            attempts,
            "running init invocation"
        );

        let result = invoke_within_budget(self.invoker.as_ref(), target, &self.spec.payload).await;
        record.updated_at = epoch_secs();
        match result {
            Ok(_) => {
                record.status = InitStatus::Completed;
                self.state.put_init(&record)?;
                info!(%identity, "init invocation completed");
                Ok(InitOutcome::Invoked { attempts })
            }
            Err(reason) => {
                warn!(%identity, %reason, "init invocation failed");
                record.status = InitStatus::Failed {
                    reason: reason.clone(),
                };
                self.state.put_init(&record)?;
                Err(InitError::InvocationFailed {
                    identity: identity.clone(),
                    reason,
                })
            }
        }
    }
}

/// Check an init declaration against the registry.
pub fn validate_init(spec: &InitSpec, registry: &TargetRegistry) -> Result<(), InitError> {
    if spec.identity.trim().is_empty() {
        return Err(InitError::Invalid("identity is empty".to_string()));
    }
    if spec.payload.action.is_empty() {
        return Err(InitError::Invalid("payload action is empty".to_string()));
    }
    let target = registry
        .get(&spec.target)
        .ok_or_else(|| InitError::Invalid(format!("unknown target {}", spec.target)))?;
    if target.kind != TargetKind::AdminCompute {
        return Err(InitError::Invalid(format!(
            "target {} is {}, not admin-compute",
            target.id,
            target.kind.label()
        )));
    }
    Ok(())
}
