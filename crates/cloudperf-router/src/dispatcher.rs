//! Request dispatcher.
//!
//! Turns a [`RequestDescriptor`] into a response: evaluate the rule table,
//! then either answer with the fixed response or invoke exactly one target
//! through the [`Forwarder`] under that target's timeout budget.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use cloudperf_core::{Action, RequestDescriptor};
use cloudperf_scope::{Target, TargetRegistry};

use crate::error::{DispatchError, ForwardError};
use crate::health::HealthBoard;
use crate::response::EdgeResponse;
use crate::table::RuleTable;

/// Future returned by [`Forwarder::forward`].
pub type ForwardFuture<'a> =
    Pin<Box<dyn Future<Output = Result<EdgeResponse, ForwardError>> + Send + 'a>>;

/// Invokes a target with the original request.
///
/// The edge plugs in an HTTP client; tests use recording doubles.
pub trait Forwarder: Send + Sync {
    fn forward<'a>(&'a self, target: &'a Target, req: &'a RequestDescriptor) -> ForwardFuture<'a>;
}

/// Outcome of rule evaluation, before any side effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub priority: u32,
    pub action: Action,
}

/// Evaluates rules and executes the winning action.
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<RuleTable>,
    registry: Arc<TargetRegistry>,
    health: HealthBoard,
    forwarder: Arc<dyn Forwarder>,
}

impl Dispatcher {
    pub fn new(
        table: Arc<RuleTable>,
        registry: Arc<TargetRegistry>,
        health: HealthBoard,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        Self {
            table,
            registry,
            health,
            forwarder,
        }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    pub fn health(&self) -> &HealthBoard {
        &self.health
    }

    /// Pick the action for a request. Pure; nothing is invoked.
    pub fn dispatch(&self, req: &RequestDescriptor) -> Result<Decision, DispatchError> {
        let rule = self
            .table
            .evaluate(req)
            .ok_or_else(|| DispatchError::NoRuleMatched {
                method: req.method.clone(),
                path: req.path.clone(),
            })?;
        Ok(Decision {
            priority: rule.priority(),
            action: rule.action().clone(),
        })
    }

    /// Dispatch and carry out the decision.
    pub async fn execute(&self, req: &RequestDescriptor) -> Result<EdgeResponse, DispatchError> {
        let decision = self.dispatch(req)?;
        debug!(
            method = %req.method,
            path = %req.path,
            priority = decision.priority,
            "rule matched"
        );

        let (target_id, health_checked) = match &decision.action {
            Action::FixedResponse {
                status,
                content_type,
                body,
            } => return Ok(EdgeResponse::new(*status, content_type, body.as_bytes())),
            Action::Forward {
                target,
                health_check_enabled,
            } => (target, *health_check_enabled),
        };

        let target = self
            .registry
            .get(target_id)
            .ok_or_else(|| DispatchError::UnknownTarget(target_id.clone()))?;

        if health_checked && !self.health.status(&target.id).is_routable() {
            return Err(DispatchError::TargetUnhealthy(target.id.clone()));
        }

        let timeout = target.budget.timeout;
        match tokio::time::timeout(timeout, self.forwarder.forward(target, req)).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(source)) => Err(DispatchError::ForwardFailed {
                target: target.id.clone(),
                source,
            }),
            Err(_) => Err(DispatchError::ForwardTimedOut {
                target: target.id.clone(),
                timeout,
            }),
        }
    }

    /// Like [`execute`](Self::execute) but always yields a response.
    pub async fn handle(&self, req: &RequestDescriptor) -> EdgeResponse {
        match self.execute(req).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(method = %req.method, path = %req.path, error = %e, "dispatch failed");
                EdgeResponse::from_error(&e)
            }
        }
    }
}
