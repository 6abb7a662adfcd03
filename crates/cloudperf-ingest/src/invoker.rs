//! Direct invocation of admin targets.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use cloudperf_core::{InvocationPayload, ObjectWriteEvent, TargetId};
use cloudperf_scope::Target;

use crate::error::InvokeError;
use crate::idempotency::IdempotencyKey;

pub type InvokeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<InvocationOutcome, InvokeError>> + Send + 'a>>;

/// Delivers a payload to a target and returns its reply.
pub trait AdminInvoker: Send + Sync {
    fn invoke<'a>(&'a self, target: &'a Target, payload: &'a InvocationPayload) -> InvokeFuture<'a>;
}

/// Invoke under the target's timeout budget and fold handler-reported
/// failures into the error channel.
pub(crate) async fn invoke_within_budget(
    invoker: &dyn AdminInvoker,
    target: &Target,
    payload: &InvocationPayload,
) -> Result<InvocationOutcome, String> {
    let timeout = target.budget.timeout;
    match tokio::time::timeout(timeout, invoker.invoke(target, payload)).await {
        Ok(Ok(outcome)) => match outcome.failure() {
            Some(reason) => Err(reason),
            None => Ok(outcome),
        },
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(InvokeError::TimedOut(timeout).to_string()),
    }
}

/// What the admin target answered.
///
/// Handlers reply with a JSON document; a numeric `status` of 400 or above
/// reports failure even when the transport succeeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvocationOutcome {
    pub body: serde_json::Value,
}

impl InvocationOutcome {
    pub fn new(body: serde_json::Value) -> Self {
        Self { body }
    }

    pub fn failure(&self) -> Option<String> {
        let status = self.body.get("status")?.as_u64()?;
        if status < 400 {
            return None;
        }
        let msg = self
            .body
            .get("msg")
            .and_then(|m| m.as_str())
            .unwrap_or("no message");
        Some(format!("handler reported status {status}: {msg}"))
    }
}

/// One rule firing for one object write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminInvocation {
    /// Index of the event rule that fired.
    pub rule: usize,
    pub target: TargetId,
    pub event: ObjectWriteEvent,
    pub idempotency_key: IdempotencyKey,
    /// Rendered payload, with `idempotency_key` filled in.
    pub payload: InvocationPayload,
}
