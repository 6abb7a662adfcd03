//! Ingestion trigger pipeline.

use std::sync::Arc;

use tracing::{debug, info, warn};

use cloudperf_core::ObjectWriteEvent;
use cloudperf_scope::TargetRegistry;
use cloudperf_state::{IngestionRecord, IngestionStatus, StateStore, epoch_secs};

use crate::error::IngestResult;
use crate::event::NotificationEnvelope;
use crate::idempotency::IdempotencyKey;
use crate::invoker::{AdminInvocation, AdminInvoker, invoke_within_budget};
use crate::rules::EventRuleSet;

/// Turns object writes into admin invocations and records each cycle.
#[derive(Clone)]
pub struct IngestionPipeline {
    rules: Arc<EventRuleSet>,
    registry: Arc<TargetRegistry>,
    invoker: Arc<dyn AdminInvoker>,
    state: StateStore,
}

impl IngestionPipeline {
    pub fn new(
        rules: Arc<EventRuleSet>,
        registry: Arc<TargetRegistry>,
        invoker: Arc<dyn AdminInvoker>,
        state: StateStore,
    ) -> Self {
        Self {
            rules,
            registry,
            invoker,
            state,
        }
    }

    pub fn rules(&self) -> &EventRuleSet {
        &self.rules
    }

    /// Invocations this write would fire, one per matching rule. Empty when
    /// no rule matches or the event is not an object creation.
    pub fn on_object_write(&self, event: &ObjectWriteEvent) -> Vec<AdminInvocation> {
        let idempotency_key = IdempotencyKey::for_object(&event.bucket, &event.key, event.version.as_deref());
        self.rules
            .matching(event)
            .map(|rule| {
                let mut payload = rule.payload.render(event);
                payload.idempotency_key = Some(idempotency_key.to_string());
                AdminInvocation {
                    rule: rule.index,
                    target: rule.target.clone(),
                    event: event.clone(),
                    idempotency_key: idempotency_key.clone(),
                    payload,
                }
            })
            .collect()
    }

    /// Fire every matching rule once, in rule order, and record the cycles.
    ///
    /// Invocation failures end their own cycle as `Failed` and do not stop
    /// the remaining rules. Only ledger errors are returned.
    pub async fn handle(&self, event: &ObjectWriteEvent) -> IngestResult<Vec<IngestionRecord>> {
        let invocations = self.on_object_write(event);
        if invocations.is_empty() {
            debug!(bucket = %event.bucket, key = %event.key, event_type = %event.event_type, "no event rule matched");
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(invocations.len());
        for invocation in &invocations {
            records.push(self.run(invocation).await?);
        }
        Ok(records)
    }

    /// Handle every record of a notification envelope in order.
    pub async fn handle_envelope(&self, envelope: NotificationEnvelope) -> IngestResult<Vec<IngestionRecord>> {
        let mut records = Vec::new();
        for event in envelope.into_events()? {
            records.extend(self.handle(&event).await?);
        }
        Ok(records)
    }

    async fn run(&self, invocation: &AdminInvocation) -> IngestResult<IngestionRecord> {
        let now = epoch_secs();
        let record = self.state.insert_ingestion(&IngestionRecord {
            seq: 0,
            bucket: invocation.event.bucket.clone(),
            key: invocation.event.key.clone(),
            rule: invocation.rule,
            target: invocation.target.clone(),
            idempotency_key: invocation.idempotency_key.to_string(),
            status: IngestionStatus::Uploaded,
            created_at: now,
            updated_at: now,
        })?;

        let Some(target) = self.registry.get(&invocation.target) else {
            let reason = format!("target {} not registered", invocation.target);
            warn!(seq = record.seq, %reason, "ingestion failed");
            return Ok(self
                .state
                .transition_ingestion(record.seq, IngestionStatus::Failed { reason })?);
        };

        self.state
            .transition_ingestion(record.seq, IngestionStatus::AdminInvoked)?;
        info!(
            seq = record.seq,
            key = %invocation.event.key,
            rule = invocation.rule,
            target = %target.id,
            action = %invocation.payload.action,
            "admin invoked"
        );

        let next = match invoke_within_budget(self.invoker.as_ref(), target, &invocation.payload).await {
            Ok(_) => IngestionStatus::Applied,
            Err(reason) => {
                warn!(seq = record.seq, key = %invocation.event.key, target = %target.id, %reason, "ingestion failed");
                IngestionStatus::Failed { reason }
            }
        };
        Ok(self.state.transition_ingestion(record.seq, next)?)
    }
}
