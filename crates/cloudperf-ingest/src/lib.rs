//! cloudperf-ingest — object-store triggers and the one-shot init invocation.
//!
//! An object write is matched against every event rule by key prefix and
//! suffix. Each matching rule yields one independent [`AdminInvocation`];
//! nothing is deduplicated across rules or across re-uploads. Every cycle is
//! tracked in the ledger as `Uploaded → AdminInvoked → {Applied | Failed}`
//! and a failed cycle is never retried.
//!
//! Invocations carry an [`IdempotencyKey`] so the admin handler can skip
//! work it has already applied through an [`IdempotencyGuard`].
//!
//! The [`Initializer`] issues the deployment-time init invocation at most
//! once per identity and fails closed.

pub mod error;
pub mod event;
pub mod idempotency;
pub mod init;
pub mod invoker;
pub mod pipeline;
pub mod rules;

pub use error::{IngestError, IngestResult, InitError, InvokeError};
pub use event::NotificationEnvelope;
pub use idempotency::{IdempotencyGuard, IdempotencyKey, LedgerGuard};
pub use init::{InitOutcome, Initializer, validate_init};
pub use invoker::{AdminInvocation, AdminInvoker, InvocationOutcome, InvokeFuture};
pub use pipeline::IngestionPipeline;
pub use rules::{EventRule, EventRuleSet};
