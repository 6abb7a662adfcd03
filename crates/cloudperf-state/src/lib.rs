//! cloudperf-state — the deployment ledger.
//!
//! Backed by [redb](https://docs.rs/redb). Records which init invocations
//! have completed, the lifecycle of every ingestion cycle, idempotency
//! claims made by admin handlers, and completed deployments.
//!
//! Values are JSON in `&[u8]` columns. Ingestion records are keyed by a
//! zero-padded sequence number so iteration order is arrival order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
