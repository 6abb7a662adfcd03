//! cloudperf-router — priority-ordered rule table and request dispatcher.
//!
//! Each inbound request is evaluated against the rule table in ascending
//! priority order; the first rule whose conditions all hold decides the
//! action. Forward actions invoke exactly one target through a
//! [`Forwarder`]; fixed responses are answered locally.
//!
//! # Components
//!
//! - **`glob`** — `*`/`?` path pattern matching
//! - **`table`** — rule table construction and build-time validation
//! - **`dispatcher`** — decision plus action execution with per-target timeouts
//! - **`health`** — shared health view consulted by health-checked forwards
//! - **`response`** — the edge's literal responses

pub mod dispatcher;
pub mod error;
pub mod glob;
pub mod health;
pub mod response;
pub mod table;

pub use dispatcher::{Decision, Dispatcher, ForwardFuture, Forwarder};
pub use error::{DispatchError, ForwardError, RuleTableError};
pub use glob::PathGlob;
pub use health::{HealthBoard, TargetHealth};
pub use response::EdgeResponse;
pub use table::{CATCH_ALL_PRIORITY, CompiledRule, RuleTable, RuleTableBuilder};
