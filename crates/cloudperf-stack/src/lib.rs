//! cloudperf-stack — assembles a deployment from configuration.
//!
//! [`Stack::build`] turns a [`StackConfig`](cloudperf_core::StackConfig)
//! into the immutable structures the routing layer runs on (target registry,
//! rule table, event rules) and checks every construction invariant up
//! front. [`Stack::deploy`] then runs the init invocation, failing closed,
//! and records the completed deployment.

pub mod error;
pub mod stack;

pub use error::{StackError, StackResult};
pub use stack::{DeployReport, ReachabilityRow, Stack};
