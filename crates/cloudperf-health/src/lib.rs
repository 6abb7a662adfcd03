//! cloudperf-health — target health probing.
//!
//! Targets with health checking enabled get a background check loop. The
//! loop keeps a [`HealthTracker`] per target and publishes status changes
//! to the shared [`HealthBoard`](cloudperf_router::HealthBoard), which the
//! dispatcher consults before a health-checked forward.
//!
//! ```text
//! HealthMonitor
//!   └── per-target task
//!       ├── http_check() → CheckResult
//!       ├── HealthTracker (thresholds, backoff)
//!       └── HealthBoard::set on change
//! ```
//!
//! Failed checks back off exponentially from the configured interval up
//! to 60s. One successful check restores `Healthy`.

pub mod checker;
pub mod monitor;

pub use checker::{CheckResult, HealthTracker, http_check};
pub use monitor::HealthMonitor;
