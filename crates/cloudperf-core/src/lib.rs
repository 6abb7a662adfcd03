pub mod config;
pub mod duration;
pub mod types;

pub use config::{HealthCheckConfig, StackConfig, TargetConfig};
pub use duration::parse_duration;
pub use types::*;
