//! cloudperfd — daemon support library.
//!
//! The binary in `main.rs` wires the stack together; the control API lives
//! here so it can be exercised without a listener.

pub mod control;

pub use control::{ControlState, build_router};
