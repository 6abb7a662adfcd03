//! cloudperf-edge — the HTTP surface of the routing layer.
//!
//! - **`listener`** — hyper HTTP/1.1 server; every request becomes a
//!   `RequestDescriptor` handed to the dispatcher
//! - **`forward`** — `Forwarder` that relays the request to a target over HTTP
//! - **`invoke`** — `AdminInvoker` that POSTs JSON payloads to admin targets
//! - **`client`** — the single-request HTTP/1.1 client both of them share
//! - **`convert`** — conversions between hyper types and edge types

pub mod client;
pub mod convert;
pub mod error;
pub mod forward;
pub mod invoke;
pub mod listener;

pub use error::{EdgeError, EdgeResult};
pub use forward::HttpForwarder;
pub use invoke::HttpAdminInvoker;
pub use listener::EdgeListener;
