//! Edge error types.

use std::net::SocketAddr;

use thiserror::Error;

pub type EdgeResult<T> = Result<T, EdgeError>;

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
}
