//! Edge listener.
//!
//! Accepts HTTP/1.1 connections and hands every request to the dispatcher.
//! One tokio task per connection; the dispatcher is cloned into each.

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

use cloudperf_router::{Dispatcher, EdgeResponse};

use crate::convert::{descriptor_from_parts, into_hyper_response};
use crate::error::{EdgeError, EdgeResult};

/// Largest request body the edge buffers before evaluating rules.
pub const DEFAULT_MAX_BODY: usize = 1024 * 1024;

pub struct EdgeListener {
    listener: TcpListener,
    dispatcher: Dispatcher,
    max_body: usize,
}

impl EdgeListener {
    pub async fn bind(addr: SocketAddr, dispatcher: Dispatcher) -> EdgeResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| EdgeError::Bind { addr, source })?;
        Ok(Self {
            listener,
            dispatcher,
            max_body: DEFAULT_MAX_BODY,
        })
    }

    /// Requests with a larger body are answered 413 without dispatching.
    pub fn with_max_body(mut self, bytes: usize) -> Self {
        self.max_body = bytes;
        self
    }

    pub fn local_addr(&self) -> EdgeResult<SocketAddr> {
        self.listener.local_addr().map_err(EdgeError::Accept)
    }

    /// Serve until `shutdown` flips.
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> EdgeResult<()> {
        let addr = self.local_addr()?;
        info!(%addr, "edge listening");

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted.map_err(EdgeError::Accept)?;
                    let dispatcher = self.dispatcher.clone();
                    let max_body = self.max_body;

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let svc = service_fn(move |req: Request<Incoming>| {
                            let dispatcher = dispatcher.clone();
                            async move { Ok::<_, hyper::Error>(handle(&dispatcher, req, max_body).await) }
                        });
                        if let Err(e) = http1::Builder::new().serve_connection(io, svc).await {
                            error!(%peer, error = %e, "connection error");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    info!("edge shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}

async fn handle(dispatcher: &Dispatcher, req: Request<Incoming>, max_body: usize) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, max_body).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            debug!(limit = max_body, path = %parts.uri.path(), "request body too large");
            return into_hyper_response(EdgeResponse::new(413, "text/plain", "Payload Too Large"));
        }
        Err(e) => {
            debug!(error = %e, "request body read failed");
            return into_hyper_response(EdgeResponse::new(400, "text/plain", "Bad Request"));
        }
    };
    let descriptor = descriptor_from_parts(&parts, body);
    into_hyper_response(dispatcher.handle(&descriptor).await)
}
