//! HTTP admin invoker: POSTs the JSON payload to the admin target.

use bytes::Bytes;
use http::{Method, Request, header};
use http_body_util::Full;
use tracing::debug;

use cloudperf_core::InvocationPayload;
use cloudperf_ingest::{AdminInvoker, InvocationOutcome, InvokeError, InvokeFuture};
use cloudperf_scope::Target;

use crate::client::{self, ClientError};

/// Path the payload is POSTed to on the target.
pub const INVOKE_PATH: &str = "/";

#[derive(Debug, Clone, Default)]
pub struct HttpAdminInvoker;

impl HttpAdminInvoker {
    pub fn new() -> Self {
        Self
    }
}

impl AdminInvoker for HttpAdminInvoker {
    fn invoke<'a>(&'a self, target: &'a Target, payload: &'a InvocationPayload) -> InvokeFuture<'a> {
        Box::pin(async move {
            let endpoint = target.endpoint.as_str();
            let body = serde_json::to_vec(payload).map_err(|e| InvokeError::Transport(e.to_string()))?;
            let req = Request::builder()
                .method(Method::POST)
                .uri(INVOKE_PATH)
                .header(header::HOST, endpoint)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(body)))
                .map_err(|e| InvokeError::Transport(e.to_string()))?;

            debug!(target = %target.id, action = %payload.action, "invoking admin target");
            let exchange = client::send(endpoint, req).await.map_err(|e| match e {
                ClientError::Connect(reason) | ClientError::Exchange(reason) => InvokeError::Transport(reason),
            })?;

            if !exchange.status.is_success() {
                return Err(InvokeError::Rejected {
                    status: exchange.status.as_u16(),
                    message: String::from_utf8_lossy(&exchange.body).into_owned(),
                });
            }

            let body = if exchange.body.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&exchange.body)
                    .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&exchange.body).into_owned()))
            };
            Ok(InvocationOutcome::new(body))
        })
    }
}
