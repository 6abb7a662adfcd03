//! HTTP forwarder: relays the original request to the chosen target.

use bytes::Bytes;
use http::{Method, Request, header};
use http_body_util::Full;
use tracing::debug;

use cloudperf_core::RequestDescriptor;
use cloudperf_router::{EdgeResponse, ForwardError, ForwardFuture, Forwarder};
use cloudperf_scope::Target;

use crate::client::{self, ClientError};
use crate::convert::{headers_from_tuples, headers_to_tuples};

#[derive(Debug, Clone, Default)]
pub struct HttpForwarder;

impl HttpForwarder {
    pub fn new() -> Self {
        Self
    }
}

impl Forwarder for HttpForwarder {
    fn forward<'a>(&'a self, target: &'a Target, req: &'a RequestDescriptor) -> ForwardFuture<'a> {
        Box::pin(async move {
            let endpoint = target.endpoint.as_str();
            let exchange_err = |reason: String| ForwardError::Exchange {
                endpoint: endpoint.to_string(),
                reason,
            };

            let method = Method::from_bytes(req.method.as_bytes()).map_err(|e| exchange_err(e.to_string()))?;
            let mut headers = headers_from_tuples(&req.headers);
            headers.remove(header::HOST);

            let mut builder = Request::builder()
                .method(method)
                .uri(req.path_and_query())
                .header(header::HOST, endpoint);
            if let Some(map) = builder.headers_mut() {
                map.extend(headers);
            }
            let outbound = builder
                .body(Full::new(Bytes::from(req.body.clone())))
                .map_err(|e| exchange_err(e.to_string()))?;

            debug!(target = %target.id, %endpoint, path = %req.path, "forwarding request");
            let exchange = client::send(endpoint, outbound).await.map_err(|e| match e {
                ClientError::Connect(reason) => ForwardError::Connect {
                    endpoint: endpoint.to_string(),
                    reason,
                },
                ClientError::Exchange(reason) => exchange_err(reason),
            })?;

            Ok(EdgeResponse {
                status: exchange.status.as_u16(),
                headers: headers_to_tuples(&exchange.headers),
                body: exchange.body.to_vec(),
            })
        })
    }
}
