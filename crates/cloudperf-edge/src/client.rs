//! Single-request HTTP/1.1 client over a fresh TCP connection.

use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tracing::debug;

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Why an exchange failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Could not open the connection.
    Connect(String),
    /// Connection opened but the exchange did not complete.
    Exchange(String),
}

/// Send `req` to `endpoint` (`host:port`) and read the whole response.
pub async fn send(endpoint: &str, req: Request<Full<Bytes>>) -> Result<Exchange, ClientError> {
    let stream = tokio::net::TcpStream::connect(endpoint)
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| ClientError::Connect(e.to_string()))?;

    let endpoint_owned = endpoint.to_string();
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(endpoint = %endpoint_owned, error = %e, "client connection closed with error");
        }
    });

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| ClientError::Exchange(e.to_string()))?;
    let (parts, body) = resp.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| ClientError::Exchange(e.to_string()))?
        .to_bytes();

    Ok(Exchange {
        status: parts.status,
        headers: parts.headers,
        body,
    })
}
