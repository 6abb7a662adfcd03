//! Conversions between hyper/http types and edge types.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use http_body_util::Full;
use hyper::Response;

use cloudperf_core::RequestDescriptor;
use cloudperf_router::EdgeResponse;

/// Connection-scoped headers never relayed in either direction.
pub const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

pub fn status_from_u16(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Relayable headers as (name, value) pairs. Non-UTF-8 values are dropped.
pub fn headers_to_tuples(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Build a header map, skipping invalid and hop-by-hop entries.
pub fn headers_from_tuples(tuples: &[(String, String)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in tuples {
        if is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            map.append(name, value);
        }
    }
    map
}

pub fn descriptor_from_parts(parts: &http::request::Parts, body: Bytes) -> RequestDescriptor {
    let mut req = RequestDescriptor::from_parts(parts.method.as_str(), parts.uri.path(), parts.uri.query());
    req.headers = headers_to_tuples(&parts.headers);
    req.body = body.to_vec();
    req
}

pub fn into_hyper_response(resp: EdgeResponse) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(Bytes::from(resp.body)));
    *out.status_mut() = status_from_u16(resp.status);
    *out.headers_mut() = headers_from_tuples(&resp.headers);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_headers_are_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", "keep-alive".parse().unwrap());
        headers.insert("Transfer-Encoding", "chunked".parse().unwrap());
        headers.insert("x-request-id", "abc".parse().unwrap());

        let tuples = headers_to_tuples(&headers);
        assert_eq!(tuples, vec![("x-request-id".to_string(), "abc".to_string())]);
    }

    #[test]
    fn descriptor_carries_query_and_headers() {
        let req = http::Request::builder()
            .method("POST")
            .uri("http://edge/job/run?query=login&n=1")
            .header("content-type", "application/json")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();

        let desc = descriptor_from_parts(&parts, Bytes::from_static(b"{}"));
        assert_eq!(desc.method, "POST");
        assert_eq!(desc.path, "/job/run");
        assert_eq!(desc.query_param("query"), Some("login"));
        assert_eq!(desc.path_and_query(), "/job/run?query=login&n=1");
        assert_eq!(desc.body, b"{}");
        assert_eq!(desc.headers.len(), 1);
    }

    #[test]
    fn fixed_response_converts_literally() {
        let resp = into_hyper_response(EdgeResponse::new(403, "text/plain", "Forbidden"));
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers().get("content-type").unwrap(), "text/plain");
    }

    #[test]
    fn invalid_status_falls_back_to_500() {
        assert_eq!(status_from_u16(42), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
