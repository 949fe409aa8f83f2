//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) and echo it on the response
//! - Turn one inbound request into the equivalent outbound request
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - The inbound body is handed to the outbound client as a stream; it is
//!   never collected in memory

use axum::{
    body::Body,
    http::{request::Parts, HeaderValue, Method},
};
use tower_http::request_id::{MakeRequestId, RequestId};
use url::Url;

use crate::http::headers::{outbound_request_headers, strip_body_headers};

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Mints a fresh UUID v4 for requests that arrive without an `x-request-id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Correlation id of a request, or `"unknown"` when the layer did not run.
pub fn request_id(parts: &Parts) -> String {
    parts
        .headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// GET and HEAD are forwarded without a body.
pub fn carries_body(method: &Method) -> bool {
    *method != Method::GET && *method != Method::HEAD
}

/// Build the outbound request for an inbound one.
pub fn build_outbound(
    client: &reqwest::Client,
    url: Url,
    parts: &Parts,
    body: Body,
) -> reqwest::RequestBuilder {
    let mut headers = outbound_request_headers(&parts.headers);
    let body = if carries_body(&parts.method) {
        Some(reqwest::Body::wrap_stream(body.into_data_stream()))
    } else {
        strip_body_headers(&mut headers);
        None
    };

    let builder = client.request(parts.method.clone(), url).headers(headers);
    match body {
        Some(body) => builder.body(body),
        None => builder,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{header, Request};

    use super::*;

    #[test]
    fn body_only_for_non_get_head() {
        assert!(!carries_body(&Method::GET));
        assert!(!carries_body(&Method::HEAD));
        assert!(carries_body(&Method::POST));
        assert!(carries_body(&Method::PUT));
        assert!(carries_body(&Method::OPTIONS));
    }

    #[test]
    fn uuid_request_ids_are_unique() {
        let request = Request::new(());
        let mut maker = MakeRequestUuid;
        let a = maker.make_request_id(&request).unwrap();
        let b = maker.make_request_id(&request).unwrap();
        assert_ne!(a.header_value(), b.header_value());
    }

    #[test]
    fn outbound_request_targets_upstream() {
        let inbound = Request::builder()
            .method(Method::POST)
            .uri("/rpc?x=1")
            .header(header::HOST, "localhost:8080")
            .header(header::CONTENT_TYPE, "application/json")
            .body(())
            .unwrap();
        let (parts, ()) = inbound.into_parts();

        let client = reqwest::Client::new();
        let url = Url::parse("http://node.example:8899/rpc?x=1").unwrap();
        let request = build_outbound(&client, url, &parts, Body::from("{}"))
            .build()
            .unwrap();

        assert_eq!(request.method(), &Method::POST);
        assert_eq!(request.url().as_str(), "http://node.example:8899/rpc?x=1");
        assert!(request.headers().get(header::HOST).is_none());
        assert_eq!(
            request.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert!(request.body().is_some());
    }

    #[test]
    fn get_with_body_drops_length_and_body() {
        let inbound = Request::builder()
            .method(Method::GET)
            .uri("/health")
            .header(header::CONTENT_LENGTH, "5")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(())
            .unwrap();
        let (parts, ()) = inbound.into_parts();

        let client = reqwest::Client::new();
        let url = Url::parse("http://node.example:8899/health").unwrap();
        let request = build_outbound(&client, url, &parts, Body::from("hello"))
            .build()
            .unwrap();

        assert!(request.headers().get(header::CONTENT_LENGTH).is_none());
        assert!(request.headers().get(header::CONTENT_TYPE).is_none());
        assert!(request.body().is_none());
    }
}
