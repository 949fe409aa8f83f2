//! Response handling and transformation.
//!
//! # Responsibilities
//! - Transform the upstream response for the client
//! - Strip hop-by-hop and encoding headers, force `Cache-Control: no-store`
//! - Stream the upstream body without buffering it
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Hop-by-hop headers stripped automatically
//! - Upstream failures are mapped to 502 by `RelayError`

use axum::{
    body::Body,
    http::{header, HeaderValue, Response},
};
use futures_util::TryStreamExt;

use crate::error::RelayError;
use crate::http::headers::client_response_headers;
use crate::net::SessionGuard;

const DEFAULT_CONTENT_TYPE: &str = "application/json";
const NO_STORE: &str = "no-store";

/// Convert an upstream response into the response sent to the client.
///
/// `guard` moves into the body stream, so the session stays counted until
/// the last chunk has been sent.
pub fn into_client_response(
    upstream: reqwest::Response,
    guard: SessionGuard,
) -> Result<Response<Body>, RelayError> {
    let status = upstream.status();
    let mut headers = client_response_headers(upstream.headers());

    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
        );
    }

    let stream = upstream.bytes_stream().inspect_err(move |e| {
        tracing::warn!(session = %guard.id(), error = %e, "Upstream body stream failed");
    });

    let mut response = Response::builder().status(status).body(Body::from_stream(stream))?;
    *response.headers_mut() = headers;
    Ok(response)
}
