//! Header hygiene between the inbound and outbound hops.
//!
//! # Responsibilities
//! - Drop `Host` so the upstream receives its own authority
//! - Strip hop-by-hop headers in both directions
//! - Detect WebSocket upgrade requests

use axum::http::{
    header::{self, HeaderName},
    HeaderMap,
};

/// Headers that describe a single connection hop (RFC 9110 §7.6.1 plus the
/// legacy `keep-alive` and `proxy-connection`).
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Names listed in a `Connection` header are hop-by-hop too.
fn connection_listed(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Headers copied from the inbound request onto the outbound request.
///
/// `Host` is dropped so the outbound client fills in the upstream authority.
/// `Accept-Encoding` is dropped so the outbound client negotiates (and
/// decodes) compression for its own hop.
pub fn outbound_request_headers(inbound: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(inbound);
    let mut outbound = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if name == header::HOST
            || name == header::ACCEPT_ENCODING
            || is_hop_by_hop(name)
            || listed.iter().any(|l| l == name.as_str())
        {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound
}

/// Headers copied from the upstream response onto the client response.
///
/// `Content-Encoding` is never copied: the outbound client hands over decoded
/// bytes, so the header would make the client decode them a second time.
pub fn client_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(upstream);
    let mut client = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if name == header::CONTENT_ENCODING
            || is_hop_by_hop(name)
            || listed.iter().any(|l| l == name.as_str())
        {
            continue;
        }
        client.append(name.clone(), value.clone());
    }
    client
}

/// Drop the headers that describe a request body.
///
/// Used for methods forwarded without a body, where a stale
/// `Content-Length` would make the upstream wait for bytes that never come.
pub fn strip_body_headers(headers: &mut HeaderMap) {
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_TYPE);
}

/// True when the request asks for a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    upgrade && connection_listed(headers).iter().any(|token| token == "upgrade")
}
