//! The fixed upstream base address and URL rewriting.

use url::Url;

use crate::error::RelayError;

/// Immutable upstream base.
///
/// Inbound `path + query` is appended verbatim to the base, so a base with a
/// path (`https://node.example/v1/KEY`) keeps it in front of every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    base: Url,
    http_base: String,
    ws_base: String,
    authority: String,
}

impl UpstreamTarget {
    /// Parse and normalise an upstream base URL.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let base = Url::parse(raw).map_err(|e| RelayError::InvalidTarget(format!("{raw}: {e}")))?;

        let (http_scheme, ws_scheme) = match base.scheme() {
            "http" | "ws" => ("http", "ws"),
            "https" | "wss" => ("https", "wss"),
            other => {
                return Err(RelayError::InvalidTarget(format!(
                    "{raw}: unsupported scheme '{other}'"
                )))
            }
        };

        let host = base
            .host_str()
            .ok_or_else(|| RelayError::InvalidTarget(format!("{raw}: missing host")))?;
        let authority = match base.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let http_base = with_scheme(&base, http_scheme)?;
        let ws_base = with_scheme(&base, ws_scheme)?;

        Ok(Self {
            base,
            http_base,
            ws_base,
            authority,
        })
    }

    /// The base URL as configured.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// `host[:port]` of the upstream, the value the upstream expects in `Host`.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Outbound HTTP(S) URL for an inbound `path?query`.
    pub fn http_url(&self, path_and_query: &str) -> Result<Url, RelayError> {
        join(&self.http_base, path_and_query)
    }

    /// Outbound WS(S) URL for an inbound `path?query`.
    pub fn ws_url(&self, path_and_query: &str) -> Result<Url, RelayError> {
        join(&self.ws_base, path_and_query)
    }
}

// Base rendered with the given scheme and without a trailing slash.
fn with_scheme(base: &Url, scheme: &str) -> Result<String, RelayError> {
    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|_| RelayError::InvalidTarget(format!("{base}: cannot use scheme '{scheme}'")))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn join(base: &str, path_and_query: &str) -> Result<Url, RelayError> {
    let joined = if path_and_query.starts_with('/') {
        format!("{base}{path_and_query}")
    } else {
        format!("{base}/{path_and_query}")
    };
    Url::parse(&joined).map_err(|e| RelayError::InvalidTarget(format!("{joined}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_path_and_query() {
        let target = UpstreamTarget::parse("https://api.mainnet-beta.solana.com").unwrap();
        let url = target.http_url("/health?verbose=1").unwrap();
        assert_eq!(url.as_str(), "https://api.mainnet-beta.solana.com/health?verbose=1");
        assert_eq!(target.authority(), "api.mainnet-beta.solana.com");
    }

    #[test]
    fn root_request_keeps_single_slash() {
        let target = UpstreamTarget::parse("http://127.0.0.1:8899/").unwrap();
        assert_eq!(target.http_url("/").unwrap().as_str(), "http://127.0.0.1:8899/");
        assert_eq!(target.authority(), "127.0.0.1:8899");
    }

    #[test]
    fn base_path_is_preserved() {
        let target = UpstreamTarget::parse("https://rpc.example.com/v1/abc/").unwrap();
        assert_eq!(
            target.http_url("/x?y=z").unwrap().as_str(),
            "https://rpc.example.com/v1/abc/x?y=z"
        );
        assert_eq!(
            target.ws_url("/").unwrap().as_str(),
            "wss://rpc.example.com/v1/abc/"
        );
    }

    #[test]
    fn scheme_mapping() {
        let secure = UpstreamTarget::parse("https://node.example").unwrap();
        assert_eq!(secure.ws_url("/ws").unwrap().as_str(), "wss://node.example/ws");

        let plain = UpstreamTarget::parse("http://node.example:8545").unwrap();
        assert_eq!(plain.ws_url("/ws?a=1").unwrap().as_str(), "ws://node.example:8545/ws?a=1");

        let ws_base = UpstreamTarget::parse("wss://node.example").unwrap();
        assert_eq!(ws_base.http_url("/").unwrap().as_str(), "https://node.example/");
    }

    #[test]
    fn rejects_non_web_scheme() {
        assert!(matches!(
            UpstreamTarget::parse("ftp://node.example"),
            Err(RelayError::InvalidTarget(_))
        ));
    }
}
