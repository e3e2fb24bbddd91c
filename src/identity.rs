//! Client identity extraction.
//!
//! A request's client key is, in order of preference:
//!
//! 1. the trimmed `X-Real-Ip` header, if non-empty
//! 2. the first trimmed entry of `X-Forwarded-For`, if non-empty
//! 3. the transport peer address with its port removed
//!
//! The headers are only consulted under [`IdentityPolicy::TrustProxyHeaders`].
//! Clients can set them to anything, so that policy is only sound behind a
//! reverse proxy which overwrites both headers on every request.

use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, HeaderName, Request};
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::IdentityPolicy;
use crate::ratelimit::ClientKey;

/// `X-Real-Ip` request header.
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
/// `X-Forwarded-For` request header.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Raw `host:port` peer address attached to a request by a transport that
/// does not provide [`ConnectInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

/// The client identity could not be derived from a request.
///
/// This is a deployment fault, not something the client did wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    /// Neither `ConnectInfo` nor `RemoteAddr` was attached to the request
    #[error("no remote address available for request")]
    MissingRemoteAddr,

    /// The peer address is not in `host:port` form
    #[error("address {addr}: {reason}")]
    Malformed {
        /// The offending address
        addr: String,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// Derive the client key for `req` under `policy`.
pub fn extract_client_key<B>(
    req: &Request<B>,
    policy: IdentityPolicy,
) -> Result<ClientKey, AddressParseError> {
    if policy == IdentityPolicy::TrustProxyHeaders {
        if let Some(forwarded) = forwarded_client(req.headers()) {
            return Ok(ClientKey::new(forwarded));
        }
    }

    transport_client(req).map(ClientKey::new)
}

/// Client address announced by a reverse proxy, if any.
fn forwarded_client(headers: &HeaderMap) -> Option<&str> {
    let header_str = |name: &HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(real_ip) = header_str(&X_REAL_IP).map(str::trim) {
        if !real_ip.is_empty() {
            return Some(real_ip);
        }
    }

    header_str(&X_FORWARDED_FOR)
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
}

/// Host part of the transport peer address.
fn transport_client<B>(req: &Request<B>) -> Result<String, AddressParseError> {
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return Ok(addr.ip().to_string());
    }

    match req.extensions().get::<RemoteAddr>() {
        Some(RemoteAddr(raw)) => split_host_port(raw.trim()).map(|(host, _)| host.to_string()),
        None => Err(AddressParseError::MissingRemoteAddr),
    }
}

/// Split `host:port` or `[host]:port` into host and port.
///
/// The host is returned without brackets. The port may be empty, the host
/// may not.
pub fn split_host_port(addr: &str) -> Result<(&str, &str), AddressParseError> {
    let malformed = |reason| AddressParseError::Malformed {
        addr: addr.to_string(),
        reason,
    };

    let colon = addr.rfind(':').ok_or_else(|| malformed("missing port in address"))?;

    // Bytes before `open` / `close` are allowed to hold the brackets.
    let (host, open, close) = if let Some(rest) = addr.strip_prefix('[') {
        let end = rest.find(']').ok_or_else(|| malformed("missing ']' in address"))? + 1;
        match end + 1 {
            after if after == addr.len() => return Err(malformed("missing port in address")),
            after if after == colon => {}
            after if addr.as_bytes()[after] == b':' => {
                return Err(malformed("too many colons in address"))
            }
            _ => return Err(malformed("missing port in address")),
        }
        (&addr[1..end], 1, end + 1)
    } else {
        let host = &addr[..colon];
        if host.contains(':') {
            return Err(malformed("too many colons in address"));
        }
        (host, 0, 0)
    };

    if addr.as_bytes()[open..].contains(&b'[') {
        return Err(malformed("unexpected '[' in address"));
    }
    if addr.as_bytes()[close..].contains(&b']') {
        return Err(malformed("unexpected ']' in address"));
    }
    if host.is_empty() {
        return Err(malformed("missing host in address"));
    }

    Ok((host, &addr[colon + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(remote: Option<&str>, headers: &[(&HeaderName, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(Body::empty()).unwrap();
        if let Some(remote) = remote {
            req.extensions_mut().insert(RemoteAddr(remote.to_string()));
        }
        req
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("1.2.3.4:80").unwrap(), ("1.2.3.4", "80"));
        assert_eq!(split_host_port("[::1]:443").unwrap(), ("::1", "443"));
        assert_eq!(split_host_port("localhost:8080").unwrap(), ("localhost", "8080"));
        assert_eq!(split_host_port("1.2.3.4:").unwrap(), ("1.2.3.4", ""));
    }

    #[test]
    fn test_split_host_port_errors() {
        let reason = |addr| match split_host_port(addr) {
            Err(AddressParseError::Malformed { reason, .. }) => reason,
            other => panic!("expected malformed address, got {:?}", other),
        };

        assert_eq!(reason("1.2.3.4"), "missing port in address");
        assert_eq!(reason("::1"), "too many colons in address");
        assert_eq!(reason("[::1"), "missing ']' in address");
        assert_eq!(reason("[::1]"), "missing port in address");
        assert_eq!(reason("[::1]:80:90"), "too many colons in address");
        assert_eq!(reason("[::1]x:80"), "missing port in address");
        assert_eq!(reason("1.2]:80"), "unexpected ']' in address");
        assert_eq!(reason(":80"), "missing host in address");
    }

    #[test]
    fn test_error_display() {
        let err = split_host_port("garbage").unwrap_err();
        assert_eq!(err.to_string(), "address garbage: missing port in address");
    }

    #[test]
    fn test_transport_address_strips_port() {
        let req = request(Some("3.4.5.6:51234"), &[]);
        let key = extract_client_key(&req, IdentityPolicy::TransportOnly).unwrap();
        assert_eq!(key.as_str(), "3.4.5.6");
    }

    #[test]
    fn test_connect_info_preferred() {
        let mut req = request(Some("garbage"), &[]);
        let addr: SocketAddr = "[2001:db8::1]:9000".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));

        let key = extract_client_key(&req, IdentityPolicy::TransportOnly).unwrap();
        assert_eq!(key.as_str(), "2001:db8::1");
    }

    #[test]
    fn test_missing_remote_address() {
        let req = request(None, &[]);
        assert_eq!(
            extract_client_key(&req, IdentityPolicy::TransportOnly),
            Err(AddressParseError::MissingRemoteAddr)
        );
    }

    #[test]
    fn test_headers_ignored_without_trust() {
        let req = request(Some("10.0.0.1:1234"), &[(&X_REAL_IP, "9.9.9.9")]);
        let key = extract_client_key(&req, IdentityPolicy::TransportOnly).unwrap();
        assert_eq!(key.as_str(), "10.0.0.1");
    }

    #[test]
    fn test_real_ip_takes_precedence() {
        let req = request(
            Some("10.0.0.1:1234"),
            &[(&X_REAL_IP, "  9.9.9.9 "), (&X_FORWARDED_FOR, "8.8.8.8")],
        );
        let key = extract_client_key(&req, IdentityPolicy::TrustProxyHeaders).unwrap();
        assert_eq!(key.as_str(), "9.9.9.9");
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let req = request(
            Some("10.0.0.1:1234"),
            &[(&X_REAL_IP, "   "), (&X_FORWARDED_FOR, " 8.8.8.8 , 10.0.0.2")],
        );
        let key = extract_client_key(&req, IdentityPolicy::TrustProxyHeaders).unwrap();
        assert_eq!(key.as_str(), "8.8.8.8");
    }

    #[test]
    fn test_empty_forwarded_for_falls_back() {
        let req = request(Some("10.0.0.1:1234"), &[(&X_FORWARDED_FOR, " , 8.8.8.8")]);
        let key = extract_client_key(&req, IdentityPolicy::TrustProxyHeaders).unwrap();
        assert_eq!(key.as_str(), "10.0.0.1");
    }

    #[test]
    fn test_header_overrides_malformed_transport() {
        let req = request(Some("garbage"), &[(&X_FORWARDED_FOR, "8.8.8.8")]);
        let key = extract_client_key(&req, IdentityPolicy::TrustProxyHeaders).unwrap();
        assert_eq!(key.as_str(), "8.8.8.8");
    }

    #[test]
    fn test_malformed_transport_fails() {
        let req = request(Some("garbage"), &[]);
        assert!(matches!(
            extract_client_key(&req, IdentityPolicy::TrustProxyHeaders),
            Err(AddressParseError::Malformed { .. })
        ));
    }
}
