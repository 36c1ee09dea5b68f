//! Client address extraction behind reverse proxies

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

/// Whether forwarding headers set by a reverse proxy are believed.
///
/// Without a trusted proxy in front, `x-real-ip` and `x-forwarded-for` are
/// client-controlled and only the socket peer counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyPolicy {
    pub trust_forwarded_headers: bool,
}

/// Best-effort client IP. Behind a trusted proxy: `x-real-ip`, then the first
/// `x-forwarded-for` hop. Then the socket peer, else `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

impl ClientIp {
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>, policy: ProxyPolicy) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let forwarded = if policy.trust_forwarded_headers {
            header("x-real-ip").or_else(|| header("x-forwarded-for"))
        } else {
            None
        };

        let ip = forwarded
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| "unknown".to_string());

        ClientIp(ip)
    }

    pub fn is_loopback(&self) -> bool {
        matches!(self.0.as_str(), "127.0.0.1" | "::1" | "::ffff:127.0.0.1" | "localhost")
    }

    /// A remote address worth geolocating or reporting
    pub fn is_known_remote(&self) -> bool {
        !self.is_loopback() && self.0 != "unknown"
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    ProxyPolicy: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Ok(ClientIp::from_parts(
            &parts.headers,
            peer,
            ProxyPolicy::from_ref(state),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const TRUSTED: ProxyPolicy = ProxyPolicy {
        trust_forwarded_headers: true,
    };

    fn forwarded_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.7"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("198.51.100.1, 10.0.0.1"),
        );
        headers
    }

    #[test]
    fn test_real_ip_header_wins_behind_trusted_proxy() {
        let peer: SocketAddr = "10.0.0.2:4000".parse().unwrap();
        assert_eq!(
            ClientIp::from_parts(&forwarded_headers(), Some(peer), TRUSTED).0,
            "203.0.113.7"
        );
    }

    #[test]
    fn test_first_forwarded_hop() {
        let mut headers = forwarded_headers();
        headers.remove("x-real-ip");

        assert_eq!(ClientIp::from_parts(&headers, None, TRUSTED).0, "198.51.100.1");
    }

    #[test]
    fn test_forwarding_headers_ignored_without_trusted_proxy() {
        let peer: SocketAddr = "198.51.100.20:5000".parse().unwrap();
        let policy = ProxyPolicy::default();

        assert_eq!(
            ClientIp::from_parts(&forwarded_headers(), Some(peer), policy).0,
            "198.51.100.20"
        );
        assert_eq!(
            ClientIp::from_parts(&forwarded_headers(), None, policy).0,
            "unknown"
        );
    }

    #[test]
    fn test_peer_then_unknown() {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let ip = ClientIp::from_parts(&HeaderMap::new(), Some(peer), TRUSTED);
        assert_eq!(ip.0, "127.0.0.1");
        assert!(ip.is_loopback());
        assert!(!ip.is_known_remote());

        let unknown = ClientIp::from_parts(&HeaderMap::new(), None, TRUSTED);
        assert_eq!(unknown.0, "unknown");
        assert!(!unknown.is_known_remote());

        assert!(ClientIp("203.0.113.7".to_string()).is_known_remote());
    }
}
