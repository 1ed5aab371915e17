//! Client address extraction.

use crate::config::IpNet;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Address of the client.
///
/// The first `X-Forwarded-For` entry is only used when the peer is one of the configured
/// `trusted_proxies`; otherwise the peer address is the client. Falls back to `0.0.0.0` when
/// the server was not started with connect info, which no network allow-list should contain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

pub fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

pub fn resolve(peer: Option<IpAddr>, headers: &HeaderMap, trusted_proxies: &[IpNet]) -> IpAddr {
    match peer {
        Some(peer) if trusted_proxies.iter().any(|net| net.contains(&peer)) => {
            forwarded_for(headers).unwrap_or(peer)
        }
        Some(peer) => peer,
        None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    }
}

impl FromRequestParts<AppState> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(resolve(
            peer,
            &parts.headers,
            &state.config.trusted_proxies,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn spoofed() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers
    }

    #[test]
    fn first_forwarded_entry_wins() {
        assert_eq!(
            forwarded_for(&spoofed()),
            Some("203.0.113.7".parse().unwrap())
        );
    }

    #[test]
    fn garbage_header_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("unknown"));
        assert_eq!(forwarded_for(&headers), None);
    }

    #[test]
    fn header_from_untrusted_peer_is_ignored() {
        let peer: IpAddr = "198.51.100.4".parse().unwrap();
        assert_eq!(resolve(Some(peer), &spoofed(), &[]), peer);

        let proxies = vec!["10.0.0.0/8".parse::<IpNet>().unwrap()];
        assert_eq!(resolve(Some(peer), &spoofed(), &proxies), peer);
    }

    #[test]
    fn header_from_trusted_proxy_is_used() {
        let proxies = vec!["10.0.0.0/8".parse::<IpNet>().unwrap()];
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        assert_eq!(
            resolve(Some(proxy), &spoofed(), &proxies),
            "203.0.113.7".parse::<IpAddr>().unwrap()
        );
        assert_eq!(resolve(Some(proxy), &HeaderMap::new(), &proxies), proxy);
    }

    #[test]
    fn missing_peer_is_unspecified() {
        let proxies = vec!["0.0.0.0/0".parse::<IpNet>().unwrap()];
        assert_eq!(
            resolve(None, &spoofed(), &proxies),
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        );
    }
}
