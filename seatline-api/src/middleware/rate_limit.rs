use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use std::net::{IpAddr, SocketAddr};

use crate::state::AppState;

/// Address the limiter counts against: the socket peer, or the first
/// `x-forwarded-for` hop when the peer is a trusted proxy.
pub(crate) fn limiter_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trusted_proxies: &[IpAddr],
) -> Option<IpAddr> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())?;

    if !trusted_proxies.contains(&peer) {
        return Some(peer);
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok());

    Some(forwarded.unwrap_or(peer))
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(next.run(req).await);
    };

    let ip = limiter_ip(req.headers(), req.extensions(), &state.rate_limit.trusted_proxies)
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let key = format!("ratelimit:{}", ip);

    match redis.check_rate_limit(&key, state.rate_limit.requests, state.rate_limit.window_seconds).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded")),
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, letting request through: {}", e);
            Ok(next.run(req).await)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn from_peer(ip: [u8; 4]) -> Extensions {
        let mut ext = Extensions::new();
        ext.insert(ConnectInfo(SocketAddr::from((ip, 40123))));
        ext
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn spoofed_forwarded_for_is_ignored_from_untrusted_peer() {
        let peer = from_peer([198, 51, 100, 7]);
        let first = limiter_ip(&forwarded("1.1.1.1"), &peer, &[]);
        let second = limiter_ip(&forwarded("2.2.2.2"), &peer, &[]);

        assert_eq!(first, Some(IpAddr::from([198, 51, 100, 7])));
        assert_eq!(first, second);
    }

    #[test]
    fn trusted_proxy_names_the_client() {
        let proxy = IpAddr::from([10, 0, 0, 2]);
        let peer = from_peer([10, 0, 0, 2]);

        let ip = limiter_ip(&forwarded("203.0.113.9, 10.0.0.2"), &peer, &[proxy]);
        assert_eq!(ip, Some(IpAddr::from([203, 0, 113, 9])));

        // Garbage from the proxy falls back to the proxy itself.
        let ip = limiter_ip(&forwarded("not-an-ip"), &peer, &[proxy]);
        assert_eq!(ip, Some(proxy));
    }

    #[test]
    fn no_peer_means_no_key() {
        assert_eq!(limiter_ip(&forwarded("1.1.1.1"), &Extensions::new(), &[]), None);
    }
}
