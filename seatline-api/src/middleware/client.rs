use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap},
};
use axum_extra::{headers::UserAgent, TypedHeader};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Provenance recorded on a hold. Never used for validity decisions.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientMeta {
    /// First `x-forwarded-for` hop, else the socket peer. Client-supplied;
    /// recorded as provenance only, never used for rate limiting.
    fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        forwarded.or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
    }
}

impl<S> FromRequestParts<S> for ClientMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user_agent = TypedHeader::<UserAgent>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|TypedHeader(ua)| ua.as_str().to_string());

        Ok(ClientMeta {
            ip_address: Self::client_ip(&parts.headers, &parts.extensions),
            user_agent,
        })
    }
}
