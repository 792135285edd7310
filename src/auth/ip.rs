//! Client IP extraction.

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

use super::state::HasAuthState;
use crate::cli::ClientIpSource;

/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Extract the client IP from the configured source.
///
/// Header sources never fall back to the socket address: a proxy that drops
/// the header must not make every client look like the proxy itself.
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    ip_source: ClientIpSource,
) -> Result<String, &'static str> {
    let header_name = match ip_source {
        ClientIpSource::ConnectInfo => {
            return source
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
                .ok_or("No client IP available");
        }
        ClientIpSource::XForwardedFor => "x-forwarded-for",
        ClientIpSource::XRealIp => "x-real-ip",
    };

    let value = source
        .headers()
        .get(header_name)
        .ok_or("IP header not present")?
        .to_str()
        .map_err(|_| "IP header contains invalid characters")?;

    // X-Forwarded-For lists the original client first
    let first = value.split(',').next().unwrap_or_default().trim();
    first
        .parse::<IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| "IP header is not an IP address")
}

/// Client IP for logging, `None` when it cannot be determined.
pub struct ClientIp(pub Option<String>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: HasAuthState + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(
            extract_client_ip(parts, state.auth().client_ip_source).ok(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::Request;

    fn request(header: Option<(&str, &str)>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_connect_info() {
        let mut req = request(None);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4242))));
        assert_eq!(
            extract_client_ip(&req, ClientIpSource::ConnectInfo).unwrap(),
            "10.0.0.7"
        );
    }

    #[test]
    fn test_connect_info_missing() {
        assert!(extract_client_ip(&request(None), ClientIpSource::ConnectInfo).is_err());
    }

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let req = request(Some(("x-forwarded-for", "203.0.113.9, 10.0.0.1")));
        assert_eq!(
            extract_client_ip(&req, ClientIpSource::XForwardedFor).unwrap(),
            "203.0.113.9"
        );
    }

    #[test]
    fn test_real_ip() {
        let req = request(Some(("x-real-ip", "2001:db8::1")));
        assert_eq!(
            extract_client_ip(&req, ClientIpSource::XRealIp).unwrap(),
            "2001:db8::1"
        );
    }

    #[test]
    fn test_header_source_does_not_fall_back() {
        let mut req = request(None);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4242))));
        assert!(extract_client_ip(&req, ClientIpSource::XRealIp).is_err());
    }

    #[test]
    fn test_garbage_header_rejected() {
        let req = request(Some(("x-real-ip", "not-an-ip")));
        assert!(extract_client_ip(&req, ClientIpSource::XRealIp).is_err());
    }
}
