//! Request extractors: JSON bodies, client address, admin sessions

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{header::COOKIE, request::Parts, HeaderMap},
    Json,
};
use serde::de::DeserializeOwned;

use super::error::ApiError;
use crate::core::app_state::AppState;
use crate::core::error::{Error, Result};
use crate::security::Session;
use crate::storage::StorageImpl;
use crate::system::metrics::Metrics;

/// Custom JSON extractor that returns JSON error responses
pub struct JsonRequest<T>(pub T);

impl<T, S> FromRequest<S> for JsonRequest<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonRequest(value)),
            Err(rejection) => {
                let message = match rejection {
                    JsonRejection::JsonDataError(err) => format!("Invalid JSON data: {}", err.body_text()),
                    JsonRejection::JsonSyntaxError(_) => "Malformed JSON".to_string(),
                    JsonRejection::MissingJsonContentType(_) => {
                        "Missing or invalid Content-Type header. Expected 'application/json'"
                            .to_string()
                    }
                    JsonRejection::BytesRejection(_) => "Failed to read request body".to_string(),
                    _ => "Invalid JSON request".to_string(),
                };
                tracing::warn!("JSON parsing error: {}", message);
                Err(ApiError(Error::validation(message)))
            }
        }
    }
}

/// Caller address used as the rate-limit key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// First `X-Forwarded-For` hop, else the socket peer, else `"unknown"`
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>();
        Ok(ClientIp(client_ip(&parts.headers, peer)))
    }
}

/// Value of the named cookie, if the request carries it
pub fn session_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Rate-limit the caller, then require a live admin session
pub fn authorize<S: StorageImpl>(
    state: &AppState<S>,
    headers: &HeaderMap,
    client: &str,
) -> Result<Session> {
    state.limiter.check(client)?;

    let token = session_cookie(headers, &state.config.admin.cookie_name);
    state.sessions.validate(token.as_deref()).map_err(|e| {
        Metrics::global().auth_failures.inc();
        tracing::warn!("Admin request from {} rejected: {}", client, e);
        e
    })
}

/// Proof that the request carries a valid admin session
#[derive(Debug, Clone)]
pub struct AdminSession(pub Session);

impl<S: StorageImpl> FromRequestParts<AppState<S>> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>();
        let client = client_ip(&parts.headers, peer);
        Ok(AdminSession(authorize(state, &parts.headers, &client)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" 203.0.113.7 , 10.0.0.1"));
        let peer = ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(client_ip(&headers, Some(&peer)), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_peer_then_unknown() {
        let headers = HeaderMap::new();
        let peer = ConnectInfo(SocketAddr::from(([192, 168, 1, 5], 9000)));
        assert_eq!(client_ip(&headers, Some(&peer)), "192.168.1.5");
        assert_eq!(client_ip(&headers, None), "unknown");
    }

    #[test]
    fn test_session_cookie_lookup() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; admin_session=abc123; other=1"),
        );
        assert_eq!(session_cookie(&headers, "admin_session").as_deref(), Some("abc123"));
        assert_eq!(session_cookie(&headers, "missing"), None);
    }
}
