use axum::extract::{ConnectInfo, FromRef, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};
use axum_extra::extract::cookie::{Key, PrivateCookieJar};
use chrono::Utc;
use headers::{Authorization, HeaderMapExt, authorization::Bearer};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use subtle::ConstantTimeEq;

use crate::error::NexusError;
use crate::router::NexusState;

/// Encrypted session cookie set by a successful admin login.
pub const ADMIN_COOKIE: &str = "adminLoggedIn";

/// Server-side lifetime of an admin session.
pub const SESSION_MAX_AGE_SECS: i64 = 12 * 60 * 60;

/// Constant-time comparison against the configured admin key.
pub fn key_matches(candidate: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
}

/// Cookie payload: `{epoch}.{issued_at}` (unix seconds).
pub fn session_value(epoch: u64, issued_at: i64) -> String {
    format!("{epoch}.{issued_at}")
}

/// A session is live while its epoch is current and it is younger than the max age.
pub fn session_valid(value: &str, epoch: u64, now: i64) -> bool {
    let Some((e, t)) = value.split_once('.') else {
        return false;
    };
    let (Ok(e), Ok(issued_at)) = (e.parse::<u64>(), t.parse::<i64>()) else {
        return false;
    };
    e == epoch && issued_at <= now && now - issued_at < SESSION_MAX_AGE_SECS
}

/// Whether the private jar carries a live admin session.
pub fn has_admin_session(jar: &PrivateCookieJar, state: &NexusState) -> bool {
    jar.get(ADMIN_COOKIE).is_some_and(|c| {
        session_valid(c.value(), state.session_epoch(), Utc::now().timestamp())
    })
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .typed_get::<Authorization<Bearer>>()
        .map(|auth| auth.token().to_string())
}

/// Admin guard. Accepts either:
/// - a live encrypted `adminLoggedIn` session cookie
/// - Header: `Authorization: Bearer <admin key>`
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl FromRequestParts<NexusState> for RequireAdmin {
    type Rejection = NexusError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &NexusState,
    ) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::from_headers(&parts.headers, Key::from_ref(state));
        if has_admin_session(&jar, state) {
            return Ok(RequireAdmin);
        }

        match bearer_token(&parts.headers) {
            Some(token) if key_matches(&token, &state.admin_key) => Ok(RequireAdmin),
            _ => Err(NexusError::Unauthorized),
        }
    }
}

/// Peer address when the server was started with connect info; unspecified otherwise.
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        Ok(ClientIp(ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn key_comparison() {
        assert!(key_matches("s3cret", "s3cret"));
        assert!(!key_matches("s3cre", "s3cret"));
        assert!(!key_matches("", ""));
    }

    #[test]
    fn bearer_token_parsed() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer s3cret"),
        );
        assert_eq!(bearer_token(&headers).as_deref(), Some("s3cret"));
    }

    #[test]
    fn sessions_expire_and_follow_the_epoch() {
        let now = 1_700_000_000;
        let value = session_value(3, now - 60);
        assert!(session_valid(&value, 3, now));
        assert!(!session_valid(&value, 4, now));
        assert!(!session_valid(&value, 3, now - 60 + SESSION_MAX_AGE_SECS));
        assert!(!session_valid("true", 3, now));
        assert!(!session_valid(&session_value(3, now + 600), 3, now));
    }
}
