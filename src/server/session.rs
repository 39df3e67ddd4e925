use super::state::ServerState;
use crate::market::{AuthTokenValue, UserId};

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub token: AuthTokenValue,
}

impl Session {
    pub fn is_user(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }
}

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

#[derive(Debug)]
pub enum SessionExtractionError {
    AccessDenied,
    InternalError,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
            SessionExtractionError::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn extract_session_token_from_cookies(parts: &Parts) -> Option<String> {
    CookieJar::from_headers(&parts.headers)
        .get(COOKIE_SESSION_TOKEN_KEY)
        .map(|cookie| cookie.value().to_string())
}

fn extract_session_token_from_headers(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then(|| token.to_string())
}

async fn extract_session_from_request_parts(
    parts: &Parts,
    ctx: &ServerState,
) -> Result<Option<Session>, SessionExtractionError> {
    let cookie_token = extract_session_token_from_cookies(parts);
    let header_token = extract_session_token_from_headers(parts)
        .filter(|token| cookie_token.as_ref() != Some(token));
    if cookie_token.is_none() && header_token.is_none() {
        debug!("No token in cookies nor headers.");
        return Ok(None);
    }

    // A stale cookie must not hide a valid Authorization header
    for token in cookie_token.into_iter().chain(header_token) {
        let token = AuthTokenValue(token);
        match ctx.marketplace.resolve_session(&token).await {
            Ok(Some(auth_token)) => {
                debug!("Found auth token for user_id={}", auth_token.user_id);
                return Ok(Some(Session {
                    user_id: auth_token.user_id,
                    token: auth_token.value,
                }));
            }
            Ok(None) => {}
            Err(err) => {
                error!("Failed to resolve session token: {}", err);
                return Err(SessionExtractionError::InternalError);
            }
        }
    }
    warn!("Rejected unknown session token on {}", parts.uri.path());
    Ok(None)
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx)
            .await?
            .ok_or(SessionExtractionError::AccessDenied)
    }
}

impl OptionalFromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Option<Self>, Self::Rejection> {
        extract_session_from_request_parts(parts, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_header(name: &str, value: &str) -> Parts {
        let (parts, _) = Request::builder()
            .uri("/")
            .header(name, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn reads_token_from_cookie() {
        let parts = parts_with_header("cookie", "theme=dark; session_token=abc123");
        assert_eq!(
            extract_session_token_from_cookies(&parts),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn reads_raw_and_bearer_authorization() {
        let raw = parts_with_header(HEADER_SESSION_TOKEN_KEY, "abc123");
        assert_eq!(
            extract_session_token_from_headers(&raw),
            Some("abc123".to_string())
        );

        let bearer = parts_with_header(HEADER_SESSION_TOKEN_KEY, "Bearer abc123");
        assert_eq!(
            extract_session_token_from_headers(&bearer),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn no_token_anywhere() {
        let parts = parts_with_header("accept", "text/html");
        assert_eq!(extract_session_token_from_cookies(&parts), None);
        assert_eq!(extract_session_token_from_headers(&parts), None);
    }
}
