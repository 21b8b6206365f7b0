use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::{self, ResolvedToken};
use crate::error::ApiError;
use crate::state::AppState;

/// Authenticated session context injected into protected requests.
#[derive(Clone, Debug)]
pub struct AuthUser(pub ResolvedToken);

/// Token authentication middleware: resolves the bearer token against the
/// control database and attaches the joined, decrypted user context.
pub async fn token_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers)
        .or_else(|| extract_query_token(request.uri().query()))
        .ok_or_else(|| ApiError::unauthorized("Missing session token"))?;

    let pool = state.manager.control_pool().await?;
    let mut resolved = auth::resolve_token(&pool, &token)
        .await
        .ok_or_else(|| ApiError::unauthorized("Invalid session token"))?;

    if let Some(user) = resolved.usuario.as_mut() {
        auth::decrypt_user_fields(user, &state.cipher);
    }

    request.extensions_mut().insert(AuthUser(resolved));
    Ok(next.run(request).await)
}

/// Extract a bearer token from the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_str = headers
        .get("authorization")
        .or_else(|| headers.get("Authorization"))?
        .to_str()
        .ok()?;

    let token = auth_str.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Extract a `token` parameter from a raw query string
pub fn extract_query_token(query: Option<&str>) -> Option<String> {
    let query = query?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer abc123"));
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn rejects_non_bearer_and_empty_tokens() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc123"));
        assert_eq!(extract_bearer_token(&headers), None);

        headers.insert("authorization", HeaderValue::from_static("Bearer "));
        assert_eq!(extract_bearer_token(&headers), None);
    }

    #[test]
    fn extracts_token_from_query_string() {
        assert_eq!(
            extract_query_token(Some("foo=1&token=abc123")).as_deref(),
            Some("abc123")
        );
        assert_eq!(extract_query_token(Some("foo=1")), None);
        assert_eq!(extract_query_token(Some("token=")), None);
        assert_eq!(extract_query_token(None), None);
    }
}
