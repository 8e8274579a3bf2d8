//! Authenticated identity of the caller.
//!
//! Authentication happens upstream. An auth layer either leaves an
//! [`AuthenticatedUser`] in the request extensions, or a trusted gateway forwards the
//! user id in the `X-User-Id` header. Requests with neither are rejected with 401.

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};

use crate::domain::ConnectionId;

/// Header carrying the user id from a trusted gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub ConnectionId);

impl AuthenticatedUser {
    pub fn id(&self) -> &ConnectionId {
        &self.0
    }

    pub fn into_id(self) -> ConnectionId {
        self.0
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(user.clone());
        }

        let Some(header) = parts.headers.get(USER_ID_HEADER) else {
            tracing::debug!("Rejecting request without identity");
            return Err(StatusCode::UNAUTHORIZED);
        };
        let raw = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;
        ConnectionId::new(raw.trim().to_string())
            .map(Self)
            .map_err(|e| {
                tracing::warn!("Invalid user id in {} header: {}", USER_ID_HEADER, e);
                StatusCode::UNAUTHORIZED
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<AuthenticatedUser, StatusCode> {
        let (mut parts, _) = request.into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_identity_from_header() {
        // テスト項目: X-User-Id ヘッダーから ID を取り出せる
        // given (前提条件):
        let request = Request::builder()
            .header("X-User-Id", "alice")
            .body(())
            .unwrap();

        // when (操作):
        let user = extract(request).await.unwrap();

        // then (期待する結果):
        assert_eq!(user.id().as_str(), "alice");
    }

    #[tokio::test]
    async fn test_identity_from_extension_takes_precedence() {
        // テスト項目: 認証レイヤーが置いた拡張がヘッダーより優先される
        // given (前提条件):
        let mut request = Request::builder()
            .header("X-User-Id", "mallory")
            .body(())
            .unwrap();
        request.extensions_mut().insert(AuthenticatedUser(
            ConnectionId::new("alice".to_string()).unwrap(),
        ));

        // when (操作):
        let user = extract(request).await.unwrap();

        // then (期待する結果):
        assert_eq!(user.id().as_str(), "alice");
    }

    #[tokio::test]
    async fn test_missing_or_blank_identity_is_unauthorized() {
        // テスト項目: ID がない、または空白のみの場合は 401
        // given (前提条件):
        let missing = Request::builder().body(()).unwrap();
        let blank = Request::builder()
            .header("X-User-Id", "   ")
            .body(())
            .unwrap();

        // when (操作):
        let missing = extract(missing).await;
        let blank = extract(blank).await;

        // then (期待する結果):
        assert_eq!(missing, Err(StatusCode::UNAUTHORIZED));
        assert_eq!(blank, Err(StatusCode::UNAUTHORIZED));
    }
}
