use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::common::MemberId;
use crate::domains::auth::AuthorizationGate;
use crate::domains::exchanges::ExchangeError;

/// Authenticated member resolved by the gate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub member_id: MemberId,
}

/// JWT authentication middleware
///
/// Resolves the Authorization header through the gate and adds AuthUser to request extensions.
/// If no token or invalid token, request continues without AuthUser; handlers that
/// extract [`AuthUser`] reject it with 401.
pub async fn jwt_auth_middleware(
    gate: AuthorizationGate,
    mut request: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match extract_auth_user(&request, &gate) {
        Some(user) => {
            debug!(member_id = %user.member_id, "Authenticated member");
            request.extensions_mut().insert(user);
        }
        None => debug!("No valid authentication token"),
    }

    next.run(request).await
}

fn extract_auth_user(
    request: &axum::http::Request<axum::body::Body>,
    gate: &AuthorizationGate,
) -> Option<AuthUser> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    gate.resolve(header)
        .ok()
        .map(|member_id| AuthUser { member_id })
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ExchangeError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or(ExchangeError::Unauthenticated)
    }
}
