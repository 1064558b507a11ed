use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use super::jwt::{JwtKeys, TokenError};
use crate::error::AppError;

const BEARER_PREFIX: &str = "Bearer ";

/// Verified user id bound to a single request by [`require_identity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity(pub Uuid);

fn token_rejection(err: TokenError) -> AppError {
    match err {
        TokenError::Expired => AppError::unauthorized("token_expired", "Token has expired"),
        TokenError::SignatureMismatch => {
            AppError::unauthorized("invalid_signature", "Token signature is invalid")
        }
        TokenError::IssuerMismatch => {
            AppError::unauthorized("invalid_issuer", "Token issuer is not accepted")
        }
        TokenError::Malformed | TokenError::EmptySubject => {
            AppError::unauthorized("invalid_token", "Token is invalid")
        }
    }
}

/// Turn a raw `Authorization` header into a verified identity.
pub fn identify(keys: &JwtKeys, header: Option<&HeaderValue>) -> Result<Identity, AppError> {
    let header = header
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::unauthorized("missing_authorization", "Authorization header is missing")
        })?;

    // Exact, case-sensitive scheme with a single space.
    let token = header.strip_prefix(BEARER_PREFIX).ok_or_else(|| {
        AppError::unauthorized(
            "invalid_token_format",
            "Token must be in format: Bearer <token>",
        )
    })?;

    if token.is_empty() {
        return Err(AppError::unauthorized("empty_token", "Token cannot be empty"));
    }

    let claims = keys.verify(token).map_err(token_rejection)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .ok()
        .filter(|id| !id.is_nil())
        .ok_or_else(|| token_rejection(TokenError::Malformed))?;

    Ok(Identity(user_id))
}

/// Middleware gating protected routes: rejects with 401 or binds [`Identity`].
pub async fn require_identity(
    State(keys): State<JwtKeys>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match identify(&keys, request.headers().get(AUTHORIZATION)) {
        Ok(identity) => {
            debug!(user_id = %identity.0, "request authenticated");
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        Err(err) => {
            warn!(
                code = err.code(),
                path = %request.uri().path(),
                "authentication failed"
            );
            Err(err)
        }
    }
}

/// Handler-side access to the identity bound by [`require_identity`].
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .map(|identity| AuthUser(identity.0))
            .ok_or_else(|| {
                AppError::unauthorized("authentication_required", "User not authenticated")
            })
    }
}
