//! User JWT authentication middleware.
//!
//! Access tokens are issued by the account service and carry the caller's
//! account snapshot. This module turns a validated token into a domain
//! [`Account`].

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::models::Account;
use shared::jwt::{Claims, JwtConfig};
use thiserror::Error;

use crate::app::AppState;
use crate::error::ApiError;

/// Authenticated caller stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub account: Account,
    /// JWT ID (jti) for log correlation.
    pub jti: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing or invalid Authorization header")]
    MissingToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Anonymous sessions cannot perform this operation")]
    Anonymous,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl AuthenticatedUser {
    /// Validates an access token and builds the caller's account from its claims.
    pub fn validate(jwt_config: &JwtConfig, token: &str) -> Result<Self, AuthError> {
        let claims = jwt_config.validate_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            AuthError::InvalidToken
        })?;
        Self::from_claims(claims)
    }

    fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        if claims.anonymous {
            return Err(AuthError::Anonymous);
        }
        if claims.sub.trim().is_empty() || claims.org_id.trim().is_empty() {
            return Err(AuthError::InvalidToken);
        }

        Ok(Self {
            account: Account {
                user_id: claims.sub,
                org_id: claims.org_id,
                app_id: claims.app_id,
                external_id: non_blank(claims.external_id),
                net_id: non_blank(claims.net_id),
                name: non_blank(claims.name),
                email: non_blank(claims.email),
                permissions: claims.permissions,
            },
            jti: claims.jti,
        })
    }

    /// Authenticates from request headers.
    pub fn from_headers(jwt_config: &JwtConfig, headers: &HeaderMap) -> Result<Self, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
        Self::validate(jwt_config, token)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Returns the Bearer token from the Authorization header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware that requires JWT user authentication.
///
/// Rejects requests without a valid, non-anonymous access token. The
/// authenticated caller is stored in request extensions for handlers.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match AuthenticatedUser::from_headers(&state.jwt, req.headers()) {
        Ok(auth) => {
            tracing::Span::current().record("user_id", auth.account.user_id.as_str());
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}
