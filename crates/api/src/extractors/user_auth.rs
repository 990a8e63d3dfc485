//! Caller extractors.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::models::Account;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::user_auth::{bearer_token, AuthenticatedUser};

/// Authenticated caller.
///
/// Reuses the identity stored by `require_user_auth` when the route is
/// layered with it, otherwise validates the Bearer token itself.
#[derive(Debug, Clone)]
pub struct UserAuth(pub Account);

#[async_trait]
impl FromRequestParts<AppState> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(UserAuth(auth.account.clone()));
        }

        let auth = AuthenticatedUser::from_headers(&state.jwt, &parts.headers)?;
        Ok(UserAuth(auth.account))
    }
}

/// Optional caller for routes that also serve anonymous readers.
///
/// A missing header or an anonymous session yields `None`. A token that is
/// present but invalid is still rejected.
#[derive(Debug, Clone)]
pub struct OptionalUserAuth(pub Option<Account>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalUserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<AuthenticatedUser>() {
            return Ok(OptionalUserAuth(Some(auth.account.clone())));
        }

        let Some(token) = bearer_token(&parts.headers) else {
            return Ok(OptionalUserAuth(None));
        };

        match AuthenticatedUser::validate(&state.jwt, token) {
            Ok(auth) => Ok(OptionalUserAuth(Some(auth.account))),
            Err(crate::middleware::user_auth::AuthError::Anonymous) => Ok(OptionalUserAuth(None)),
            Err(err) => Err(err.into()),
        }
    }
}
