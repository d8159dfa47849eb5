use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::{
    auth::{jwt::JwtKeys, repo_types::User},
    error::AuthError,
    state::AppState,
};

/// Resolved identity for a request: bearer token verified and the
/// backing credential record loaded. Missing records and deactivated
/// accounts are rejected identically so a probe cannot tell them apart.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::Unauthenticated)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or(AuthError::Unauthenticated)?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|e| {
            tracing::warn!(error = %e, "token rejected");
            AuthError::Unauthenticated
        })?;

        let user = User::find_by_id(&state.db, claims.sub)
            .await?
            .filter(|u| u.is_active)
            .ok_or(AuthError::Unauthenticated)?;

        Ok(CurrentUser(user))
    }
}

/// Secondary gate layered on `CurrentUser`: admits everyone except
/// volunteers still waiting for approval.
pub struct Approved(pub User);

#[async_trait]
impl FromRequestParts<AppState> for Approved {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        user.require_approved()?;
        Ok(Approved(user))
    }
}
