use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use tracing::warn;

use super::{
    cookies::{read_cookie, ACCESS_COOKIE},
    services::SessionManager,
};
use crate::{
    error::{AppError, AppResult},
    users::repo_types::PublicUser,
};

/// The caller resolved from a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub PublicUser);

/// Access token from the `accessToken` cookie, else from `Authorization: Bearer`.
pub fn access_token_from(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, ACCESS_COOKIE).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|auth| {
                auth.strip_prefix("Bearer ")
                    .or_else(|| auth.strip_prefix("bearer "))
            })
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

impl SessionManager {
    /// Validates an access token and loads the user it names.
    pub async fn authorize(&self, token: Option<&str>) -> AppResult<PublicUser> {
        let token = token.ok_or_else(|| AppError::unauthorized("unauthorized request"))?;

        let claims = self.tokens.verify_access(token).map_err(|_| {
            warn!("invalid or expired access token");
            AppError::unauthorized("invalid or expired access token")
        })?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "access token for missing user");
                AppError::unauthorized("invalid access token")
            })?;

        Ok(user.into())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionManager: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionManager::from_ref(state);
        let token = access_token_from(&parts.headers);
        let user = sessions.authorize(token.as_deref()).await?;
        Ok(AuthUser(user))
    }
}
