use std::sync::Arc;

use axum::extract::FromRef;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    claims::Identity,
    cookies::{SetCookie, ACCESS_COOKIE, REFRESH_COOKIE},
    dto::{LoginRequest, TokenPair},
    jwt::TokenIssuer,
    password::verify_password_blocking,
};
use crate::{
    error::{AppError, AppResult},
    state::AppState,
    users::{
        repo::UserStore,
        repo_types::{PublicUser, User},
    },
};

/// Result of a successful login.
#[derive(Debug)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
    pub cookies: Vec<SetCookie>,
}

/// Result of a successful refresh.
#[derive(Debug)]
pub struct RefreshOutcome {
    pub tokens: TokenPair,
    pub cookies: Vec<SetCookie>,
}

/// Login, logout and refresh-token rotation over a user store.
///
/// The only server-side session state is the single refresh token stored on
/// each user record. A refresh token is accepted only if it verifies AND equals
/// the stored value, so every rotation invalidates the previous token.
#[derive(Clone)]
pub struct SessionManager {
    pub(crate) users: Arc<dyn UserStore>,
    pub(crate) tokens: TokenIssuer,
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(state: &AppState) -> Self {
        SessionManager::new(state.users.clone(), TokenIssuer::from_ref(state))
    }
}

/// Trims and lowercases; blank becomes `None`.
fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

impl SessionManager {
    pub fn new(users: Arc<dyn UserStore>, tokens: TokenIssuer) -> Self {
        Self { users, tokens }
    }

    fn issue_pair(&self, user: &User) -> AppResult<TokenPair> {
        let identity = Identity {
            id: user.id,
            email: &user.email,
            username: &user.username,
            full_name: &user.full_name,
        };
        let access_token = self.tokens.issue_access_token(&identity)?;
        let refresh_token = self.tokens.issue_refresh_token(user.id)?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn session_cookies(&self, tokens: &TokenPair) -> Vec<SetCookie> {
        vec![
            SetCookie::set(ACCESS_COOKIE, &tokens.access_token, self.tokens.access_ttl()),
            SetCookie::set(REFRESH_COOKIE, &tokens.refresh_token, self.tokens.refresh_ttl()),
        ]
    }

    /// Issues a fresh pair and makes its refresh token the only valid one.
    async fn rotate(&self, user: &User) -> AppResult<TokenPair> {
        let tokens = self.issue_pair(user)?;
        let stored = self
            .users
            .set_refresh_token(user.id, Some(&tokens.refresh_token))
            .await?;
        if !stored {
            return Err(AppError::NotFound("User does not exist".into()));
        }
        Ok(tokens)
    }

    pub async fn login(&self, req: LoginRequest) -> AppResult<LoginOutcome> {
        let username = normalize(req.username.as_deref());
        let email = normalize(req.email.as_deref());
        if username.is_none() && email.is_none() {
            return Err(AppError::validation("username or email is required"));
        }
        if req.password.is_empty() {
            return Err(AppError::validation("Password is required"));
        }

        let user = self
            .users
            .find_by_login(username.as_deref(), email.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;

        let ok = verify_password_blocking(req.password, user.password_hash.clone()).await?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::unauthorized("Invalid user credentials"));
        }

        let tokens = self.rotate(&user).await?;
        let cookies = self.session_cookies(&tokens);
        info!(user_id = %user.id, username = %user.username, "user logged in");
        Ok(LoginOutcome {
            user: user.into(),
            tokens,
            cookies,
        })
    }

    /// Clears the stored refresh token. Calling it again is a no-op.
    pub async fn logout(&self, user_id: Uuid) -> AppResult<Vec<SetCookie>> {
        if !self.users.set_refresh_token(user_id, None).await? {
            warn!(user_id = %user_id, "logout for unknown user");
        }
        info!(user_id = %user_id, "user logged out");
        Ok(vec![
            SetCookie::clear(ACCESS_COOKIE),
            SetCookie::clear(REFRESH_COOKIE),
        ])
    }

    pub async fn refresh(&self, incoming: Option<&str>) -> AppResult<RefreshOutcome> {
        let incoming = incoming
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::unauthorized("unauthorized request"))?;

        let claims = self
            .tokens
            .verify_refresh(incoming)
            .map_err(|_| AppError::unauthorized("invalid refresh token"))?;

        let user = self
            .users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| AppError::unauthorized("invalid refresh token"))?;

        if user.refresh_token.as_deref() != Some(incoming) {
            warn!(user_id = %user.id, "stale or reused refresh token");
            return Err(AppError::unauthorized("refresh token is expired or used"));
        }

        let tokens = self.rotate(&user).await?;
        let cookies = self.session_cookies(&tokens);
        info!(user_id = %user.id, "refresh token rotated");
        Ok(RefreshOutcome { tokens, cookies })
    }
}
