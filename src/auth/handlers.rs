use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        cookies::{read_cookie, to_headers, REFRESH_COOKIE},
        dto::{ApiResponse, LoginRequest, LoginResponse, RefreshRequest, TokenPair},
        extractors::AuthUser,
        services::SessionManager,
    },
    error::AppResult,
    extract::{AppJson, OptionalJson},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/refresh-token", post(refresh_token))
}

#[instrument(skip_all)]
pub async fn login(
    State(sessions): State<SessionManager>,
    AppJson(payload): AppJson<LoginRequest>,
) -> AppResult<(HeaderMap, Json<ApiResponse<LoginResponse>>)> {
    let out = sessions.login(payload).await?;
    let body = LoginResponse {
        user: out.user,
        access_token: out.tokens.access_token,
        refresh_token: out.tokens.refresh_token,
    };
    Ok((
        to_headers(&out.cookies),
        Json(ApiResponse::ok(body, "User logged in successfully")),
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn logout(
    State(sessions): State<SessionManager>,
    AuthUser(user): AuthUser,
) -> AppResult<(HeaderMap, Json<ApiResponse<serde_json::Value>>)> {
    let cookies = sessions.logout(user.id).await?;
    Ok((
        to_headers(&cookies),
        Json(ApiResponse::ok(serde_json::json!({}), "User logged out successfully")),
    ))
}

#[instrument(skip_all)]
pub async fn refresh_token(
    State(sessions): State<SessionManager>,
    headers: HeaderMap,
    OptionalJson(body): OptionalJson<RefreshRequest>,
) -> AppResult<(HeaderMap, Json<ApiResponse<TokenPair>>)> {
    let incoming = read_cookie(&headers, REFRESH_COOKIE)
        .or_else(|| body.and_then(|b| b.refresh_token));
    let out = sessions.refresh(incoming.as_deref()).await?;
    Ok((
        to_headers(&out.cookies),
        Json(ApiResponse::ok(out.tokens, "Access token refreshed successfully")),
    ))
}
