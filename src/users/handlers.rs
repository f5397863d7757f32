use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{ChangePasswordRequest, RegisterForm, UpdateAccountRequest},
    repo_types::PublicUser,
    services::{AccountService, RegisterInput},
};
use crate::{
    auth::{dto::ApiResponse, extractors::AuthUser},
    error::{AppError, AppResult},
    extract::{AppJson, AppMultipart},
    media::services::{ImageKind, UploadItem},
    state::AppState,
};

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/avatar", patch(update_avatar))
        .route("/cover-image", patch(update_cover_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .route("/current-user", get(current_user))
        .route("/change-password", post(change_password))
        .route("/update-account", patch(update_account))
}

fn bad_multipart<E: std::fmt::Display>(e: E) -> AppError {
    AppError::validation(format!("Malformed multipart body: {}", e))
}

async fn read_file(field: Field<'_>) -> AppResult<UploadItem> {
    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    let body = field.bytes().await.map_err(bad_multipart)?;
    Ok(UploadItem { body, content_type })
}

async fn read_register_form(mut mp: Multipart) -> AppResult<RegisterForm> {
    let mut form = RegisterForm::default();
    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "avatar" => form.avatar = Some(read_file(field).await?),
            "coverImage" => form.cover_image = Some(read_file(field).await?),
            "fullName" => form.full_name = Some(field.text().await.map_err(bad_multipart)?),
            "email" => form.email = Some(field.text().await.map_err(bad_multipart)?),
            "username" => form.username = Some(field.text().await.map_err(bad_multipart)?),
            "password" => form.password = Some(field.text().await.map_err(bad_multipart)?),
            _ => {}
        }
    }
    Ok(form)
}

/// First file sent under `field_name`.
async fn read_single_image(mut mp: Multipart, field_name: &str) -> AppResult<UploadItem> {
    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        if field.name() == Some(field_name) {
            return read_file(field).await;
        }
    }
    Err(AppError::validation(format!("{} file is missing", field_name)))
}

#[instrument(skip_all)]
pub async fn register(
    State(accounts): State<AccountService>,
    AppMultipart(mp): AppMultipart,
) -> AppResult<(StatusCode, Json<ApiResponse<PublicUser>>)> {
    let input = RegisterInput::try_from(read_register_form(mp).await?)?;
    let user = accounts.register(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(201, user, "User created successfully")),
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn current_user(AuthUser(user): AuthUser) -> Json<ApiResponse<PublicUser>> {
    Json(ApiResponse::ok(user, "Current user fetched successfully"))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn change_password(
    State(accounts): State<AccountService>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<ChangePasswordRequest>,
) -> AppResult<Json<ApiResponse<serde_json::Value>>> {
    accounts
        .change_password(user.id, body.old_password, body.new_password)
        .await?;
    Ok(Json(ApiResponse::ok(
        serde_json::json!({}),
        "Password changed successfully",
    )))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_account(
    State(accounts): State<AccountService>,
    AuthUser(user): AuthUser,
    AppJson(body): AppJson<UpdateAccountRequest>,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    let user = accounts
        .update_account(user.id, &body.full_name, &body.email)
        .await?;
    Ok(Json(ApiResponse::ok(user, "Account details updated successfully")))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_avatar(
    State(accounts): State<AccountService>,
    AuthUser(user): AuthUser,
    AppMultipart(mp): AppMultipart,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    let item = read_single_image(mp, "avatar").await?;
    let user = accounts.update_image(user.id, ImageKind::Avatar, item).await?;
    Ok(Json(ApiResponse::ok(user, "Avatar updated successfully")))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_cover_image(
    State(accounts): State<AccountService>,
    AuthUser(user): AuthUser,
    AppMultipart(mp): AppMultipart,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    let item = read_single_image(mp, "coverImage").await?;
    let user = accounts
        .update_image(user.id, ImageKind::CoverImage, item)
        .await?;
    Ok(Json(ApiResponse::ok(user, "Cover image updated successfully")))
}
