use serde::Deserialize;

use crate::media::services::UploadItem;

/// Raw registration form as it arrives over multipart. Validated into
/// [`RegisterInput`](super::services::RegisterInput) before use.
#[derive(Debug, Default)]
pub struct RegisterForm {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<UploadItem>,
    pub cover_image: Option<UploadItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}
