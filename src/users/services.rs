use std::sync::Arc;

use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::RegisterForm,
    repo::UserStore,
    repo_types::{NewUser, PublicUser},
};
use crate::{
    auth::password::{hash_password_blocking, verify_password_blocking},
    error::{AppError, AppResult},
    media::services::{discard, upload_image, ImageKind, StoredAsset, UploadItem},
    state::AppState,
    storage::StorageClient,
};

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_password(password: &str) -> AppResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation("Password too short"));
    }
    Ok(())
}

/// Registration data whose text fields passed validation. The avatar is
/// checked after the duplicate lookup, so a taken username reports a conflict
/// even when no avatar was sent.
#[derive(Debug)]
pub struct RegisterInput {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub avatar: Option<UploadItem>,
    pub cover_image: Option<UploadItem>,
}

impl TryFrom<RegisterForm> for RegisterInput {
    type Error = AppError;

    fn try_from(form: RegisterForm) -> Result<Self, Self::Error> {
        let text = |v: Option<String>| v.map(|s| s.trim().to_string()).unwrap_or_default();
        let full_name = text(form.full_name);
        let email = text(form.email).to_lowercase();
        let username = text(form.username).to_lowercase();
        let password = form.password.unwrap_or_default();

        if full_name.is_empty() {
            return Err(AppError::validation("Full name is required"));
        }
        if email.is_empty() || username.is_empty() || password.trim().is_empty() {
            return Err(AppError::validation("All fields are required"));
        }
        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email"));
        }
        check_password(&password)?;

        Ok(Self {
            full_name,
            email,
            username,
            password,
            avatar: form.avatar,
            cover_image: form.cover_image,
        })
    }
}

/// Registration and profile maintenance.
#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserStore>,
    storage: Arc<dyn StorageClient>,
}

impl FromRef<AppState> for AccountService {
    fn from_ref(state: &AppState) -> Self {
        AccountService::new(state.users.clone(), state.storage.clone())
    }
}

impl AccountService {
    pub fn new(users: Arc<dyn UserStore>, storage: Arc<dyn StorageClient>) -> Self {
        Self { users, storage }
    }

    pub async fn register(&self, mut input: RegisterInput) -> AppResult<PublicUser> {
        if self
            .users
            .find_by_login(Some(&input.username), Some(&input.email))
            .await?
            .is_some()
        {
            warn!(username = %input.username, "username or email already registered");
            return Err(AppError::Conflict("Username or email already taken".into()));
        }
        let avatar = input
            .avatar
            .take()
            .ok_or_else(|| AppError::validation("Avatar image is required"))?;

        let mut uploaded: Vec<StoredAsset> = Vec::with_capacity(2);
        let result = self.create_with_uploads(input, avatar, &mut uploaded).await;
        if result.is_err() {
            discard(self.storage.as_ref(), &uploaded).await;
        }
        let user = result?;

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    async fn create_with_uploads(
        &self,
        input: RegisterInput,
        avatar: UploadItem,
        uploaded: &mut Vec<StoredAsset>,
    ) -> AppResult<PublicUser> {
        let avatar = upload_image(self.storage.as_ref(), ImageKind::Avatar, avatar).await?;
        uploaded.push(avatar.clone());

        let cover_image = match input.cover_image {
            Some(item) => {
                let asset = upload_image(self.storage.as_ref(), ImageKind::CoverImage, item).await?;
                uploaded.push(asset.clone());
                Some(asset.url)
            }
            None => None,
        };

        let password_hash = hash_password_blocking(input.password).await?;
        let user = self
            .users
            .create(NewUser {
                username: input.username,
                email: input.email,
                full_name: input.full_name,
                avatar: avatar.url,
                cover_image,
                password_hash,
            })
            .await?;
        Ok(user.into())
    }

    pub async fn change_password(
        &self,
        user_id: Uuid,
        old_password: String,
        new_password: String,
    ) -> AppResult<()> {
        check_password(&new_password)?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;

        if !verify_password_blocking(old_password, user.password_hash).await? {
            return Err(AppError::validation("Invalid old password"));
        }

        let hash = hash_password_blocking(new_password).await?;
        if !self.users.set_password_hash(user_id, &hash).await? {
            return Err(AppError::NotFound("User does not exist".into()));
        }
        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    pub async fn update_account(
        &self,
        user_id: Uuid,
        full_name: &str,
        email: &str,
    ) -> AppResult<PublicUser> {
        let full_name = full_name.trim();
        let email = email.trim().to_lowercase();
        if full_name.is_empty() || email.is_empty() {
            return Err(AppError::validation("All fields are required"));
        }
        if !is_valid_email(&email) {
            return Err(AppError::validation("Invalid email"));
        }

        let user = self
            .users
            .update_account(user_id, full_name, &email)
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".into()))?;
        Ok(user.into())
    }

    pub async fn update_image(
        &self,
        user_id: Uuid,
        kind: ImageKind,
        item: UploadItem,
    ) -> AppResult<PublicUser> {
        let asset = upload_image(self.storage.as_ref(), kind, item).await?;
        let updated = match kind {
            ImageKind::Avatar => self.users.set_avatar(user_id, &asset.url).await,
            ImageKind::CoverImage => self.users.set_cover_image(user_id, &asset.url).await,
        };
        match updated {
            Ok(Some(user)) => Ok(user.into()),
            Ok(None) => {
                discard(self.storage.as_ref(), &[asset]).await;
                Err(AppError::NotFound("User does not exist".into()))
            }
            Err(e) => {
                discard(self.storage.as_ref(), &[asset]).await;
                Err(e.into())
            }
        }
    }
}
