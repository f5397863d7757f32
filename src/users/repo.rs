use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewUser, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique index (username or email) rejected the write.
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for user records.
///
/// Every update touches a single row and is atomic on its own; callers never
/// need to hold a lock across calls.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Matches a user whose username OR email equals the given value.
    /// `None` arguments are ignored; if both are `None` nothing matches.
    async fn find_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<Option<User>>;

    async fn create(&self, new: NewUser) -> StoreResult<User>;

    /// Returns `false` if the user does not exist.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool>;

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> StoreResult<bool>;

    async fn update_account(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> StoreResult<Option<User>>;

    async fn set_avatar(&self, id: Uuid, url: &str) -> StoreResult<Option<User>>;

    async fn set_cover_image(&self, id: Uuid, url: &str) -> StoreResult<Option<User>>;
}

const USER_COLUMNS: &str = "id, username, email, full_name, avatar, cover_image, \
     password_hash, refresh_token, created_at, updated_at";

const DUPLICATE_USER: &str = "Username or email already taken";

fn map_unique(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(DUPLICATE_USER.into())
        }
        _ => StoreError::Database(err),
    }
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> StoreResult<Option<User>> {
        if username.is_none() && email.is_none() {
            return Ok(None);
        }
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE ($1::text IS NOT NULL AND username = $1)
                OR ($2::text IS NOT NULL AND email = $2)
             LIMIT 1"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email, full_name, avatar, cover_image, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.full_name)
        .bind(&new.avatar)
        .bind(&new.cover_image)
        .bind(&new.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_unique)?;
        Ok(user)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool> {
        let res = sqlx::query(
            "UPDATE users SET refresh_token = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> StoreResult<bool> {
        let res = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(hash)
        .execute(&self.db)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn update_account(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET full_name = $2, email = $3, updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(full_name)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(map_unique)?;
        Ok(user)
    }

    async fn set_avatar(&self, id: Uuid, url: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET avatar = $2, updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn set_cover_image(&self, id: Uuid, url: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET cover_image = $2, updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(url)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }
}
