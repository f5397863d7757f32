use crate::config::AppConfig;
use crate::storage::{Storage, StorageClient};
use crate::users::repo::{PgUserStore, UserStore};
use anyhow::Context;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        // Run migrations if present
        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migrations failed; continuing");
        }

        let storage =
            Arc::new(Storage::new(&config.storage, "us-east-1").await?) as Arc<dyn StorageClient>;
        let users = Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>;

        Ok(Self::from_parts(config, users, storage))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            config,
            users,
            storage,
        }
    }
}

#[cfg(test)]
pub use fakes::{test_config, FakeStorage, Fakes};
