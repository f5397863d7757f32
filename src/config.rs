use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    /// Base URL used when handing object links to clients. Defaults to `{endpoint}/{bucket}`.
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
}

/// Upper bound for either token lifetime: one year.
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

/// Unset falls back to `default`; a value that is set must parse.
fn minutes_from_env(key: &str, default: i64) -> anyhow::Result<i64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .with_context(|| format!("{} must be a whole number of minutes, got {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;

        let jwt = JwtConfig {
            access_secret: std::env::var("ACCESS_TOKEN_SECRET").context("ACCESS_TOKEN_SECRET")?,
            refresh_secret: std::env::var("REFRESH_TOKEN_SECRET")
                .context("REFRESH_TOKEN_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "vidtube".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "vidtube-users".into()),
            access_ttl_minutes: minutes_from_env("ACCESS_TOKEN_TTL_MINUTES", 60)?,
            refresh_ttl_minutes: minutes_from_env("REFRESH_TOKEN_TTL_MINUTES", 60 * 24 * 14)?,
        };
        jwt.validate()?;

        let endpoint = std::env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT")?;
        let bucket = std::env::var("MINIO_BUCKET").context("MINIO_BUCKET")?;
        let public_url = std::env::var("MINIO_PUBLIC_URL")
            .unwrap_or_else(|_| format!("{}/{}", endpoint.trim_end_matches('/'), bucket));
        let storage = StorageConfig {
            access_key: std::env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY")?,
            secret_key: std::env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY")?,
            endpoint,
            bucket,
            public_url,
        };

        Ok(Self {
            database_url,
            jwt,
            storage,
        })
    }
}

impl JwtConfig {
    /// Access and refresh tokens must not share a signing secret, and both
    /// lifetimes must lie in `1..=MAX_TTL_MINUTES`.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.access_secret.is_empty(), "access token secret is empty");
        anyhow::ensure!(!self.refresh_secret.is_empty(), "refresh token secret is empty");
        anyhow::ensure!(
            self.access_secret != self.refresh_secret,
            "access and refresh token secrets must differ"
        );
        for (name, ttl) in [
            ("access", self.access_ttl_minutes),
            ("refresh", self.refresh_ttl_minutes),
        ] {
            anyhow::ensure!(
                (1..=MAX_TTL_MINUTES).contains(&ttl),
                "{} token lifetime must be between 1 and {} minutes, got {}",
                name,
                MAX_TTL_MINUTES,
                ttl
            );
        }
        Ok(())
    }
}
