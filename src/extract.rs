use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    Json,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// `Json<T>` whose rejection is an [`AppError`].
#[derive(Debug)]
pub struct AppJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(AppJson(value))
    }
}

/// JSON body that may be absent. An empty body yields `None`; a non-empty
/// body must parse.
#[derive(Debug)]
pub struct OptionalJson<T>(pub Option<T>);

#[async_trait]
impl<S, T> FromRequest<S> for OptionalJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(OptionalJson(None));
        }
        let value = serde_json::from_slice(&body).map_err(|e| {
            AppError::validation(format!("Failed to parse the request body as JSON: {}", e))
        })?;
        Ok(OptionalJson(Some(value)))
    }
}

/// `Multipart` whose rejection is an [`AppError`].
pub struct AppMultipart(pub Multipart);

#[async_trait]
impl<S> FromRequest<S> for AppMultipart
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Ok(AppMultipart(Multipart::from_request(req, state).await?))
    }
}
