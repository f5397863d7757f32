use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::StorageClient;

/// A file received from a multipart form, not yet stored.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Which slot on the user profile an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Avatar,
    CoverImage,
}

impl ImageKind {
    fn prefix(self) -> &'static str {
        match self {
            ImageKind::Avatar => "avatars",
            ImageKind::CoverImage => "covers",
        }
    }
}

/// Location of an object written to storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub key: String,
    pub url: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

pub async fn upload_image(
    storage: &dyn StorageClient,
    kind: ImageKind,
    item: UploadItem,
) -> Result<StoredAsset, AppError> {
    if item.body.is_empty() {
        return Err(AppError::validation("Uploaded file is empty"));
    }
    let ext = ext_from_mime(&item.content_type)
        .ok_or_else(|| AppError::validation("Unsupported image type"))?;

    let key = format!("users/{}/{}.{}", kind.prefix(), Uuid::new_v4(), ext);
    storage
        .put_object(&key, item.body, &item.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let url = storage.object_url(&key);
    tracing::debug!(%key, "image stored");
    Ok(StoredAsset { key, url })
}

/// Deletes objects left behind by a failed write. Errors are logged, not returned.
pub async fn discard(storage: &dyn StorageClient, assets: &[StoredAsset]) {
    for asset in assets {
        if let Err(e) = storage.delete_object(&asset.key).await {
            tracing::warn!(error = %e, key = %asset.key, "failed to discard uploaded object");
        }
    }
}

#[cfg(test)]
mod image_tests {
    use super::*;
    use crate::state::FakeStorage;

    fn png() -> UploadItem {
        UploadItem {
            body: Bytes::from_static(b"\x89PNG"),
            content_type: "image/png".into(),
        }
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn upload_returns_url_for_key() {
        let storage = FakeStorage::default();
        let asset = upload_image(&storage, ImageKind::Avatar, png()).await.unwrap();
        assert!(asset.key.starts_with("users/avatars/"));
        assert!(asset.key.ends_with(".png"));
        assert_eq!(asset.url, format!("https://fake.local/{}", asset.key));
        assert!(storage.contains(&asset.key));
    }

    #[tokio::test]
    async fn rejects_non_image_upload() {
        let storage = FakeStorage::default();
        let item = UploadItem {
            body: Bytes::from_static(b"%PDF"),
            content_type: "application/pdf".into(),
        };
        let err = upload_image(&storage, ImageKind::CoverImage, item).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn discard_removes_objects() {
        let storage = FakeStorage::default();
        let asset = upload_image(&storage, ImageKind::CoverImage, png()).await.unwrap();
        discard(&storage, std::slice::from_ref(&asset)).await;
        assert!(!storage.contains(&asset.key));
    }
}
