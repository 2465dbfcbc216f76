//! Object store gateway.
//!
//! Binary assets are addressed by `(bucket, key)`. Supports both the local
//! filesystem and S3-compatible object storage.

use std::path::PathBuf;

use bytes::Bytes;

use crate::{AppError, AppResult};

/// Cache policy for processed image outputs.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=15552000, immutable";

/// Object access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acl {
    /// Readable by anyone through the CDN.
    PublicRead,
    /// Readable only with credentials.
    Private,
}

impl Acl {
    /// Canned ACL name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PublicRead => "public-read",
            Self::Private => "private",
        }
    }
}

/// Stored object metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Bucket name.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME content type.
    pub content_type: String,
    /// MD5 hash of the body, hex encoded.
    pub md5: String,
}

/// Object store backend.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload an object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        acl: Acl,
        cache_control: Option<&str>,
    ) -> AppResult<StoredObject>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> AppResult<()>;

    /// Change the ACL of an existing object.
    async fn set_acl(&self, bucket: &str, key: &str, acl: Acl) -> AppResult<()>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> AppResult<()>;
}

/// Join key segments with `/`, trimming stray separators.
#[must_use]
pub fn compose_key(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Local filesystem storage backend. Buckets are directories under `base_path`.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend.
    #[must_use]
    pub const fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn path(&self, bucket: &str, key: &str) -> PathBuf {
        self.base_path.join(bucket).join(key)
    }
}

#[async_trait::async_trait]
impl ObjectStore for LocalStorage {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        _acl: Acl,
        _cache_control: Option<&str>,
    ) -> AppResult<StoredObject> {
        let path = self.path(bucket, key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {e}")))?;

        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: body.len() as u64,
            content_type: content_type.to_string(),
            md5: md5_hex(&body),
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> AppResult<()> {
        let path = self.path(bucket, key);
        if path.exists() {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to delete file: {e}")))?;
        }
        Ok(())
    }

    async fn set_acl(&self, bucket: &str, key: &str, _acl: Acl) -> AppResult<()> {
        // The filesystem has no ACLs; only existence is checked.
        if self.path(bucket, key).exists() {
            Ok(())
        } else {
            Err(AppError::Storage(format!("No such object: {bucket}/{key}")))
        }
    }

    async fn ping(&self) -> AppResult<()> {
        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Storage(format!("Storage root unavailable: {e}")))
    }
}

/// S3-compatible object storage backend.
#[cfg(feature = "s3")]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
}

#[cfg(feature = "s3")]
impl S3Storage {
    /// Create a new S3 storage backend.
    #[must_use]
    pub fn new(endpoint: &str, region: &str, access_key_id: &str, secret_access_key: &str) -> Self {
        use aws_config::Region;
        use aws_sdk_s3::config::Credentials;

        let credentials =
            Credentials::new(access_key_id, secret_access_key, None, None, "seventv-api");

        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(endpoint)
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .behavior_version_latest()
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
        }
    }
}

#[cfg(feature = "s3")]
#[async_trait::async_trait]
impl ObjectStore for S3Storage {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
        acl: Acl,
        cache_control: Option<&str>,
    ) -> AppResult<StoredObject> {
        use aws_sdk_s3::primitives::ByteStream;
        use aws_sdk_s3::types::ObjectCannedAcl;
        use base64::Engine;

        let digest = md5::compute(&body);
        let size = body.len() as u64;

        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(acl.as_str()))
            .content_type(content_type)
            .content_md5(base64::engine::general_purpose::STANDARD.encode(digest.0))
            .body(ByteStream::from(body));
        if let Some(cache_control) = cache_control {
            request = request.cache_control(cache_control);
        }

        request
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            content_type: content_type.to_string(),
            md5: format!("{digest:x}"),
        })
    }

    async fn delete(&self, bucket: &str, key: &str) -> AppResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 delete failed: {e}")))?;

        Ok(())
    }

    async fn set_acl(&self, bucket: &str, key: &str, acl: Acl) -> AppResult<()> {
        use aws_sdk_s3::types::ObjectCannedAcl;

        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(acl.as_str()))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 put_object_acl failed: {e}")))?;

        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        self.client
            .list_buckets()
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 list_buckets failed: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_key() {
        assert_eq!(
            compose_key(&["emote", "abc", "/def/", "input.webp"]),
            "emote/abc/def/input.webp"
        );
        assert_eq!(compose_key(&["", "user"]), "user");
    }

    #[test]
    fn test_acl_names() {
        assert_eq!(Acl::PublicRead.as_str(), "public-read");
        assert_eq!(Acl::Private.as_str(), "private");
    }

    #[tokio::test]
    async fn test_local_storage_roundtrip() {
        let root = std::env::temp_dir().join(format!("seventv-store-{}", crate::IdGenerator::new().generate()));
        let store = LocalStorage::new(root.clone());

        let stored = store
            .put("internal", "emote/a/input.png", Bytes::from_static(b"png"), "image/png", Acl::Private, None)
            .await
            .unwrap();
        assert_eq!(stored.size, 3);
        assert!(store.set_acl("internal", "emote/a/input.png", Acl::PublicRead).await.is_ok());

        store.delete("internal", "emote/a/input.png").await.unwrap();
        assert!(store.set_acl("internal", "emote/a/input.png", Acl::Private).await.is_err());

        tokio::fs::remove_dir_all(root).await.ok();
    }
}
