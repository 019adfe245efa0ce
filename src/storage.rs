use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::presigning::PresigningConfig;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::S3Config;

/// Lifetime of a presigned upload URL.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid presigning configuration: {0}")]
    Config(String),
    #[error("storage request failed: {0}")]
    Request(String),
}

/// StorageService
///
/// Contract for the object storage holding product images. Production talks to an
/// S3-compatible endpoint; tests use `MockStorageService`.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Creates the configured bucket if it is missing. Only called for local MinIO.
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError>;

    /// Generates a time-limited URL that lets the dashboard PUT the file directly to
    /// storage. The request must carry exactly `content_type`.
    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;
}

/// S3StorageClient
///
/// `aws-sdk-s3` client configured with static credentials and path-style addressing,
/// which MinIO requires.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub fn new(config: &S3Config) -> Self {
        let credentials = s3::config::Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "static",
        );

        let s3_config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(&config.endpoint)
            .region(s3::config::Region::new(config.region.clone()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(s3_config),
            bucket_name: config.bucket.clone(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .is_ok()
        {
            return Ok(());
        }

        self.client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        tracing::info!(bucket = %self.bucket_name, "created storage bucket");
        Ok(())
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(UPLOAD_URL_TTL)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let presigned_req = self
            .client
            .put_object()
            .bucket(&self.bucket_name)
            .key(sanitize_key(key))
            .content_type(content_type)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Request(e.to_string()))?;

        Ok(presigned_req.uri().to_string())
    }
}

/// sanitize_key
///
/// Drops empty, `.` and `..` segments so a user-supplied name cannot escape its prefix.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// product_image_key
///
/// Object key for a product image: `products/{id}/{uuid}.{ext}`. The extension comes
/// from the uploaded filename, lowercased and restricted to ASCII alphanumerics.
pub fn product_image_key(product_id: uuid::Uuid, filename: &str) -> String {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());

    sanitize_key(&format!(
        "products/{product_id}/{}.{extension}",
        uuid::Uuid::new_v4()
    ))
}

/// MockStorageService
///
/// Deterministic stand-in for tests. Returns a fake local URL, or an error when
/// `should_fail` is set.
#[derive(Clone, Default)]
pub struct MockStorageService {
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get_presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Request(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }

        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?signature=fake",
            sanitize_key(key)
        ))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
