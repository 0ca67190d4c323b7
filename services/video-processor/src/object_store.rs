use crate::config::S3Config;
use crate::frame_extractor::Frame;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Object store operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for object store operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The two object store operations the pipeline needs.
///
/// Neither operation retries: a failure surfaces to the caller and recovery is
/// left to the platform redelivering the event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch `bucket/key` into `local_path`, returning the number of bytes written
    async fn download(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<u64>;

    /// Write the file at `local_path` to `bucket/key`, overwriting any existing object
    async fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()>;
}

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new S3 object store
    pub async fn new(config: &S3Config) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "S3 object store initialized");

        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, local_path), fields(local_path = %local_path.display()))]
    async fn download(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<u64> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    StorageError::NotFound(format!("s3://{}/{}", bucket, key))
                } else {
                    StorageError::DownloadFailed(DisplayErrorContext(&e).to_string())
                }
            })?;

        let mut file = tokio::fs::File::create(local_path).await?;
        let body = response.body.into_async_read();
        tokio::pin!(body);
        let size_bytes = tokio::io::copy(&mut body, &mut file).await?;
        file.flush().await?;

        debug!(size_bytes, "Object downloaded from S3");

        Ok(size_bytes)
    }

    #[instrument(skip(self, local_path), fields(local_path = %local_path.display()))]
    async fn upload(&self, bucket: &str, key: &str, local_path: &Path) -> StorageResult<()> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(get_content_type(local_path))
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(DisplayErrorContext(&e).to_string()))?;

        debug!("Object uploaded to S3");

        Ok(())
    }
}

/// Get content type from a file's extension
fn get_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_lowercase();

    match extension.as_str() {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

/// Uploads extracted frames with bounded concurrency
pub struct BatchUploader {
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
}

impl BatchUploader {
    pub fn new(store: Arc<dyn ObjectStore>, concurrency: usize) -> Self {
        Self {
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Upload every frame to `bucket`, returning one result per frame.
    ///
    /// Completion order is unspecified; destination keys are unique so the
    /// uploads are independent of each other.
    #[instrument(skip(self, frames), fields(frame_count = frames.len()))]
    pub async fn upload_batch(
        &self,
        bucket: &str,
        frames: &[Frame],
    ) -> Vec<(String, StorageResult<()>)> {
        use futures::stream::{self, StreamExt};

        stream::iter(frames)
            .map(|frame| {
                let store = self.store.clone();
                async move {
                    let result = store
                        .upload(bucket, &frame.destination_key, &frame.local_path)
                        .await;
                    (frame.destination_key.clone(), result)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[test]
    fn test_get_content_type() {
        assert_eq!(get_content_type(Path::new("a/output-00.jpg")), "image/jpeg");
        assert_eq!(get_content_type(Path::new("a/output-00.JPG")), "image/jpeg");
        assert_eq!(get_content_type(Path::new("frame.png")), "image/png");
        assert_eq!(get_content_type(Path::new("clip.mp4")), "video/mp4");
        assert_eq!(get_content_type(Path::new("unknown")), "application/octet-stream");
    }

    fn frames(count: usize) -> Vec<Frame> {
        (0..count)
            .map(|i| Frame {
                sequence_index: i,
                local_path: PathBuf::from(format!("/tmp/clip/output-{:02}.jpg", i)),
                destination_key: format!("clip/output-{:02}.jpg", i),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_upload_batch_uploads_every_frame() {
        let uploaded = Arc::new(Mutex::new(Vec::new()));
        let sink = uploaded.clone();

        let mut store = MockObjectStore::new();
        store
            .expect_upload()
            .times(3)
            .returning(move |bucket, key, _| {
                sink.lock().unwrap().push(format!("{}/{}", bucket, key));
                Ok(())
            });

        let uploader = BatchUploader::new(Arc::new(store), 2);
        let results = uploader.upload_batch("videos-stage-1", &frames(3)).await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let mut keys = uploaded.lock().unwrap().clone();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "videos-stage-1/clip/output-00.jpg",
                "videos-stage-1/clip/output-01.jpg",
                "videos-stage-1/clip/output-02.jpg",
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_batch_reports_individual_failures() {
        let mut store = MockObjectStore::new();
        store.expect_upload().times(2).returning(|_, key, _| {
            if key.ends_with("01.jpg") {
                Err(StorageError::UploadFailed("throttled".to_string()))
            } else {
                Ok(())
            }
        });

        let uploader = BatchUploader::new(Arc::new(store), 1);
        let results = uploader.upload_batch("videos-stage-1", &frames(2)).await;

        let failed: Vec<_> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(key, _)| key.as_str())
            .collect();
        assert_eq!(failed, vec!["clip/output-01.jpg"]);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let uploader = BatchUploader::new(Arc::new(MockObjectStore::new()), 0);
        assert_eq!(uploader.concurrency, 1);
    }
}
