use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// 1. FileStorage Contract
/// FileStorage
///
/// The "save file, return URL" helper the upload handlers delegate persistence to.
/// Swapping the implementation (local disk, S3, the in-memory mock in tests) never
/// touches the handlers.
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Prepares the backend (creates the upload directory or bucket). Called at startup.
    async fn ensure_ready(&self) -> Result<(), String>;

    /// Copies the spooled file at `source` into permanent storage under `filename` and
    /// returns the public URL it is served from.
    async fn save_file(&self, filename: &str, source: &Path) -> Result<String, String>;
}

// 2. Local filesystem backend
/// LocalFileStorage
///
/// Stores uploads below a directory that the web server exposes at `url_prefix`.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    upload_dir: PathBuf,
    url_prefix: String,
}

impl LocalFileStorage {
    pub fn new(upload_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    async fn ensure_ready(&self) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| e.to_string())
    }

    async fn save_file(&self, filename: &str, source: &Path) -> Result<String, String> {
        let filename = sanitize_filename(filename);
        if filename.is_empty() {
            return Err("[[error:invalid-file]]".to_string());
        }

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| e.to_string())?;
        tokio::fs::copy(source, self.upload_dir.join(&filename))
            .await
            .map_err(|e| e.to_string())?;

        Ok(format!("{}/{}", self.url_prefix, filename))
    }
}

// 3. S3-compatible backend
/// S3FileStorage
///
/// Uploads through the AWS SDK. Path-style addressing keeps it compatible with MinIO
/// and other S3 gateways.
#[derive(Clone)]
pub struct S3FileStorage {
    client: s3::Client,
    bucket_name: String,
    public_url: String,
}

impl S3FileStorage {
    pub fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// CreateBucket is idempotent; an "already owned" error is not a failure here.
    async fn ensure_ready(&self) -> Result<(), String> {
        let _ = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await;
        Ok(())
    }

    async fn save_file(&self, filename: &str, source: &Path) -> Result<String, String> {
        let key = sanitize_filename(filename);
        if key.is_empty() {
            return Err("[[error:invalid-file]]".to_string());
        }

        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| e.to_string())?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        Ok(format!("{}/{}", self.public_url, key))
    }
}

/// sanitize_filename
///
/// Keeps only the final path component of a generated filename so a crafted original
/// extension can never move the file outside the upload root.
fn sanitize_filename(filename: &str) -> String {
    filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .find(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .unwrap_or_default()
        .to_string()
}

// 4. The Mock Implementation (For Tests)
/// MockStorageService
///
/// Records every saved filename instead of persisting anything, and can be told to fail
/// so handler error paths can be exercised without a real backend.
#[derive(Default)]
pub struct MockStorageService {
    /// When true, every save returns a simulated failure.
    pub should_fail: bool,
    saved: Mutex<Vec<String>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Filenames passed to `save_file`, in call order.
    pub fn saved(&self) -> Vec<String> {
        self.saved.lock().map(|saved| saved.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl FileStorage for MockStorageService {
    async fn ensure_ready(&self) -> Result<(), String> {
        Ok(())
    }

    async fn save_file(&self, filename: &str, _source: &Path) -> Result<String, String> {
        if self.should_fail {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }

        let filename = sanitize_filename(filename);
        if let Ok(mut saved) = self.saved.lock() {
            saved.push(filename.clone());
        }

        Ok(format!("http://localhost:9000/mock-bucket/{filename}"))
    }
}

/// StorageState
///
/// The shared handle to the configured storage backend.
pub type StorageState = Arc<dyn FileStorage>;
