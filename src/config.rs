use std::{env, path::PathBuf};

use thiserror::Error;

/// AppConfig
///
/// Holds the application's entire configuration state. Loaded once at startup and
/// shared read-only with every request through `AppState`. Feature flags and size limits
/// for uploads live in `UploadConfig`, which is handed to the upload pipeline when it is
/// constructed rather than being read from a global store.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Development mounts the debug router and accepts x-user-id.
    pub env: Env,
    // Base path the whole application is mounted under ("" or "/forum").
    pub relative_path: String,
    pub bind_addr: String,
    // HS256 secret used to validate session tokens.
    pub session_secret: String,
    // Root of the view templates, listed by /api/get_templates_listing.
    pub views_dir: PathBuf,
    pub site_title: String,
    // When set, guests cannot see user profiles or user lists.
    pub private_user_info: bool,
    pub allow_guest_searching: bool,
    pub uploads: UploadConfig,
    pub storage: StorageConfig,
}

/// Env
///
/// Runtime context. `Development` enables the debug router and the header-based session
/// bypass; `Production` requires every secret to be set explicitly.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Env {
    Development,
    Production,
}

/// UploadConfig
///
/// Upload feature flags and limits. Sizes are expressed in kilobytes, as administrators
/// configure them.
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub allow_file_uploads: bool,
    pub allow_topics_thumbnail: bool,
    pub maximum_file_size_kb: u64,
    pub maximum_profile_image_size_kb: u64,
    // Where multipart bodies are spooled before validation.
    pub temp_dir: PathBuf,
    // Hard cap on a request body; validation against the size limits happens afterwards.
    pub body_limit_bytes: usize,
}

impl UploadConfig {
    pub fn max_file_bytes(&self) -> u64 {
        self.maximum_file_size_kb.saturating_mul(1024)
    }

    pub fn max_profile_image_bytes(&self) -> u64 {
        self.maximum_profile_image_size_kb.saturating_mul(1024)
    }
}

/// StorageConfig
///
/// Selects the backend behind the "save file, return URL" storage helper.
#[derive(Clone, Debug)]
pub enum StorageConfig {
    /// Files are copied below `upload_dir` and served from `url_prefix`.
    Local {
        upload_dir: PathBuf,
        url_prefix: String,
    },
    /// S3-compatible object storage (MinIO locally, any S3 endpoint in production).
    S3 {
        endpoint: String,
        region: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        public_url: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            allow_file_uploads: false,
            allow_topics_thumbnail: false,
            maximum_file_size_kb: 2048,
            maximum_profile_image_size_kb: 256,
            temp_dir: env::temp_dir().join("forum-uploads"),
            body_limit_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for AppConfig {
    /// default
    ///
    /// Non-panicking configuration for tests and local tinkering: development mode, no
    /// base path, local storage under the system temp directory.
    fn default() -> Self {
        Self {
            env: Env::Development,
            relative_path: String::new(),
            bind_addr: "0.0.0.0:4567".to_string(),
            session_secret: "super-secure-test-secret-value-local".to_string(),
            views_dir: PathBuf::from("public/templates"),
            site_title: "Forum".to_string(),
            private_user_info: false,
            allow_guest_searching: true,
            uploads: UploadConfig::default(),
            storage: StorageConfig::Local {
                upload_dir: env::temp_dir().join("forum-public-uploads"),
                url_prefix: "/uploads/files".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads the configuration from environment variables. Values that are only optional
    /// in development (the session secret, S3 credentials) are required in production.
    pub fn load() -> Result<Self, ConfigError> {
        let env = match var_or("APP_ENV", "development").as_str() {
            "production" => Env::Production,
            _ => Env::Development,
        };
        let defaults = Self::default();

        let session_secret = match (env, env::var("SESSION_SECRET")) {
            (_, Ok(secret)) => secret,
            (Env::Production, Err(_)) => return Err(ConfigError::Missing("SESSION_SECRET")),
            (Env::Development, Err(_)) => defaults.session_secret.clone(),
        };

        let upload_defaults = UploadConfig::default();
        let uploads = UploadConfig {
            allow_file_uploads: flag("ALLOW_FILE_UPLOADS", upload_defaults.allow_file_uploads)?,
            allow_topics_thumbnail: flag(
                "ALLOW_TOPICS_THUMBNAIL",
                upload_defaults.allow_topics_thumbnail,
            )?,
            maximum_file_size_kb: number("MAXIMUM_FILE_SIZE", upload_defaults.maximum_file_size_kb)?,
            maximum_profile_image_size_kb: number(
                "MAXIMUM_PROFILE_IMAGE_SIZE",
                upload_defaults.maximum_profile_image_size_kb,
            )?,
            temp_dir: env::var("UPLOAD_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(upload_defaults.temp_dir),
            body_limit_bytes: number("UPLOAD_BODY_LIMIT", upload_defaults.body_limit_bytes as u64)?
                as usize,
        };

        let storage = match var_or("STORAGE_BACKEND", "local").as_str() {
            "s3" => StorageConfig::S3 {
                endpoint: var_or("S3_ENDPOINT", "http://localhost:9000"),
                region: var_or("S3_REGION", "us-east-1"),
                access_key: required(env, "S3_ACCESS_KEY", "admin")?,
                secret_key: required(env, "S3_SECRET_KEY", "password")?,
                bucket: var_or("S3_BUCKET_NAME", "forum-uploads"),
                public_url: var_or("S3_PUBLIC_URL", "http://localhost:9000/forum-uploads"),
            },
            "local" => StorageConfig::Local {
                upload_dir: PathBuf::from(var_or("UPLOAD_DIR", "public/uploads/files")),
                url_prefix: var_or("UPLOAD_URL", "/uploads/files"),
            },
            other => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            env,
            relative_path: normalize_relative_path(&var_or("RELATIVE_PATH", "")),
            bind_addr: var_or("BIND_ADDR", &defaults.bind_addr),
            session_secret,
            views_dir: env::var("VIEWS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.views_dir),
            site_title: var_or("SITE_TITLE", &defaults.site_title),
            private_user_info: flag("PRIVATE_USER_INFO", defaults.private_user_info)?,
            allow_guest_searching: flag("ALLOW_GUEST_SEARCHING", defaults.allow_guest_searching)?,
            uploads,
            storage,
        })
    }

    pub fn is_development(&self) -> bool {
        self.env == Env::Development
    }
}

/// normalize_relative_path
///
/// Turns user input such as `forum/`, `/forum` or `/` into the canonical mount prefix
/// (`/forum`, or the empty string for the root).
pub fn normalize_relative_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required(env: Env, name: &'static str, dev_default: &str) -> Result<String, ConfigError> {
    match (env, env::var(name)) {
        (_, Ok(value)) => Ok(value),
        (Env::Production, Err(_)) => Err(ConfigError::Missing(name)),
        (Env::Development, Err(_)) => Ok(dev_default.to_string()),
    }
}

fn flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Ok(value) = env::var(name) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" | "" => Ok(false),
        _ => Err(ConfigError::Invalid { var: name, value }),
    }
}

fn number(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    let Ok(value) = env::var(name) else {
        return Ok(default);
    };
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { var: name, value })
}
