#![allow(dead_code)]

use std::{
    env,
    path::{Path, PathBuf},
    sync::Arc,
};

use axum::{
    Router,
    body::Body,
    http::{Request, Response, header},
};
use forum_web::{
    AppConfig, AppState, DefaultControllers, EmbeddedJsonRenderer, MemoryForum,
    MockStorageService, UploadPipeline, controllers::ControllerState, create_router,
    forum::ForumState, hooks::HookRegistry, models::UserRecord, routes::PathPattern,
    storage::StorageState, views::ViewState,
};
use uuid::Uuid;

pub const ADMIN_UID: u64 = 1;
pub const MEMBER_UID: u64 = 2;
pub const BOUNDARY: &str = "forum-test-boundary";

// --- Fixtures ---

pub fn admin() -> UserRecord {
    UserRecord {
        uid: ADMIN_UID,
        username: "Admin".to_string(),
        userslug: "admin".to_string(),
        is_admin: true,
        picture: None,
    }
}

pub fn member() -> UserRecord {
    UserRecord {
        uid: MEMBER_UID,
        username: "Member".to_string(),
        userslug: "member".to_string(),
        is_admin: false,
        picture: None,
    }
}

pub fn forum() -> MemoryForum {
    MemoryForum::new()
        .with_user(admin())
        .with_user(member())
        .with_topic(5, "my-slug")
        .with_category(3, "general-discussion")
        .with_moderator(3, MEMBER_UID)
}

/// Development config with uploads enabled and a temp dir private to the test.
pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.uploads.allow_file_uploads = true;
    config.uploads.allow_topics_thumbnail = true;
    config.uploads.temp_dir = unique_dir("forum-web-tmp");
    config
}

pub fn unique_dir(prefix: &str) -> PathBuf {
    env::temp_dir().join(format!("{prefix}-{}", Uuid::new_v4()))
}

/// A concrete request path for `pattern`, filling every parameter with "1".
pub fn sample_paths(pattern: &PathPattern) -> Vec<String> {
    pattern
        .axum_paths()
        .into_iter()
        .map(|path| {
            path.split('/')
                .map(|segment| {
                    if segment.starts_with('{') {
                        "1"
                    } else {
                        segment
                    }
                })
                .collect::<Vec<_>>()
                .join("/")
        })
        .map(|path| if path.is_empty() { "/".to_string() } else { path })
        .collect()
}

// --- App assembly ---

pub struct TestApp {
    pub router: Router,
    pub forum: Arc<MemoryForum>,
    pub storage: Arc<MockStorageService>,
    pub config: AppConfig,
}

impl TestApp {
    pub fn new(config: AppConfig) -> Self {
        Self::with_parts(config, forum(), HookRegistry::new(), MockStorageService::new())
    }

    pub fn with_parts(
        config: AppConfig,
        forum: MemoryForum,
        hooks: HookRegistry,
        storage: MockStorageService,
    ) -> Self {
        let forum = Arc::new(forum);
        let controllers =
            Arc::new(DefaultControllers::new(forum.clone(), config.clone())) as ControllerState;
        Self::with_controllers(config, forum, hooks, storage, controllers)
    }

    pub fn with_controllers(
        config: AppConfig,
        forum: Arc<MemoryForum>,
        hooks: HookRegistry,
        storage: MockStorageService,
        controllers: ControllerState,
    ) -> Self {
        let storage = Arc::new(storage);
        let uploads = Arc::new(UploadPipeline::new(
            config.uploads.clone(),
            hooks,
            storage.clone() as StorageState,
        ));

        let state = AppState {
            forum: forum.clone() as ForumState,
            controllers,
            views: Arc::new(EmbeddedJsonRenderer) as ViewState,
            uploads,
            config: config.clone(),
        };

        Self {
            router: create_router(state),
            forum,
            storage,
            config,
        }
    }

    /// Temp files still present in the upload temp dir.
    pub fn temp_files(&self) -> Vec<PathBuf> {
        list_files(&self.config.uploads.temp_dir)
    }
}

pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}

// --- Requests ---

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_as(uri: &str, uid: u64) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", uid.to_string())
        .body(Body::empty())
        .unwrap()
}

/// One part of a multipart body.
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Vec<u8>,
}

pub fn file_part(name: &str, filename: &str, content_type: &str, data: &[u8]) -> Part {
    Part {
        name: name.to_string(),
        filename: Some(filename.to_string()),
        content_type: content_type.to_string(),
        data: data.to_vec(),
    }
}

pub fn text_part(name: &str, value: &str) -> Part {
    Part {
        name: name.to_string(),
        filename: None,
        content_type: String::new(),
        data: value.as_bytes().to_vec(),
    }
}

pub fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match &part.filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: {}\r\n\r\n",
                        part.name, filename, part.content_type
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        part.name
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// A multipart POST. `uid` adds a development session; `xhr` marks it as an XHR upload.
pub fn upload(uri: &str, uid: Option<u64>, xhr: bool, parts: &[Part]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(uid) = uid {
        builder = builder.header("x-user-id", uid.to_string());
    }
    if xhr {
        builder = builder.header("x-requested-with", "XMLHttpRequest");
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}

// --- Responses ---

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
