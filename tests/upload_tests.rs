mod common;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    http::{Request, StatusCode, header},
};
use common::*;
use forum_web::{
    ForumError, MockStorageService,
    hooks::{ExtensionPoint, HookRegistry, UploadFilter},
    models::{UploadedAsset, UploadedFile},
};
use futures_util::{StreamExt, stream};
use tokio::time::timeout;
use tower::ServiceExt;

const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-bytes";

struct CdnFilter;

#[async_trait]
impl UploadFilter for CdnFilter {
    async fn upload(&self, file: &UploadedFile) -> Result<UploadedAsset, ForumError> {
        Ok(UploadedAsset {
            url: format!("https://cdn.example.com/{}", file.name),
            name: file.name.clone(),
        })
    }
}

fn images(names: &[&str]) -> Vec<Part> {
    names
        .iter()
        .map(|name| file_part("files[]", name, "image/png", PNG))
        .collect()
}

// --- Batch uploads ---

#[tokio::test]
async fn test_post_upload_returns_assets_in_input_order() {
    let app = TestApp::new(config());
    let parts = images(&["first.png", "second.png", "third.png"]);

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", Some(MEMBER_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let assets: Vec<UploadedAsset> = serde_json::from_value(body_json(response).await).unwrap();

    let names: Vec<&str> = assets.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["first.png", "second.png", "third.png"]);
    for asset in &assets {
        assert!(asset.url.starts_with("http://localhost:9000/mock-bucket/upload-"));
        assert!(asset.url.ends_with(".png"));
    }
    assert_eq!(app.storage.saved().len(), 3);
    assert!(app.temp_files().is_empty(), "temp files must be removed");
}

#[tokio::test]
async fn test_one_oversize_file_fails_the_batch_and_cleans_up() {
    let mut config = config();
    config.uploads.maximum_file_size_kb = 1;
    let app = TestApp::new(config);

    let mut parts = images(&["small.png"]);
    parts.push(file_part("files[]", "huge.bin", "application/octet-stream", &[0u8; 2048]));
    parts.extend(images(&["also-small.png"]));

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", Some(MEMBER_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "[[error:file-too-big, 1]]");
    assert!(app.temp_files().is_empty(), "all three temp files must be removed");
}

#[tokio::test]
async fn test_storage_failure_fails_the_batch() {
    let app = TestApp::with_parts(
        config(),
        forum(),
        HookRegistry::new(),
        MockStorageService::new_failing(),
    );

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", Some(MEMBER_UID), true, &images(&["a.png", "b.png"])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_string(response).await,
        "Mock Storage Error: Simulation requested"
    );
    assert!(app.temp_files().is_empty());
}

#[tokio::test]
async fn test_upload_without_session_is_refused() {
    let app = TestApp::new(config());

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", None, true, &images(&["a.png"])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "message": "not allowed" })
    );
    assert!(app.storage.saved().is_empty());
    assert!(app.temp_files().is_empty());
}

#[tokio::test]
async fn test_single_files_field_is_invalid() {
    let app = TestApp::new(config());
    let parts = [file_part("files", "lonely.png", "image/png", PNG)];

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", Some(MEMBER_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({ "message": "invalid files" })
    );
    assert!(app.temp_files().is_empty());
}

#[tokio::test]
async fn test_nested_file_lists_are_flattened() {
    let app = TestApp::new(config());
    let parts = [
        file_part("files[0][]", "a.png", "image/png", PNG),
        file_part("files[0][]", "b.png", "image/png", PNG),
        file_part("files[1][]", "c.png", "image/png", PNG),
    ];

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", Some(MEMBER_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let assets: Vec<UploadedAsset> = serde_json::from_value(body_json(response).await).unwrap();
    let names: Vec<&str> = assets.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["a.png", "b.png", "c.png"]);
    assert!(app.temp_files().is_empty());
}

#[tokio::test]
async fn test_legacy_upload_gets_json_as_plain_text() {
    let app = TestApp::new(config());

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", Some(MEMBER_UID), false, &images(&["a.png"])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let assets: Vec<UploadedAsset> = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].name, "a.png");
}

#[tokio::test]
async fn test_disabled_uploads_reject_files() {
    let mut config = config();
    config.uploads.allow_file_uploads = false;
    let app = TestApp::new(config);

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", Some(MEMBER_UID), true, &images(&["a.png"])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "[[error:uploads-are-disabled]]");
}

#[tokio::test]
async fn test_image_override_replaces_validation_and_storage() {
    let mut config = config();
    config.uploads.allow_file_uploads = false;
    let hooks = HookRegistry::new().with(ExtensionPoint::UploadImage, Arc::new(CdnFilter));
    let app = TestApp::with_parts(config, forum(), hooks, MockStorageService::new());

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", Some(MEMBER_UID), true, &images(&["cat.png"])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let assets: Vec<UploadedAsset> = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(assets[0].url, "https://cdn.example.com/cat.png");
    assert!(app.storage.saved().is_empty());
    assert!(app.temp_files().is_empty());
}

// --- Thumbnails ---

#[tokio::test]
async fn test_thumbnail_rejects_non_images_regardless_of_upload_flag() {
    for allow_file_uploads in [true, false] {
        let mut config = config();
        config.uploads.allow_file_uploads = allow_file_uploads;
        let app = TestApp::new(config);
        let parts = [file_part("files[]", "notes.txt", "text/plain", b"hello")];

        let response = app
            .router
            .clone()
            .oneshot(upload("/api/topic/thumb/upload", Some(MEMBER_UID), true, &parts))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(response).await, "[[error:invalid-file]]");
        assert!(app.temp_files().is_empty());
    }
}

#[tokio::test]
async fn test_thumbnails_disabled() {
    let mut config = config();
    config.uploads.allow_topics_thumbnail = false;
    let app = TestApp::new(config);

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/topic/thumb/upload", Some(MEMBER_UID), true, &images(&["a.png"])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_string(response).await,
        "[[error:topic-thumbnails-are-disabled]]"
    );
    assert!(app.temp_files().is_empty());
}

#[tokio::test]
async fn test_thumbnail_image_is_stored() {
    let app = TestApp::new(config());

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/topic/thumb/upload", Some(MEMBER_UID), true, &images(&["thumb.png"])))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.storage.saved().len(), 1);
}

// --- Profile and admin images ---

#[tokio::test]
async fn test_profile_picture_updates_the_user() {
    let app = TestApp::new(config());
    let parts = [file_part("userPhoto", "me.png", "image/png", PNG)];

    let response = app
        .router
        .clone()
        .oneshot(upload("/user/uploadpicture", Some(MEMBER_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let expected = "http://localhost:9000/mock-bucket/2-profileimg.png";
    assert_eq!(body_json(response).await, serde_json::json!({ "path": expected }));

    use forum_web::forum::ForumService;
    let user = app.forum.get_user(MEMBER_UID).await.unwrap();
    assert_eq!(user.picture.as_deref(), Some(expected));
    assert!(app.temp_files().is_empty());
}

#[tokio::test]
async fn test_profile_picture_size_limit() {
    let mut config = config();
    config.uploads.maximum_profile_image_size_kb = 1;
    let app = TestApp::new(config);
    let parts = [file_part("userPhoto", "me.png", "image/png", &[7u8; 2048])];

    let response = app
        .router
        .clone()
        .oneshot(upload("/user/uploadpicture", Some(MEMBER_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"],
        "[[error:file-too-big, 1]]"
    );
    assert!(app.storage.saved().is_empty());
    assert!(app.temp_files().is_empty());
}

#[tokio::test]
async fn test_profile_picture_requires_session() {
    let app = TestApp::new(config());
    let parts = [file_part("userPhoto", "me.png", "image/png", PNG)];

    let response = app
        .router
        .clone()
        .oneshot(upload("/user/uploadpicture", None, true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_category_picture_is_named_after_the_category() {
    let app = TestApp::new(config());
    let parts = [
        text_part("params", r#"{"cid": 3}"#),
        file_part("userPhoto", "bg.jpg", "image/jpeg", PNG),
    ];

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/admin/category/uploadpicture", Some(ADMIN_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let assets: Vec<UploadedAsset> = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(assets[0].name, "bg.jpg");
    assert_eq!(app.storage.saved(), vec!["category-3.jpg".to_string()]);
    assert!(app.temp_files().is_empty());
}

#[tokio::test]
async fn test_admin_favicon_type_is_enforced() {
    let app = TestApp::new(config());
    let parts = [file_part("userPhoto", "icon.png", "image/png", PNG)];

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/admin/uploadfavicon", Some(ADMIN_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"],
        "[[error:invalid-image-type, image/x-icon, image/vnd.microsoft.icon]]"
    );
    assert!(app.temp_files().is_empty());
}

#[tokio::test]
async fn test_admin_logo_and_favicon_names() {
    let app = TestApp::new(config());

    let logo = [file_part("userPhoto", "logo.gif", "image/gif", PNG)];
    let response = app
        .router
        .clone()
        .oneshot(upload("/api/admin/uploadlogo", Some(ADMIN_UID), true, &logo))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let favicon = [file_part("userPhoto", "site.ico", "image/x-icon", PNG)];
    let response = app
        .router
        .clone()
        .oneshot(upload("/api/admin/uploadfavicon", Some(ADMIN_UID), true, &favicon))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        app.storage.saved(),
        vec!["site-logo.gif".to_string(), "favicon.ico".to_string()]
    );
}

#[tokio::test]
async fn test_admin_uploads_refuse_members() {
    let app = TestApp::new(config());
    let parts = [file_part("userPhoto", "logo.png", "image/png", PNG)];

    let response = app
        .router
        .clone()
        .oneshot(upload("/api/admin/uploadlogo", Some(MEMBER_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.storage.saved().is_empty());
}

// --- Interrupted and oversized bodies ---

#[tokio::test]
async fn test_abandoned_upload_removes_its_temp_files() {
    let app = TestApp::new(config());

    // One complete file, then half of a second one, then the client goes quiet.
    let full = multipart_body(&images(&["first.png", "second.png"]));
    let cut = full.len() - BOUNDARY.len() - 12;
    let chunks = vec![
        Ok::<_, std::io::Error>(Bytes::copy_from_slice(&full[..cut])),
    ];
    let body = Body::from_stream(stream::iter(chunks).chain(stream::pending()));
    let request = Request::builder()
        .method("POST")
        .uri("/api/post/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header("x-user-id", MEMBER_UID.to_string())
        .body(body)
        .unwrap();

    let outcome = timeout(Duration::from_millis(300), app.router.clone().oneshot(request)).await;

    assert!(outcome.is_err(), "a stalled body must not complete");
    assert!(app.temp_files().is_empty(), "dropped uploads must not leave temp files");
    assert!(app.storage.saved().is_empty());
}

#[tokio::test]
async fn test_body_over_the_limit_is_413() {
    let mut config = config();
    config.uploads.body_limit_bytes = 512;
    let app = TestApp::new(config);

    let parts = [file_part("files[]", "big.png", "image/png", &[7u8; 4096])];
    let response = app
        .router
        .clone()
        .oneshot(upload("/api/post/upload", Some(MEMBER_UID), true, &parts))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.temp_files().is_empty());
    assert!(app.storage.saved().is_empty());
}

// --- Hook registry ---

#[test]
fn test_hook_registry_keeps_one_override_per_point() {
    let mut hooks = HookRegistry::new();
    assert!(!hooks.has_listeners(ExtensionPoint::UploadFile));

    assert!(hooks.register(ExtensionPoint::UploadFile, Arc::new(CdnFilter)).is_none());
    assert!(hooks.register(ExtensionPoint::UploadFile, Arc::new(CdnFilter)).is_some());
    hooks.register(ExtensionPoint::UploadImage, Arc::new(CdnFilter));

    assert_eq!(hooks.registered(), vec!["filter:uploadFile", "filter:uploadImage"]);
    assert!(hooks.has_listeners(ExtensionPoint::UploadImage));
}

#[tokio::test]
async fn test_firing_a_point_without_listeners_fails() {
    let hooks = HookRegistry::new().with(ExtensionPoint::UploadImage, Arc::new(CdnFilter));
    let dir = unique_dir("forum-web-hooks");
    std::fs::create_dir_all(&dir).unwrap();
    let temp = tempfile::Builder::new()
        .tempfile_in(&dir)
        .unwrap()
        .into_temp_path();
    let file = UploadedFile::new("cat.png".to_string(), "image/png".to_string(), 3, temp);

    let asset = hooks.fire(ExtensionPoint::UploadImage, &file).await.unwrap();
    assert_eq!(asset.url, "https://cdn.example.com/cat.png");
    assert!(hooks.fire(ExtensionPoint::UploadFile, &file).await.is_err());

    let _ = std::fs::remove_dir_all(&dir);
}
