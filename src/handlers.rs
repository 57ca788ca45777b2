use std::{collections::BTreeSet, sync::Arc};

use axum::{
    Extension, Json,
    extract::{Multipart, Query, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    AppState,
    auth::CurrentUser,
    controllers::{Controller, RequestContext},
    error::ForumError,
    models::{
        CategoryPictureParams, FileField, ModeratorsResponse, ProfilePictureResponse,
        UploadedAsset, UploadedFile,
    },
    routes::{RouteIndex, RouteParams, Surface},
    uploads::{
        FAVICON_TYPES, IMAGE_TYPES, UploadForm, UploadKind, delete_temp_files, ensure_type,
        normalize_batch, read_upload_form,
    },
    views::PageHeader,
};

// --- Controllers ---

/// dispatch
///
/// Terminal handler of every controller route. JSON tables return the controller's data
/// as is; page tables render it with the controller's template and the page header
/// attached by `build_header`.
pub async fn dispatch(
    state: AppState,
    controller: Controller,
    surface: Surface,
    ctx: RequestContext,
) -> Result<Response, ForumError> {
    let data = state.controllers.handle(controller, &ctx).await?;

    match surface {
        Surface::Json => Ok(Json(data).into_response()),
        Surface::Page => {
            let header = ctx
                .header
                .clone()
                .unwrap_or_else(|| PageHeader::new(&state.config, ctx.user.clone(), false));
            let html = state.views.render(controller.template(), &data, &header)?;
            Ok(Html(html).into_response())
        }
    }
}

/// Fallback for paths no table matches.
pub async fn not_found() -> ForumError {
    ForumError::NotFound
}

// --- Batch uploads ---

/// upload_post
///
/// [Authenticated] Stores the files attached to a post. Images and other files are
/// validated separately; the response lists `{url, name}` per file, in upload order.
#[utoipa::path(
    post,
    path = "/api/post/upload",
    responses(
        (status = 200, description = "Stored files, in upload order", body = [UploadedAsset]),
        (status = 403, description = "No session"),
        (status = 500, description = "Invalid files, or the first validation error")
    )
)]
pub async fn upload_post(
    State(state): State<AppState>,
    current: CurrentUser,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    upload_batch(state, UploadKind::Post, current, &headers, multipart).await
}

/// upload_thumb
///
/// [Authenticated] Stores topic thumbnails. Only images are accepted, and only while the
/// thumbnail feature is enabled.
#[utoipa::path(
    post,
    path = "/api/topic/thumb/upload",
    responses(
        (status = 200, description = "Stored thumbnails, in upload order", body = [UploadedAsset]),
        (status = 403, description = "No session"),
        (status = 500, description = "Thumbnails disabled, invalid files, or a validation error")
    )
)]
pub async fn upload_thumb(
    State(state): State<AppState>,
    current: CurrentUser,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    upload_batch(state, UploadKind::Thumbnail, current, &headers, multipart).await
}

async fn upload_batch(
    state: AppState,
    kind: UploadKind,
    current: CurrentUser,
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let uploads = state.uploads.clone();
    let mut form = match read_upload_form(&mut multipart, &uploads.config().temp_dir).await {
        Ok(form) => form,
        Err(err) => return err.into_response(),
    };
    let spooled = form.spooled();

    if kind == UploadKind::Thumbnail && !uploads.config().allow_topics_thumbnail {
        delete_temp_files(&spooled).await;
        return batch_error(ForumError::ThumbnailsDisabled);
    }

    if current.user().is_none() {
        delete_temp_files(&spooled).await;
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "not allowed" })),
        )
            .into_response();
    }

    let Some(files) = form.take_files("files").and_then(normalize_batch) else {
        delete_temp_files(&spooled).await;
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "invalid files" })),
        )
            .into_response();
    };

    let count = files.len();
    match uploads.handle_batch(kind, files, spooled).await {
        Ok(assets) => {
            tracing::info!(uid = current.uid(), ?kind, count, "upload batch stored");
            batch_response(&assets, is_xhr(headers))
        }
        Err(err) => batch_error(err),
    }
}

fn batch_response(assets: &[UploadedAsset], xhr: bool) -> Response {
    if xhr {
        return Json(assets).into_response();
    }

    // Legacy iframe transports cannot read a JSON content type.
    match serde_json::to_string(assets) {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response(),
        Err(err) => ForumError::Internal(err.to_string()).into_response(),
    }
}

fn batch_error(err: ForumError) -> Response {
    tracing::warn!(error = %err, "upload batch failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

fn is_xhr(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("XMLHttpRequest"))
}

// --- Single image uploads ---

/// Reads one image from `field`, validates and names it with `name_file`, stores it,
/// then removes every spooled temp file whatever the outcome.
async fn upload_single(
    state: &AppState,
    multipart: &mut Multipart,
    field: &str,
    allowed: &[&str],
    name_file: impl FnOnce(&UploadForm, &UploadedFile) -> Result<String, ForumError>,
) -> Result<UploadedAsset, ForumError> {
    let mut form = read_upload_form(multipart, &state.uploads.config().temp_dir).await?;
    let spooled = form.spooled();

    let outcome = match take_single(&mut form, field) {
        Some(file) => match ensure_type(&file, allowed).and_then(|()| name_file(&form, &file)) {
            Ok(filename) => state.uploads.store_as(&filename, &file).await,
            Err(err) => Err(err),
        },
        None => Err(ForumError::InvalidData),
    };

    delete_temp_files(&spooled).await;
    outcome
}

fn take_single(form: &mut UploadForm, field: &str) -> Option<UploadedFile> {
    match form.take_files(field)? {
        FileField::Single(file) => Some(file),
        FileField::List(files) => files.into_iter().next(),
        FileField::Nested(groups) => groups.into_iter().flatten().next(),
    }
}

/// upload_user_picture
///
/// [Authenticated] Replaces the session user's profile picture.
#[utoipa::path(
    post,
    path = "/user/uploadpicture",
    responses(
        (status = 200, description = "Picture stored", body = ProfilePictureResponse),
        (status = 403, description = "No session, or user info is private")
    )
)]
pub async fn upload_user_picture(
    State(state): State<AppState>,
    current: CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<ProfilePictureResponse>, ForumError> {
    let uid = current.user().ok_or(ForumError::Forbidden)?.uid;
    let limits = state.uploads.config().clone();

    let asset = upload_single(&state, &mut multipart, "userPhoto", IMAGE_TYPES, |_, file| {
        if file.size > limits.max_profile_image_bytes() {
            return Err(ForumError::FileTooBig(limits.maximum_profile_image_size_kb));
        }
        Ok(format!("{uid}-profileimg{}", file.extension()))
    })
    .await?;

    state.forum.set_user_picture(uid, &asset.url).await?;
    tracing::info!(uid, url = %asset.url, "profile picture updated");

    Ok(Json(ProfilePictureResponse { path: asset.url }))
}

/// upload_category_picture
///
/// [Admin] Stores a category background image. The `params` form field carries the
/// category as JSON (`{"cid": 3}`).
#[utoipa::path(
    post,
    path = "/api/admin/category/uploadpicture",
    responses(
        (status = 200, description = "Stored image", body = [UploadedAsset]),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn upload_category_picture(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<UploadedAsset>>, ForumError> {
    let asset = upload_single(&state, &mut multipart, "userPhoto", IMAGE_TYPES, |form, file| {
        let params: CategoryPictureParams = form
            .field("params")
            .and_then(|raw| serde_json::from_str(raw).ok())
            .ok_or(ForumError::InvalidData)?;
        Ok(format!("category-{}{}", params.cid, file.extension()))
    })
    .await?;

    Ok(Json(vec![asset]))
}

/// upload_favicon
///
/// [Admin] Stores the site favicon.
#[utoipa::path(
    post,
    path = "/api/admin/uploadfavicon",
    responses(
        (status = 200, description = "Stored icon", body = [UploadedAsset]),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn upload_favicon(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<UploadedAsset>>, ForumError> {
    let asset = upload_single(&state, &mut multipart, "userPhoto", FAVICON_TYPES, |_, _| {
        Ok("favicon.ico".to_string())
    })
    .await?;

    Ok(Json(vec![asset]))
}

/// upload_logo
///
/// [Admin] Stores the site logo.
#[utoipa::path(
    post,
    path = "/api/admin/uploadlogo",
    responses(
        (status = 200, description = "Stored logo", body = [UploadedAsset]),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn upload_logo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<UploadedAsset>>, ForumError> {
    let asset = upload_single(&state, &mut multipart, "userPhoto", IMAGE_TYPES, |_, file| {
        Ok(format!("site-logo{}", file.extension()))
    })
    .await?;

    Ok(Json(vec![asset]))
}

// --- Helper endpoints ---

/// get_users_csv
///
/// [Admin] Exports every user as CSV.
#[utoipa::path(
    get,
    path = "/api/admin/users/csv",
    responses(
        (status = 200, description = "CSV attachment", content_type = "text/csv", body = String),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn get_users_csv(State(state): State<AppState>) -> Result<Response, ForumError> {
    let csv = state.forum.users_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=users.csv"),
        ],
        csv,
    )
        .into_response())
}

/// get_moderators
///
/// Lists the moderators of a category.
#[utoipa::path(
    get,
    path = "/api/categories/{cid}/moderators",
    params(("cid" = u64, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Moderators", body = ModeratorsResponse),
        (status = 400, description = "cid is not a number")
    )
)]
pub async fn get_moderators(
    State(state): State<AppState>,
    params: RouteParams,
) -> Result<Json<ModeratorsResponse>, ForumError> {
    let cid: u64 = params
        .get("cid")
        .and_then(|cid| cid.parse().ok())
        .ok_or(ForumError::InvalidData)?;
    let moderators = state.forum.get_moderators(cid).await?;
    Ok(Json(ModeratorsResponse { moderators }))
}

/// get_recent_posts
///
/// The twenty most recent posts visible to the session user (or to guests).
#[utoipa::path(
    get,
    path = "/api/recent/posts/{term}",
    params(("term" = Option<String>, Path, description = "day, week or month; optional")),
    responses((status = 200, description = "Recent posts, newest first"))
)]
pub async fn get_recent_posts(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<Value>>, ForumError> {
    let posts = state
        .forum
        .get_recent_posts(ctx.uid(), 0, 19, ctx.param("term"))
        .await?;
    Ok(Json(posts))
}

/// get_templates_listing
///
/// Every file below the views directory, relative to it, sorted and without duplicates.
#[utoipa::path(
    get,
    path = "/api/get_templates_listing",
    responses((status = 200, description = "Template paths", body = [String]))
)]
pub async fn get_templates_listing(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ForumError> {
    let root = &state.config.views_dir;
    let mut pending = vec![root.clone()];
    let mut templates = BTreeSet::new();

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }
            if let Ok(relative) = path.strip_prefix(root) {
                templates.insert(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }

    Ok(Json(templates.into_iter().collect()))
}

// --- Debug ---

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub method: Option<String>,
    pub path: String,
}

/// Dumps the mounted route table in registration order.
pub async fn debug_routes(Extension(index): Extension<Arc<RouteIndex>>) -> Json<Vec<Value>> {
    Json(index.routes().iter().map(|route| route.describe()).collect())
}

/// Resolves `?method=&path=` against the mounted table. The method defaults to GET.
pub async fn debug_resolve(
    Extension(index): Extension<Arc<RouteIndex>>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<Value>, ForumError> {
    let method = match query.method.as_deref() {
        Some(raw) => Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
            .map_err(|_| ForumError::InvalidData)?,
        None => Method::GET,
    };

    let resolved = index
        .resolve(&method, &query.path)
        .ok_or(ForumError::NotFound)?;

    let params: serde_json::Map<String, Value> = resolved
        .params
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    Ok(Json(json!({
        "route": resolved.route.describe(),
        "params": params,
    })))
}
