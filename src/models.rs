use std::{path::Path, sync::Arc};

use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Forum identities ---

/// UserRecord
///
/// The slice of a forum user this layer needs: identity for sessions, the slug for
/// account routes and the admin flag for authorization.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct UserRecord {
    pub uid: u64,
    pub username: String,
    pub userslug: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

// --- Upload schemas ---

/// UploadedFile
///
/// Transient descriptor for one file of a multipart body, spooled to a temp file.
/// Clones share the temp file; it is removed when the last clone is dropped, so an
/// abandoned request cannot leave it behind.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original client-side file name, including its extension.
    pub name: String,
    pub size: u64,
    /// Declared MIME type (e.g. "image/png").
    pub mime: String,
    temp: Arc<TempPath>,
}

impl UploadedFile {
    pub fn new(name: String, mime: String, size: u64, temp: TempPath) -> Self {
        Self {
            name,
            size,
            mime,
            temp: Arc::new(temp),
        }
    }

    /// Location of the spooled bytes.
    pub fn path(&self) -> &Path {
        &self.temp
    }

    pub fn is_image(&self) -> bool {
        // Matches the "image" prefix followed by any subtype character.
        self.mime
            .strip_prefix("image")
            .is_some_and(|rest| !rest.is_empty())
    }

    /// Extension of the original name including the leading dot, or "" if none.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(std::ffi::OsStr::to_str)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default()
    }
}

/// FileField
///
/// Shape of the `files` form field as the client sent it. Browsers send a single file,
/// a list (`files[]`) or, from some legacy widgets, a list of lists (`files[0][]`).
#[derive(Debug, Clone)]
pub enum FileField {
    Single(UploadedFile),
    List(Vec<UploadedFile>),
    Nested(Vec<Vec<UploadedFile>>),
}

impl FileField {
    /// Every spooled file, regardless of shape.
    pub fn all_files(&self) -> Vec<&UploadedFile> {
        match self {
            Self::Single(file) => vec![file],
            Self::List(files) => files.iter().collect(),
            Self::Nested(groups) => groups.iter().flatten().collect(),
        }
    }
}

/// UploadedAsset
///
/// Output schema for one stored upload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct UploadedAsset {
    /// Public URL of the stored file.
    #[schema(example = "/uploads/files/upload-5b0c7e2c.png")]
    pub url: String,
    /// The client's original file name.
    #[schema(example = "diagram.png")]
    pub name: String,
}

/// ProfilePictureResponse
///
/// Output schema for `POST /user/uploadpicture`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ProfilePictureResponse {
    pub path: String,
}

/// CategoryPictureParams
///
/// JSON carried in the `params` form field of a category picture upload.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CategoryPictureParams {
    pub cid: u64,
}

// --- Helper endpoint schemas ---

/// ModeratorsResponse
///
/// Output schema for `GET /api/categories/{cid}/moderators`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ModeratorsResponse {
    pub moderators: Vec<UserRecord>,
}
