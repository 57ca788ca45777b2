//! Upload validation pipeline.
//!
//! Multipart bodies are spooled to temp files first (`read_upload_form`), then every file
//! of a batch is validated and stored concurrently by `UploadPipeline`. Temp files are
//! removed once the whole batch has settled, whatever the outcome.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Arc,
};

use axum::extract::{Multipart, multipart::Field};
use futures_util::future::join_all;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{
    config::UploadConfig,
    error::ForumError,
    hooks::{ExtensionPoint, HookRegistry},
    models::{FileField, UploadedAsset, UploadedFile},
    storage::StorageState,
};

/// MIME types accepted for avatars, category pictures and the site logo.
pub const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/pjpeg", "image/jpg", "image/gif"];

/// MIME types accepted for the favicon.
pub const FAVICON_TYPES: &[&str] = &["image/x-icon", "image/vnd.microsoft.icon"];

/// UploadKind
///
/// Which batch endpoint a request came through. Thumbnails only accept images.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadKind {
    Post,
    Thumbnail,
}

/// UploadPipeline
///
/// Validation and storage for uploaded files. Configuration, extension overrides and the
/// storage backend are injected once at construction and shared by every request.
pub struct UploadPipeline {
    config: UploadConfig,
    hooks: HookRegistry,
    storage: StorageState,
}

impl UploadPipeline {
    pub fn new(config: UploadConfig, hooks: HookRegistry, storage: StorageState) -> Self {
        Self {
            config,
            hooks,
            storage,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// upload_image
    ///
    /// A `filter:uploadImage` override replaces everything below. Otherwise uploads must
    /// be enabled and the image continues through `upload_file`.
    pub async fn upload_image(&self, image: &UploadedFile) -> Result<UploadedAsset, ForumError> {
        if self.hooks.has_listeners(ExtensionPoint::UploadImage) {
            return self.hooks.fire(ExtensionPoint::UploadImage, image).await;
        }

        if !self.config.allow_file_uploads {
            return Err(ForumError::UploadsDisabled);
        }

        self.upload_file(image).await
    }

    /// upload_file
    ///
    /// A `filter:uploadFile` override replaces everything below. Otherwise: feature flag,
    /// size ceiling, a fresh `upload-<uuid><ext>` name, then the storage backend.
    pub async fn upload_file(&self, file: &UploadedFile) -> Result<UploadedAsset, ForumError> {
        if self.hooks.has_listeners(ExtensionPoint::UploadFile) {
            return self.hooks.fire(ExtensionPoint::UploadFile, file).await;
        }

        if !self.config.allow_file_uploads {
            return Err(ForumError::UploadsDisabled);
        }

        if file.size > self.config.max_file_bytes() {
            return Err(ForumError::FileTooBig(self.config.maximum_file_size_kb));
        }

        let filename = format!("upload-{}{}", Uuid::new_v4(), file.extension());
        let url = self
            .storage
            .save_file(&filename, file.path())
            .await
            .map_err(ForumError::Storage)?;

        tracing::debug!(%filename, %url, size = file.size, "upload stored");

        Ok(UploadedAsset {
            url,
            name: file.name.clone(),
        })
    }

    /// Routes one file of a batch by its MIME type.
    async fn process(&self, kind: UploadKind, file: &UploadedFile) -> Result<UploadedAsset, ForumError> {
        match (file.is_image(), kind) {
            (true, _) => self.upload_image(file).await,
            (false, UploadKind::Post) => self.upload_file(file).await,
            (false, UploadKind::Thumbnail) => Err(ForumError::InvalidFile),
        }
    }

    /// run_batch
    ///
    /// Starts every file concurrently and waits for all of them. Results keep input
    /// order; the first failure in input order fails the batch.
    pub async fn run_batch(
        &self,
        kind: UploadKind,
        files: &[UploadedFile],
    ) -> Result<Vec<UploadedAsset>, ForumError> {
        join_all(files.iter().map(|file| self.process(kind, file)))
            .await
            .into_iter()
            .collect()
    }

    /// handle_batch
    ///
    /// Runs the batch on its own task, then removes every temp file in `spooled`.
    /// The task is detached from the request future, so a client that disconnects does
    /// not interrupt in-flight storage writes or the cleanup.
    pub async fn handle_batch(
        self: Arc<Self>,
        kind: UploadKind,
        files: Vec<UploadedFile>,
        spooled: Vec<UploadedFile>,
    ) -> Result<Vec<UploadedAsset>, ForumError> {
        let task = tokio::spawn(async move {
            let outcome = self.run_batch(kind, &files).await;
            delete_temp_files(&spooled).await;
            outcome
        });

        task.await
            .map_err(|e| ForumError::Internal(format!("upload task failed: {e}")))?
    }

    /// store_as
    ///
    /// Stores a single administrator or profile image under a fixed `filename`.
    /// A `filter:uploadImage` override takes over storage when registered.
    pub async fn store_as(
        &self,
        filename: &str,
        file: &UploadedFile,
    ) -> Result<UploadedAsset, ForumError> {
        if self.hooks.has_listeners(ExtensionPoint::UploadImage) {
            return self.hooks.fire(ExtensionPoint::UploadImage, file).await;
        }

        let url = self
            .storage
            .save_file(filename, file.path())
            .await
            .map_err(ForumError::Storage)?;

        Ok(UploadedAsset {
            url,
            name: file.name.clone(),
        })
    }
}

/// Rejects `file` unless its declared type is one of `allowed`.
pub fn ensure_type(file: &UploadedFile, allowed: &[&str]) -> Result<(), ForumError> {
    if allowed.contains(&file.mime.as_str()) {
        Ok(())
    } else {
        Err(ForumError::InvalidImageType(allowed.join(", ")))
    }
}

/// normalize_batch
///
/// A list passes through, a list of lists is flattened, a lone file is not a batch.
pub fn normalize_batch(field: FileField) -> Option<Vec<UploadedFile>> {
    match field {
        FileField::Single(_) => None,
        FileField::List(files) => Some(files),
        FileField::Nested(groups) => Some(groups.into_iter().flatten().collect()),
    }
}

/// Removes every temp file now rather than when the last handle is dropped. Failures
/// are ignored: the file may already be gone.
pub async fn delete_temp_files(files: &[UploadedFile]) {
    for file in files {
        if let Err(err) = tokio::fs::remove_file(file.path()).await {
            tracing::trace!(path = %file.path().display(), error = %err, "temp file not removed");
        }
    }
}

// --- Multipart spooling ---

/// UploadForm
///
/// A parsed multipart body: file fields spooled to disk, grouped by their base name, and
/// plain text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    files: HashMap<String, FileField>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn take_files(&mut self, name: &str) -> Option<FileField> {
        self.files.remove(name)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Every spooled file still owned by the form.
    pub fn spooled(&self) -> Vec<UploadedFile> {
        self.files
            .values()
            .flat_map(|field| field.all_files().into_iter().cloned())
            .collect()
    }
}

/// Bracket suffix of a multipart field name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldShape {
    /// `files`
    Plain,
    /// `files[]` or `files[3]`
    List,
    /// `files[0][]`
    Nested(usize),
}

fn parse_field_name(name: &str) -> (&str, FieldShape) {
    let Some(open) = name.find('[') else {
        return (name, FieldShape::Plain);
    };
    let (base, suffix) = name.split_at(open);
    let groups: Vec<&str> = suffix
        .split(']')
        .filter(|part| !part.is_empty())
        .map(|part| part.trim_start_matches('['))
        .collect();

    match groups.as_slice() {
        [outer, _inner] => (base, FieldShape::Nested(outer.parse().unwrap_or(0))),
        [outer] if suffix.matches('[').count() > 1 => {
            (base, FieldShape::Nested(outer.parse().unwrap_or(0)))
        }
        _ => (base, FieldShape::List),
    }
}

/// read_upload_form
///
/// Spools every file part of `multipart` into `temp_dir`. On failure, or when the
/// request is abandoned, the files spooled so far are dropped and their temp files go
/// with them.
pub async fn read_upload_form(
    multipart: &mut Multipart,
    temp_dir: &Path,
) -> Result<UploadForm, ForumError> {
    let mut parts: HashMap<String, Vec<(FieldShape, UploadedFile)>> = HashMap::new();
    let mut fields = HashMap::new();

    collect_parts(multipart, temp_dir, &mut parts, &mut fields).await?;

    let files = parts
        .into_iter()
        .map(|(name, entries)| (name, assemble_field(entries)))
        .collect();

    Ok(UploadForm { files, fields })
}

async fn collect_parts(
    multipart: &mut Multipart,
    temp_dir: &Path,
    parts: &mut HashMap<String, Vec<(FieldShape, UploadedFile)>>,
    fields: &mut HashMap<String, String>,
) -> Result<(), ForumError> {
    tokio::fs::create_dir_all(temp_dir).await?;

    while let Some(field) = multipart.next_field().await? {
        let raw_name = field.name().unwrap_or_default().to_string();
        let (base, shape) = parse_field_name(&raw_name);
        let base = base.to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            fields.insert(base, field.text().await?);
            continue;
        };

        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        // The guard removes the temp file if this future is dropped mid-body.
        let (out, temp) = tempfile::Builder::new()
            .prefix("upload-tmp-")
            .tempfile_in(temp_dir)?
            .into_parts();
        let size = spool(field, tokio::fs::File::from_std(out)).await?;

        parts
            .entry(base)
            .or_default()
            .push((shape, UploadedFile::new(file_name, mime, size, temp)));
    }

    Ok(())
}

async fn spool(mut field: Field<'_>, mut out: tokio::fs::File) -> Result<u64, ForumError> {
    let mut size = 0u64;

    while let Some(chunk) = field.chunk().await? {
        size += chunk.len() as u64;
        out.write_all(&chunk).await?;
    }
    out.flush().await?;

    Ok(size)
}

fn assemble_field(entries: Vec<(FieldShape, UploadedFile)>) -> FileField {
    let nested = entries
        .iter()
        .any(|(shape, _)| matches!(shape, FieldShape::Nested(_)));

    if nested {
        let mut groups: BTreeMap<usize, Vec<UploadedFile>> = BTreeMap::new();
        for (shape, file) in entries {
            let index = match shape {
                FieldShape::Nested(index) => index,
                _ => usize::MAX,
            };
            groups.entry(index).or_default().push(file);
        }
        return FileField::Nested(groups.into_values().collect());
    }

    match <[_; 1]>::try_from(entries) {
        Ok([(FieldShape::Plain, file)]) => FileField::Single(file),
        Ok([(_, file)]) => FileField::List(vec![file]),
        Err(entries) => FileField::List(entries.into_iter().map(|(_, file)| file).collect()),
    }
}
