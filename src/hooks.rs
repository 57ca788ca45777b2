//! Named extension points that let a plugin take over upload handling.
//!
//! The registry is assembled at startup and read-only afterwards. The upload pipeline
//! asks whether an override is registered for a point and, if so, calls it in place of
//! its own validation and storage logic.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;

use crate::{
    error::ForumError,
    models::{UploadedAsset, UploadedFile},
};

/// ExtensionPoint
///
/// The filter hooks consulted by the upload pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExtensionPoint {
    /// `filter:uploadImage`: replaces image validation and storage.
    UploadImage,
    /// `filter:uploadFile`: replaces generic file validation and storage.
    UploadFile,
}

impl ExtensionPoint {
    pub fn name(self) -> &'static str {
        match self {
            Self::UploadImage => "filter:uploadImage",
            Self::UploadFile => "filter:uploadFile",
        }
    }
}

impl fmt::Display for ExtensionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// UploadFilter
///
/// An override for one of the upload extension points. It receives the spooled file and
/// is fully responsible for validating and persisting it.
#[async_trait]
pub trait UploadFilter: Send + Sync {
    async fn upload(&self, file: &UploadedFile) -> Result<UploadedAsset, ForumError>;
}

/// HookRegistry
///
/// At most one override per extension point; registering again replaces the previous one.
#[derive(Clone, Default)]
pub struct HookRegistry {
    filters: HashMap<ExtensionPoint, Arc<dyn UploadFilter>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `filter` for `point`, returning the override it replaced.
    pub fn register(
        &mut self,
        point: ExtensionPoint,
        filter: Arc<dyn UploadFilter>,
    ) -> Option<Arc<dyn UploadFilter>> {
        tracing::info!(hook = %point, "upload override registered");
        self.filters.insert(point, filter)
    }

    pub fn with(mut self, point: ExtensionPoint, filter: Arc<dyn UploadFilter>) -> Self {
        self.register(point, filter);
        self
    }

    pub fn has_listeners(&self, point: ExtensionPoint) -> bool {
        self.filters.contains_key(&point)
    }

    /// Hands `file` to the override registered for `point`.
    pub async fn fire(
        &self,
        point: ExtensionPoint,
        file: &UploadedFile,
    ) -> Result<UploadedAsset, ForumError> {
        match self.filters.get(&point) {
            Some(filter) => filter.upload(file).await,
            None => Err(ForumError::Internal(format!("no listener for {point}"))),
        }
    }

    /// Names of the points that currently carry an override, sorted.
    pub fn registered(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.filters.keys().map(|point| point.name()).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("filters", &self.registered())
            .finish()
    }
}
