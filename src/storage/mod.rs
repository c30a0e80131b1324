//! Storage provider abstraction.
//!
//! All durable state for the organizer lives in the remote store's
//! file/folder graph; this module defines the capability surface the
//! pipelines consume. [`drive`] talks to the Google Drive v3 REST API;
//! [`memory`] backs tests and dry runs.

pub mod drive;
pub mod memory;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::StorageConfig;
use crate::models::{Folder, RemoteFile};

/// MIME type marking a folder in Drive-style stores.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// A file listing filter: MIME alternation, parent containment, trashed
/// exclusion. Backends render this into their native query syntax.
#[derive(Debug, Clone, Default)]
pub struct FileQuery {
    /// Match any of these MIME types; empty means any.
    pub mime_types: Vec<String>,
    /// Restrict to children of this folder.
    pub parent: Option<String>,
    /// Trashed items are excluded unless set.
    pub include_trashed: bool,
}

impl FileQuery {
    pub fn with_mime_types<I, S>(mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mime_types: mime_types.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn children_of(folder_id: &str) -> Self {
        Self {
            parent: Some(folder_id.to_string()),
            ..Default::default()
        }
    }
}

/// Remote file store capability.
#[async_trait]
pub trait Storage: Send + Sync {
    /// List non-folder files matching the query.
    async fn list_files(&self, query: &FileQuery) -> Result<Vec<RemoteFile>>;

    /// List all non-trashed folders.
    async fn list_folders(&self) -> Result<Vec<Folder>>;

    /// Download a file's raw bytes.
    async fn get_content(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Create a folder with the given display name.
    async fn create_folder(&self, name: &str) -> Result<Folder>;

    /// Reparent a file: add `new_parent`, remove every id in `old_parents`.
    async fn move_file(&self, file_id: &str, new_parent: &str, old_parents: &[String])
        -> Result<()>;

    /// Whether the folder has any non-trashed children.
    async fn has_children(&self, folder_id: &str) -> Result<bool>;

    /// Delete a file or folder by id.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Instantiate the storage backend named by the configuration.
pub fn create_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    match config.provider.as_str() {
        "drive" => Ok(Arc::new(drive::DriveStorage::new(config)?)),
        "memory" => Ok(Arc::new(memory::MemoryStorage::new())),
        other => anyhow::bail!("Unknown storage provider: {}", other),
    }
}
