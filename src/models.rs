//! Core data models used throughout dockeep.
//!
//! These types represent the remote files and folders the organizer moves
//! around, and the chunks and answers that flow through the retrieval
//! pipeline.

use serde::Serialize;

/// A file discovered in the remote store.
///
/// Files are never created or deleted by dockeep; they are discovered by a
/// listing query and mutated only by reparenting. A file may start out with
/// multiple parents; after a move it has exactly one.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<String>,
}

/// A destination folder in the remote store.
///
/// Folders are addressed by `id`, but matched by `key`: the trimmed,
/// lower-cased form of `name`. Keeping both fields explicit avoids
/// re-deriving the normalization at every call site: `name` is what the
/// user sees, `key` is what the matcher compares.
#[derive(Debug, Clone)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub key: String,
    pub parents: Vec<String>,
    pub trashed: bool,
}

impl Folder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let key = crate::folders::normalize_key(&name);
        Self {
            id: id.into(),
            name,
            key,
            parents: Vec::new(),
            trashed: false,
        }
    }
}

/// Summary of one classification batch run.
#[derive(Debug, Default, Serialize)]
pub struct OrganizeReport {
    pub files_found: usize,
    pub classified: usize,
    pub moved: usize,
    pub folders_created: usize,
    /// Names of files that fell back to the Uncategorized bucket.
    pub uncategorized: Vec<String>,
}

/// Summary of a duplicate-folder merge pass.
#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    pub clusters: usize,
    pub folders_merged: usize,
    pub files_moved: usize,
    /// Subfolders reparented out of duplicates before deletion.
    pub folders_moved: usize,
}

/// Summary of an empty-folder prune pass.
#[derive(Debug, Default, Serialize)]
pub struct PruneReport {
    pub folders_checked: usize,
    pub folders_deleted: usize,
}

/// A chunk retrieved from the vector index, paired with its stored metadata
/// and similarity to the query.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: serde_json::Value,
    pub score: f32,
}

/// Answer produced by the QA engine, with the chunks that informed it.
#[derive(Debug, Serialize)]
pub struct Answer {
    pub answer: String,
    pub source_documents: Vec<RetrievedChunk>,
}
