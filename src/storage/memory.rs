//! In-memory [`Storage`] implementation for tests and dry runs.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Also counts folder-creation
//! calls so tests can assert a category resolves to one folder exactly
//! once per run.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Folder, RemoteFile};

use super::{FileQuery, Storage};

struct StoredFile {
    file: RemoteFile,
    content: Vec<u8>,
}

pub struct MemoryStorage {
    files: RwLock<HashMap<String, StoredFile>>,
    folders: RwLock<HashMap<String, Folder>>,
    next_id: AtomicU64,
    create_folder_calls: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            folders: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            create_folder_calls: AtomicU64::new(0),
        }
    }

    fn fresh_id(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Seed a file with content, parented under `parents`.
    pub fn seed_file(
        &self,
        name: &str,
        mime_type: &str,
        parents: &[&str],
        content: &[u8],
    ) -> String {
        let id = self.fresh_id("file-");
        let file = RemoteFile {
            id: id.clone(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
        };
        self.files.write().unwrap().insert(
            id.clone(),
            StoredFile {
                file,
                content: content.to_vec(),
            },
        );
        id
    }

    /// Seed an existing top-level folder.
    pub fn seed_folder(&self, name: &str) -> String {
        let id = self.fresh_id("folder-");
        self.folders
            .write()
            .unwrap()
            .insert(id.clone(), Folder::new(id.clone(), name));
        id
    }

    /// Seed a folder nested under `parent`.
    pub fn seed_subfolder(&self, name: &str, parent: &str) -> String {
        let id = self.fresh_id("folder-");
        let mut folder = Folder::new(id.clone(), name);
        folder.parents = vec![parent.to_string()];
        self.folders.write().unwrap().insert(id.clone(), folder);
        id
    }

    /// Parents of a file, for assertions.
    pub fn file_parents(&self, file_id: &str) -> Vec<String> {
        self.files
            .read()
            .unwrap()
            .get(file_id)
            .map(|s| s.file.parents.clone())
            .unwrap_or_default()
    }

    /// Parents of a folder, for assertions.
    pub fn folder_parents(&self, folder_id: &str) -> Vec<String> {
        self.folders
            .read()
            .unwrap()
            .get(folder_id)
            .map(|f| f.parents.clone())
            .unwrap_or_default()
    }

    /// Display names of all live folders, sorted, for assertions.
    pub fn folder_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .folders
            .read()
            .unwrap()
            .values()
            .map(|f| f.name.clone())
            .collect();
        names.sort();
        names
    }

    /// How many times `create_folder` was called.
    pub fn create_folder_calls(&self) -> u64 {
        self.create_folder_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn list_files(&self, query: &FileQuery) -> Result<Vec<RemoteFile>> {
        let files = self.files.read().unwrap();
        let mut out: Vec<RemoteFile> = files
            .values()
            .filter(|s| {
                query.mime_types.is_empty() || query.mime_types.contains(&s.file.mime_type)
            })
            .filter(|s| match &query.parent {
                Some(parent) => s.file.parents.contains(parent),
                None => true,
            })
            .map(|s| s.file.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn list_folders(&self) -> Result<Vec<Folder>> {
        let folders = self.folders.read().unwrap();
        let mut out: Vec<Folder> = folders.values().filter(|f| !f.trashed).cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn get_content(&self, file_id: &str) -> Result<Vec<u8>> {
        let files = self.files.read().unwrap();
        match files.get(file_id) {
            Some(stored) => Ok(stored.content.clone()),
            None => bail!("no such file: {}", file_id),
        }
    }

    async fn create_folder(&self, name: &str) -> Result<Folder> {
        self.create_folder_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.fresh_id("folder-");
        let folder = Folder::new(id.clone(), name);
        self.folders
            .write()
            .unwrap()
            .insert(id, folder.clone());
        Ok(folder)
    }

    async fn move_file(
        &self,
        file_id: &str,
        new_parent: &str,
        old_parents: &[String],
    ) -> Result<()> {
        // Files and folders share the reparenting endpoint, like Drive.
        {
            let mut files = self.files.write().unwrap();
            if let Some(stored) = files.get_mut(file_id) {
                stored.file.parents.retain(|p| !old_parents.contains(p));
                stored.file.parents.push(new_parent.to_string());
                return Ok(());
            }
        }
        let mut folders = self.folders.write().unwrap();
        let Some(folder) = folders.get_mut(file_id) else {
            bail!("no such file: {}", file_id);
        };
        folder.parents.retain(|p| !old_parents.contains(p));
        folder.parents.push(new_parent.to_string());
        Ok(())
    }

    async fn has_children(&self, folder_id: &str) -> Result<bool> {
        let files = self.files.read().unwrap();
        if files
            .values()
            .any(|s| s.file.parents.iter().any(|p| p == folder_id))
        {
            return Ok(true);
        }
        let folders = self.folders.read().unwrap();
        Ok(folders
            .values()
            .any(|f| f.parents.iter().any(|p| p == folder_id)))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if self.folders.write().unwrap().remove(id).is_some() {
            return Ok(());
        }
        if self.files.write().unwrap().remove(id).is_some() {
            return Ok(());
        }
        bail!("no such id: {}", id)
    }
}
