//! Batch classification and folder-reconciliation pipeline.
//!
//! One batch run walks list → classify → group → resolve → move. Grouping
//! happens on the raw category string before any fuzzy matching, so files
//! agreeing on a category are resolved together: one folder lookup or
//! creation per distinct category per run, never per file.
//!
//! Reconciling (merge near-duplicate folders) and pruning (delete empty
//! folders) are separate, explicitly invoked operations. In a full
//! maintenance cycle prune must run after reconcile; a folder mid-merge
//! would otherwise be deleted before receiving its files.
//!
//! Per-file failures degrade to the Uncategorized bucket and the batch
//! continues; folder listing/creation failures abort the batch because the
//! folder index can no longer be trusted.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use crate::classify::{Classifier, UNCATEGORIZED};
use crate::config::OrganizerConfig;
use crate::extract;
use crate::folders::{cluster_duplicates, resolve_folder, FolderIndex};
use crate::models::{OrganizeReport, PruneReport, ReconcileReport, RemoteFile};
use crate::ocr::Ocr;
use crate::storage::{FileQuery, Storage};

/// Content types eligible for organization: documents plus images.
const CANDIDATE_MIME_TYPES: [&str; 4] = [
    extract::MIME_PDF,
    extract::MIME_DOCX,
    "image/png",
    "image/jpeg",
];

pub struct Organizer {
    storage: Arc<dyn Storage>,
    classifier: Classifier,
    ocr: Box<dyn Ocr>,
    config: OrganizerConfig,
}

impl Organizer {
    pub fn new(
        storage: Arc<dyn Storage>,
        classifier: Classifier,
        ocr: Box<dyn Ocr>,
        config: OrganizerConfig,
    ) -> Self {
        Self {
            storage,
            classifier,
            ocr,
            config,
        }
    }

    /// Run one classification batch. With `dry_run` the files are
    /// classified and counted but nothing is resolved or moved.
    pub async fn run_batch(&self, dry_run: bool) -> Result<OrganizeReport> {
        let mut report = OrganizeReport::default();

        // Listing
        let files = self
            .storage
            .list_files(&FileQuery::with_mime_types(CANDIDATE_MIME_TYPES))
            .await?;
        report.files_found = files.len();

        // Classifying + Grouping, keyed by the raw category string.
        let mut groups: BTreeMap<String, Vec<RemoteFile>> = BTreeMap::new();
        for file in files {
            let category = self.classify_file(&file).await;
            debug!(file = %file.name, category = %category, "classified");
            if category == UNCATEGORIZED {
                report.uncategorized.push(file.name.clone());
            } else {
                report.classified += 1;
            }
            groups.entry(category).or_default().push(file);
        }

        if dry_run {
            return Ok(report);
        }

        // Resolving + Moving. The folder index is built once per run and
        // updated in place as folders are created.
        let folders = self.storage.list_folders().await?;
        let mut index = FolderIndex::from_folders(&folders);

        for (category, members) in groups {
            let known_before = index.len();
            let folder_id = resolve_folder(
                self.storage.as_ref(),
                &mut index,
                &category,
                self.config.match_cutoff,
            )
            .await?;
            if index.len() > known_before {
                report.folders_created += 1;
            }

            for file in members {
                // Single parent after move: every previous parent goes.
                self.storage
                    .move_file(&file.id, &folder_id, &file.parents)
                    .await?;
                report.moved += 1;
            }
        }

        Ok(report)
    }

    /// Extract and classify one file. Never fails: download, extraction,
    /// and classification errors all degrade to [`UNCATEGORIZED`].
    async fn classify_file(&self, file: &RemoteFile) -> String {
        let content = match self.storage.get_content(&file.id).await {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %file.name, error = %e, "download failed, leaving uncategorized");
                return UNCATEGORIZED.to_string();
            }
        };

        let extracted = extract::extract(&content, &file.mime_type, self.ocr.as_ref());
        if let Some(image) = &extracted.image {
            // OCR came up empty; let a vision-capable call look at it.
            return self.classifier.classify_image(&file.mime_type, image).await;
        }
        self.classifier.classify_text(&extracted.text).await
    }

}

/// Merge near-duplicate folders: every child of a duplicate, files and
/// subfolders alike, moves into the cluster's canonical folder, then the
/// emptied duplicate is deleted. Deletion is recursive in Drive-style
/// stores, so nothing may be left inside.
pub async fn reconcile(storage: &dyn Storage, merge_cutoff: f64) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    let folders = storage.list_folders().await?;
    let clusters = cluster_duplicates(&folders, merge_cutoff);
    report.clusters = clusters.len();

    for cluster in &clusters {
        for dup in &cluster.duplicates {
            let children = storage.list_files(&FileQuery::children_of(&dup.id)).await?;
            for child in children {
                storage
                    .move_file(&child.id, &cluster.canonical.id, &child.parents)
                    .await?;
                report.files_moved += 1;
            }
            for sub in folders.iter().filter(|f| f.parents.contains(&dup.id)) {
                if sub.id == cluster.canonical.id {
                    continue;
                }
                storage
                    .move_file(&sub.id, &cluster.canonical.id, &sub.parents)
                    .await?;
                report.folders_moved += 1;
            }
            storage.delete(&dup.id).await?;
            report.folders_merged += 1;
            debug!(duplicate = %dup.name, canonical = %cluster.canonical.name, "merged folder");
        }
    }

    Ok(report)
}

/// Delete folders with zero children. Idempotent: a second run with no
/// intervening changes deletes nothing.
pub async fn prune(storage: &dyn Storage) -> Result<PruneReport> {
    let mut report = PruneReport::default();

    let folders = storage.list_folders().await?;
    report.folders_checked = folders.len();

    for folder in folders {
        if !storage.has_children(&folder.id).await? {
            storage.delete(&folder.id).await?;
            report.folders_deleted += 1;
            debug!(folder = %folder.name, "pruned empty folder");
        }
    }

    Ok(report)
}
