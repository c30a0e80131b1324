//! Fuzzy folder matching and the per-run folder index.
//!
//! Categories are free-form strings, so "Invoices", "invoices" and
//! "Invoice" must all land in one folder. Matching compares normalized
//! names (trim + lowercase) with a sequence-similarity ratio and accepts
//! the best candidate above a cutoff; misses create a new folder under the
//! category's original display name.
//!
//! The same ratio drives the duplicate-folder merge pass, at a much looser
//! cutoff: resolving a single file to the wrong folder is costly, merging
//! two folders that were probably meant to be one is the whole point.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::models::Folder;
use crate::storage::Storage;

/// Normalize a folder name or category into its matching key.
pub fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Sequence-similarity ratio in `[0.0, 1.0]`, computed the way classic diff
/// tools do: twice the total length of recursively-matched longest common
/// blocks, over the combined length of both strings.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let matched = matching_block_len(&a, &b);
    2.0 * matched as f64 / (a.len() + b.len()) as f64
}

/// Total characters covered by matching blocks: find the longest common
/// block, then recurse into the unmatched regions on either side of it.
fn matching_block_len(a: &[char], b: &[char]) -> usize {
    let (ai, bi, len) = longest_common_block(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_block_len(&a[..ai], &b[..bi])
        + matching_block_len(&a[ai + len..], &b[bi + len..])
}

/// Longest common contiguous block, earliest occurrence on ties.
fn longest_common_block(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    // lengths[j] = length of common suffix ending at a[i], b[j]
    let mut lengths = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut prev_diag = 0;
        for j in 0..b.len() {
            let up_left = prev_diag;
            prev_diag = lengths[j + 1];
            if a[i] == b[j] {
                let len = up_left + 1;
                lengths[j + 1] = len;
                if len > best.2 {
                    best = (i + 1 - len, j + 1 - len, len);
                }
            } else {
                lengths[j + 1] = 0;
            }
        }
    }
    best
}

/// Process-wide cache of known destination folders, keyed by normalized
/// name. Built once per batch run and mutated in place as folders are
/// created, so later lookups in the same run see them without another
/// storage round trip.
#[derive(Debug, Default)]
pub struct FolderIndex {
    by_key: HashMap<String, String>,
}

impl FolderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from a folder listing, skipping trashed folders.
    pub fn from_folders(folders: &[Folder]) -> Self {
        let by_key = folders
            .iter()
            .filter(|f| !f.trashed)
            .map(|f| (f.key.clone(), f.id.clone()))
            .collect();
        Self { by_key }
    }

    pub fn insert(&mut self, key: String, folder_id: String) {
        self.by_key.insert(key, folder_id);
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// The single best fuzzy match for `key`, if it clears `cutoff`.
    pub fn best_match(&self, key: &str, cutoff: f64) -> Option<&str> {
        self.by_key
            .iter()
            .map(|(known, id)| (similarity_ratio(key, known), id))
            .filter(|(score, _)| *score >= cutoff)
            .max_by(|(x, _), (y, _)| x.total_cmp(y))
            .map(|(_, id)| id.as_str())
    }
}

/// Resolve a category to a destination folder id, creating the folder when
/// no known name is similar enough. Newly created folders are registered in
/// the index under their normalized key so the rest of the batch reuses
/// them for free.
pub async fn resolve_folder(
    storage: &dyn Storage,
    index: &mut FolderIndex,
    category: &str,
    cutoff: f64,
) -> Result<String> {
    let key = normalize_key(category);
    if let Some(id) = index.best_match(&key, cutoff) {
        return Ok(id.to_string());
    }
    // Display name keeps the category's original casing.
    let folder = storage.create_folder(category.trim()).await?;
    let id = folder.id.clone();
    index.insert(folder.key, folder.id);
    Ok(id)
}

/// A group of near-duplicate folders to be merged.
#[derive(Debug)]
pub struct DuplicateCluster {
    pub canonical: Folder,
    pub duplicates: Vec<Folder>,
}

/// Greedy single-pass duplicate grouping.
///
/// Folder names are sorted by key first so the pass is deterministic, then
/// each unconsumed name seeds a cluster of every later unconsumed name
/// within `cutoff`. A name consumed into one cluster is never revisited,
/// so this is an approximation, not a transitive closure. Within a
/// cluster the shortest display name is canonical; ties go to the first
/// encountered in iteration order.
pub fn cluster_duplicates(folders: &[Folder], cutoff: f64) -> Vec<DuplicateCluster> {
    let mut sorted: Vec<&Folder> = folders.iter().filter(|f| !f.trashed).collect();
    sorted.sort_by(|x, y| x.key.cmp(&y.key).then_with(|| x.id.cmp(&y.id)));

    let mut consumed: HashSet<usize> = HashSet::new();
    let mut clusters = Vec::new();

    for i in 0..sorted.len() {
        if consumed.contains(&i) {
            continue;
        }
        consumed.insert(i);
        let mut members = vec![i];
        for j in (i + 1)..sorted.len() {
            if consumed.contains(&j) {
                continue;
            }
            if similarity_ratio(&sorted[i].key, &sorted[j].key) >= cutoff {
                consumed.insert(j);
                members.push(j);
            }
        }
        if members.len() < 2 {
            continue;
        }

        let canonical_pos = *members
            .iter()
            .min_by_key(|&&m| (sorted[m].name.chars().count(), m))
            .expect("cluster has members");
        let canonical = sorted[canonical_pos].clone();
        let duplicates = members
            .into_iter()
            .filter(|&m| m != canonical_pos)
            .map(|m| sorted[m].clone())
            .collect();
        clusters.push(DuplicateCluster {
            canonical,
            duplicates,
        });
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_key("  Meeting Notes "), "meeting notes");
    }

    #[test]
    fn identical_strings_have_ratio_one() {
        assert!((similarity_ratio("invoices", "invoices") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ratio_matches_diff_semantics() {
        // "invoice" vs "invoices": 7 matched chars over 15 total.
        let r = similarity_ratio("invoice", "invoices");
        assert!((r - 14.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_strings_have_ratio_zero() {
        assert!(similarity_ratio("abc", "xyz") < 1e-9);
    }

    #[test]
    fn ratio_counts_multiple_blocks() {
        // "ab" + "cd" both match around the inserted "x".
        let r = similarity_ratio("abcd", "abxcd");
        assert!((r - 8.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn best_match_requires_cutoff() {
        let folders = vec![
            Folder::new("f1", "Invoices"),
            Folder::new("f2", "Tax Documents"),
        ];
        let index = FolderIndex::from_folders(&folders);
        assert_eq!(index.best_match("invoice", 0.8), Some("f1"));
        assert_eq!(index.best_match("payroll", 0.8), None);
    }

    #[test]
    fn best_match_picks_single_best() {
        let folders = vec![
            Folder::new("f1", "Invoice"),
            Folder::new("f2", "Invoices 2024"),
        ];
        let index = FolderIndex::from_folders(&folders);
        assert_eq!(index.best_match("invoices", 0.5), Some("f1"));
    }

    #[test]
    fn trashed_folders_are_not_indexed() {
        let mut folder = Folder::new("f1", "Invoices");
        folder.trashed = true;
        let index = FolderIndex::from_folders(&[folder]);
        assert!(index.is_empty());
    }

    #[test]
    fn similar_names_cluster_together() {
        let folders = vec![
            Folder::new("f1", "Invoice"),
            Folder::new("f2", "Invoices"),
            Folder::new("f3", "Reports"),
        ];
        let clusters = cluster_duplicates(&folders, 0.8);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].canonical.name, "Invoice");
        assert_eq!(clusters[0].duplicates.len(), 1);
        assert_eq!(clusters[0].duplicates[0].name, "Invoices");
    }

    #[test]
    fn dissimilar_names_do_not_cluster() {
        let folders = vec![
            Folder::new("f1", "Invoices"),
            Folder::new("f2", "Meeting Notes"),
        ];
        assert!(cluster_duplicates(&folders, 0.8).is_empty());
    }

    #[test]
    fn canonical_is_shortest_name() {
        let folders = vec![
            Folder::new("f1", "Invoices 2024"),
            Folder::new("f2", "Invoices"),
            Folder::new("f3", "Invoices "),
        ];
        let clusters = cluster_duplicates(&folders, 0.6);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].canonical.name, "Invoices");
        assert_eq!(clusters[0].duplicates.len(), 2);
    }

    #[test]
    fn clustering_is_deterministic() {
        let folders = vec![
            Folder::new("f2", "Invoices"),
            Folder::new("f1", "Invoice"),
            Folder::new("f3", "Invoicing"),
        ];
        let a = cluster_duplicates(&folders, 0.6);
        let b = cluster_duplicates(&folders, 0.6);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.canonical.id, y.canonical.id);
        }
    }
}
