//! Local-directory ingestion into the vector index.
//!
//! Walks a directory tree, keeps files matching the configured include
//! globs, extracts their text, and hands each document to the
//! [`RagEngine`](crate::rag::RagEngine) for chunking and indexing. A file
//! that fails to read or yields no text is skipped and reported; it never
//! aborts the run.

use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::warn;
use walkdir::WalkDir;

use crate::extract::{self, Extracted};
use crate::ocr::Ocr;
use crate::rag::{RagEngine, SourceDocument};

#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_found: usize,
    pub files_ingested: usize,
    pub chunks_indexed: u64,
    pub skipped: Vec<String>,
}

fn build_globset(include_globs: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in include_globs {
        builder.add(Glob::new(pattern).with_context(|| format!("bad glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Map a file extension to the content type the extractor understands.
/// Plain-text formats pass through as `text/plain`.
fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => extract::MIME_PDF,
        Some("docx") => extract::MIME_DOCX,
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "text/plain",
    }
}

/// Ingest every matching file under `root` into the engine's index.
pub async fn ingest_directory(
    engine: &mut RagEngine,
    ocr: &dyn Ocr,
    root: &Path,
    include_globs: &[String],
) -> Result<IngestReport> {
    let globset = build_globset(include_globs)?;
    let mut report = IngestReport::default();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if !globset.is_match(relative) {
            continue;
        }
        report.files_found += 1;

        let name = entry.file_name().to_string_lossy().to_string();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "read failed, skipping");
                report.skipped.push(name);
                continue;
            }
        };

        let Extracted { text, .. } = extract::extract(&bytes, content_type_for(path), ocr);
        if text.trim().is_empty() {
            warn!(file = %path.display(), "no text extracted, skipping");
            report.skipped.push(name);
            continue;
        }

        let appended = engine
            .process_documents(&[SourceDocument { source: name, text }])
            .await?;
        report.chunks_indexed += appended;
        report.files_ingested += 1;
    }

    Ok(report)
}
