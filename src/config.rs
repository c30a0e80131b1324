use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub organizer: OrganizerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Storage backend: `"drive"` or `"memory"` (dry runs / tests).
    #[serde(default = "default_storage_provider")]
    pub provider: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_storage_provider(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_storage_provider() -> String {
    "drive".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_genai_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: default_genai_model(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_genai_model() -> String {
    "gemini-2.0-flash".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Embedding backend: `"openai"` or `"disabled"`.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct OcrConfig {
    /// OCR backend: `"tesseract"` or `"disabled"`.
    #[serde(default = "default_ocr_provider")]
    pub provider: String,
    /// Language hint passed to tesseract (`-l`).
    #[serde(default = "default_ocr_lang")]
    pub lang: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            provider: default_ocr_provider(),
            lang: default_ocr_lang(),
        }
    }
}

fn default_ocr_provider() -> String {
    "tesseract".to_string()
}
fn default_ocr_lang() -> String {
    "eng".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Chunks retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted vector index. Loaded on startup if
    /// present, created on first ingest otherwise.
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrganizerConfig {
    /// Similarity cutoff for matching a category to an existing folder.
    #[serde(default = "default_match_cutoff")]
    pub match_cutoff: f64,
    /// Looser cutoff used only by the duplicate-folder merge pass.
    #[serde(default = "default_merge_cutoff")]
    pub merge_cutoff: f64,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            match_cutoff: default_match_cutoff(),
            merge_cutoff: default_merge_cutoff(),
        }
    }
}

fn default_match_cutoff() -> f64 {
    0.8
}
fn default_merge_cutoff() -> f64 {
    0.4
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    for (name, v) in [
        ("organizer.match_cutoff", config.organizer.match_cutoff),
        ("organizer.merge_cutoff", config.organizer.merge_cutoff),
    ] {
        if !(0.0..=1.0).contains(&v) {
            anyhow::bail!("{} must be in [0.0, 1.0]", name);
        }
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    match config.storage.provider.as_str() {
        "drive" | "memory" => {}
        other => anyhow::bail!(
            "Unknown storage provider: '{}'. Must be drive or memory.",
            other
        ),
    }
    match config.ocr.provider.as_str() {
        "tesseract" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown OCR provider: '{}'. Must be tesseract or disabled.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("dockeep.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "[index]\ndir = \"./idx\"\n");
        let config = load_config(&path).unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 50);
        assert_eq!(config.retrieval.top_k, 4);
        assert!((config.organizer.match_cutoff - 0.8).abs() < f64::EPSILON);
        assert!((config.organizer.merge_cutoff - 0.4).abs() < f64::EPSILON);
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk_size() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            "[index]\ndir = \"./idx\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn enabled_embedding_requires_model_and_dims() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            "[index]\ndir = \"./idx\"\n[embedding]\nprovider = \"openai\"\n",
        );
        assert!(load_config(&path).is_err());
    }
}
