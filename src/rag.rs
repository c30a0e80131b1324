//! Retrieval-augmented question answering over the vector index.
//!
//! The engine ties together chunking, embeddings, the persistent index,
//! and the generative provider. Documents are chunked and embedded on the
//! way in; questions are embedded, matched against stored chunks by cosine
//! similarity, and answered by the generative model with the retrieved
//! chunks inlined as context.
//!
//! Answering requires a previously built index: [`RagEngine::answer`] and
//! [`RagEngine::relevant_chunks`] fail with
//! [`QaError::IndexNotInitialized`] until one is loaded or created.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::QaError;
use crate::genai::{GenAi, Part};
use crate::index::VectorIndex;
use crate::models::{Answer, RetrievedChunk};

/// One source document handed to ingestion: extracted text plus the name
/// it is cited under.
pub struct SourceDocument {
    pub source: String,
    pub text: String,
}

pub struct RagEngine {
    embedder: Box<dyn Embedder>,
    genai: Option<Arc<dyn GenAi>>,
    index_dir: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    top_k: usize,
    index: Option<VectorIndex>,
}

impl RagEngine {
    /// An engine that can ingest and retrieve. Answering also needs a
    /// generative provider, attached with [`RagEngine::with_genai`].
    pub fn new(embedder: Box<dyn Embedder>, config: &Config) -> Self {
        Self {
            embedder,
            genai: None,
            index_dir: config.index.dir.clone(),
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            top_k: config.retrieval.top_k,
            index: None,
        }
    }

    pub fn with_genai(mut self, genai: Arc<dyn GenAi>) -> Self {
        self.genai = Some(genai);
        self
    }

    /// Attach to an index persisted by an earlier run. Returns `false`
    /// when none exists yet.
    pub async fn load_index(&mut self) -> Result<bool> {
        match VectorIndex::load(&self.index_dir).await? {
            Some(index) => {
                self.index = Some(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether an index is attached and answerable.
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Chunk, embed, and append the given documents to the index, creating
    /// it on first use. A document whose content digest was indexed before
    /// is skipped, so re-ingesting the same material is a no-op. Returns
    /// the number of chunks indexed.
    pub async fn process_documents(&mut self, documents: &[SourceDocument]) -> Result<u64> {
        if self.index.is_none() {
            self.index = Some(VectorIndex::create_or_load(&self.index_dir).await?);
        }
        let index = self.index.as_ref().ok_or_else(|| anyhow!("index unavailable"))?;

        let mut appended = 0u64;
        for doc in documents {
            if doc.text.trim().is_empty() {
                debug!(source = %doc.source, "no text to index, skipping");
                continue;
            }
            let digest = content_digest(&doc.text);
            if index.document_indexed(&digest).await? {
                debug!(source = %doc.source, "content already indexed, skipping");
                continue;
            }
            let chunks = chunk_text(&doc.text, self.chunk_size, self.chunk_overlap);
            if chunks.is_empty() {
                continue;
            }

            let vectors = self.embedder.embed_documents(&chunks).await?;
            let metadatas: Vec<serde_json::Value> = chunks
                .iter()
                .enumerate()
                .map(|(i, _)| serde_json::json!({ "source": doc.source, "chunk": i }))
                .collect();

            // Entries and the digest commit together, so a failed embed or
            // insert leaves the document eligible for retry.
            appended += index
                .append_document(&digest, &doc.source, &chunks, &vectors, &metadatas)
                .await?;
            info!(source = %doc.source, chunks = chunks.len(), "indexed document");
        }

        Ok(appended)
    }

    /// Total entries in the attached index.
    pub async fn index_size(&self) -> Result<i64, QaError> {
        let index = self.index.as_ref().ok_or(QaError::IndexNotInitialized)?;
        Ok(index.count().await?)
    }

    /// The `k` chunks most similar to `query`, best first.
    pub async fn relevant_chunks(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, QaError> {
        let index = self.index.as_ref().ok_or(QaError::IndexNotInitialized)?;
        let query_vec = self.embedder.embed_query(query).await?;
        Ok(index.retrieve(&query_vec, k).await?)
    }

    /// Answer a question from indexed content. The model is instructed to
    /// answer only from the retrieved context, cite its sources, and say so
    /// when the context does not cover the question.
    pub async fn answer(&self, question: &str) -> Result<Answer, QaError> {
        let genai = self
            .genai
            .as_ref()
            .ok_or_else(|| QaError::Other(anyhow!("no generative provider configured")))?;
        let chunks = self.relevant_chunks(question, self.top_k).await?;
        let prompt = build_qa_prompt(question, &chunks);

        let response = genai
            .generate(&[Part::Text(prompt)])
            .await
            .map_err(|e| QaError::Other(anyhow!(e)))?;

        let answer = response
            .extract_text()
            .map(str::to_string)
            .ok_or_else(|| QaError::Other(anyhow!("model returned no answer text")))?;

        Ok(Answer {
            answer,
            source_documents: chunks,
        })
    }

    /// Release the underlying index connection.
    pub async fn close(mut self) {
        if let Some(index) = self.index.take() {
            index.close().await;
        }
    }
}

fn content_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Assemble the grounded prompt: numbered context chunks with their
/// sources, then the question and the answer-from-context-only rule.
fn build_qa_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let mut prompt = String::from(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer from the context, just say that you don't \
         know, don't try to make up an answer. Always cite the specific sources \
         from the context that informed the answer.\n\nContext:\n",
    );

    for (i, chunk) in chunks.iter().enumerate() {
        let source = chunk
            .metadata
            .get("source")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown");
        let _ = writeln!(prompt, "[{}] (source: {})\n{}\n", i + 1, source, chunk.text);
    }

    let _ = write!(prompt, "Question: {}\nAnswer:", question);
    prompt
}
