//! # Dockeep
//!
//! Generative-AI document organization and question answering for a cloud
//! file store.
//!
//! Dockeep does two jobs. The organizer classifies documents (PDF, DOCX,
//! images) into category folders by asking a generative model, resolving
//! each category against existing folders with fuzzy name matching so
//! "Invoices", "invoices", and "Invoice" end up in one place. The
//! retrieval side chunks and embeds ingested documents into a persistent
//! vector index and answers questions grounded in the retrieved chunks.
//!
//! ## Pipelines
//!
//! ```text
//! organize:  list ──▶ extract ──▶ classify ──▶ group ──▶ resolve ──▶ move
//! ingest:    walk ──▶ extract ──▶ chunk ──▶ embed ──▶ index
//! ask:       embed query ──▶ cosine top-k ──▶ grounded prompt ──▶ answer
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with defaults and validation |
//! | [`storage`] | Cloud file store abstraction (Google Drive, in-memory) |
//! | [`extract`] | Text extraction from PDF, DOCX, and images (OCR) |
//! | [`genai`] | Generative provider abstraction (Gemini) |
//! | [`classify`] | Category classification and response parsing |
//! | [`folders`] | Fuzzy folder matching and duplicate clustering |
//! | [`organizer`] | Batch organize, reconcile, and prune pipelines |
//! | [`chunk`] | Recursive separator-aware text chunking |
//! | [`embedding`] | Embedding provider abstraction (OpenAI) |
//! | [`index`] | SQLite-backed persistent vector index |
//! | [`rag`] | Retrieval-augmented question answering |
//! | [`ingest`] | Local-directory ingestion into the index |

pub mod chunk;
pub mod classify;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod folders;
pub mod genai;
pub mod index;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod organizer;
pub mod rag;
pub mod storage;
