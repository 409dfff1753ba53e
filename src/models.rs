//! Core data models used throughout the product query bot.
//!
//! These types represent the documents, chunks, and per-request pipeline
//! state that flow through the indexing and query paths.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form string metadata attached to documents and chunks.
pub type Metadata = BTreeMap<String, String>;

/// One product text file loaded from the corpus, before chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the corpus root (e.g. `product1.txt`).
    pub source_id: String,
    pub text: String,
    pub metadata: Metadata,
}

/// A window of a document's text; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id derived from `source_id` and `chunk_index`.
    pub id: String,
    pub source_id: String,
    /// Position of this chunk within its document, starting at 0.
    pub chunk_index: usize,
    /// Start of the window in chars from the beginning of the document.
    pub offset: usize,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Where a [`PipelineState`] is in the `Start → Retrieved → Done` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    Retrieved,
    Done,
}

/// The record threaded through the retrieval and generation stages.
///
/// Created fresh for every query. Retrieval sets `documents`, generation
/// sets `response`; nothing is retained once the caller has the answer.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub query: String,
    pub documents: Vec<Chunk>,
    pub response: String,
    pub stage: PipelineStage,
}

impl PipelineState {
    /// Initial state: only the query is populated.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            documents: Vec::new(),
            response: String::new(),
            stage: PipelineStage::Start,
        }
    }

    /// A state positioned after retrieval, holding the given chunks.
    pub fn with_documents(query: impl Into<String>, documents: Vec<Chunk>) -> Self {
        Self {
            query: query.into(),
            documents,
            response: String::new(),
            stage: PipelineStage::Retrieved,
        }
    }
}
