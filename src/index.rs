//! Vector index build, persistence, and similarity search.
//!
//! A snapshot is a directory holding three files:
//!
//! | File | Contents |
//! |------|----------|
//! | `manifest.json` | format version, provider fingerprint, dims, counts, build time |
//! | `chunks.json` | chunk records in insertion order |
//! | `vectors.bin` | one little-endian f32 row of `dims` values per chunk |
//!
//! A build is assembled entirely in memory, written to a sibling staging
//! directory, and only then swapped into place, so a failed build leaves the
//! previous snapshot untouched.
//!
//! Search is brute-force cosine similarity over every entry. Ties keep
//! insertion order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use uuid::Uuid;

use crate::chunk::chunk_documents;
use crate::config::Config;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder, ProviderFingerprint};
use crate::error::{RagError, Result};
use crate::loader::load_documents;
use crate::models::Chunk;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const CHUNKS_FILE: &str = "chunks.json";
const VECTORS_FILE: &str = "vectors.bin";

/// Header of a persisted snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub format_version: u32,
    pub fingerprint: ProviderFingerprint,
    /// Vector length; `0` for an empty index.
    pub dims: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}

/// One retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// In-memory index over `(chunk, vector)` pairs.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: SnapshotManifest,
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Assemble an index from parallel chunk and vector lists.
    ///
    /// Fails if the lists differ in length or the vectors differ in dims.
    pub fn from_parts(
        fingerprint: ProviderFingerprint,
        document_count: usize,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(RagError::provider(
                fingerprint.provider.as_str(),
                format!(
                    "{} chunks but {} embeddings",
                    chunks.len(),
                    vectors.len()
                ),
            ));
        }

        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(RagError::provider(
                fingerprint.provider.as_str(),
                format!(
                    "inconsistent embedding dimensions: {} and {}",
                    dims,
                    bad.len()
                ),
            ));
        }

        Ok(Self {
            manifest: SnapshotManifest {
                format_version: SNAPSHOT_FORMAT_VERSION,
                fingerprint,
                dims,
                document_count,
                chunk_count: chunks.len(),
                built_at: Utc::now(),
            },
            chunks,
            vectors,
        })
    }

    pub fn manifest(&self) -> &SnapshotManifest {
        &self.manifest
    }

    pub fn fingerprint(&self) -> &ProviderFingerprint {
        &self.manifest.fingerprint
    }

    pub fn dims(&self) -> usize {
        self.manifest.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// The `k` entries most similar to `query`, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| SearchHit {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect()
    }
}

/// Result of [`build_index`].
#[derive(Debug, Clone)]
pub struct IndexBuild {
    pub snapshot_path: PathBuf,
    pub index: VectorIndex,
}

/// Load, chunk, and embed the corpus, then persist the snapshot.
///
/// Replaces any snapshot already at `snapshot_path`. An empty corpus
/// directory produces a valid, empty index.
pub async fn build_index(
    corpus_path: &Path,
    snapshot_path: &Path,
    config: &Config,
    embedder: &dyn Embedder,
) -> Result<IndexBuild> {
    let start = Instant::now();
    let documents = load_documents(corpus_path, &config.index)?;
    let chunks = chunk_documents(&documents, &config.chunking);
    let fingerprint = embedder.fingerprint();

    tracing::info!(
        documents = documents.len(),
        chunks = chunks.len(),
        provider = %fingerprint,
        "building index"
    );

    let batch_size = config.embedding.batch_size.max(1);
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed_texts(&texts).await?;
        if embedded.len() != texts.len() {
            return Err(RagError::provider(
                fingerprint.provider.as_str(),
                format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    embedded.len()
                ),
            ));
        }
        vectors.extend(embedded);
    }

    let index = VectorIndex::from_parts(fingerprint, documents.len(), chunks, vectors)?;
    save_snapshot(&index, snapshot_path)?;

    tracing::info!(
        path = %snapshot_path.display(),
        chunks = index.len(),
        dims = index.dims(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "index snapshot written"
    );

    Ok(IndexBuild {
        snapshot_path: snapshot_path.to_path_buf(),
        index,
    })
}

/// Write `index` to `path`, replacing whatever was there.
pub fn save_snapshot(index: &VectorIndex, path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| RagError::snapshot(path, "snapshot path has no final component"))?
        .to_string_lossy()
        .to_string();
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let staging = parent.join(format!("{}.staging-{}", file_name, Uuid::new_v4()));
    fs::create_dir_all(&staging)?;
    if let Err(e) = write_snapshot_files(index, &staging) {
        let _ = fs::remove_dir_all(&staging);
        return Err(e);
    }

    // Move the old snapshot aside first so `path` is never half-written.
    let retired = parent.join(format!("{}.old-{}", file_name, Uuid::new_v4()));
    let had_previous = path.exists();
    if had_previous {
        fs::rename(path, &retired)?;
    }
    if let Err(e) = fs::rename(&staging, path) {
        if had_previous {
            let _ = fs::rename(&retired, path);
        }
        let _ = fs::remove_dir_all(&staging);
        return Err(e.into());
    }
    if had_previous {
        let removed = if retired.is_dir() {
            fs::remove_dir_all(&retired)
        } else {
            fs::remove_file(&retired)
        };
        if let Err(e) = removed {
            tracing::warn!(path = %retired.display(), error = %e, "failed to remove previous snapshot");
        }
    }
    Ok(())
}

fn write_snapshot_files(index: &VectorIndex, dir: &Path) -> Result<()> {
    let manifest = serde_json::to_vec_pretty(&index.manifest)
        .map_err(|e| RagError::snapshot(dir, e))?;
    fs::write(dir.join(MANIFEST_FILE), manifest)?;

    let chunks = serde_json::to_vec(&index.chunks).map_err(|e| RagError::snapshot(dir, e))?;
    fs::write(dir.join(CHUNKS_FILE), chunks)?;

    let mut blob = Vec::with_capacity(index.len() * index.dims() * 4);
    for vector in &index.vectors {
        blob.extend(vec_to_blob(vector));
    }
    fs::write(dir.join(VECTORS_FILE), blob)?;
    Ok(())
}

/// Read a snapshot written by [`save_snapshot`].
///
/// # Errors
///
/// - [`RagError::IndexNotFound`] if there is no snapshot at `path`.
/// - [`RagError::Snapshot`] if it cannot be decoded or is inconsistent.
pub fn load_index(path: &Path) -> Result<VectorIndex> {
    let manifest_path = path.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(RagError::IndexNotFound {
            path: path.to_path_buf(),
        });
    }

    let manifest: SnapshotManifest = serde_json::from_slice(&fs::read(&manifest_path)?)
        .map_err(|e| RagError::snapshot(path, format!("bad manifest: {}", e)))?;
    if manifest.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(RagError::snapshot(
            path,
            format!(
                "unsupported format version {} (expected {})",
                manifest.format_version, SNAPSHOT_FORMAT_VERSION
            ),
        ));
    }

    let chunks: Vec<Chunk> = serde_json::from_slice(&fs::read(path.join(CHUNKS_FILE))?)
        .map_err(|e| RagError::snapshot(path, format!("bad chunks file: {}", e)))?;
    if chunks.len() != manifest.chunk_count {
        return Err(RagError::snapshot(
            path,
            format!(
                "manifest lists {} chunks, found {}",
                manifest.chunk_count,
                chunks.len()
            ),
        ));
    }

    let blob = fs::read(path.join(VECTORS_FILE))?;
    let expected = manifest.chunk_count * manifest.dims * 4;
    if blob.len() != expected {
        return Err(RagError::snapshot(
            path,
            format!("vectors file is {} bytes, expected {}", blob.len(), expected),
        ));
    }
    let vectors = if manifest.dims == 0 {
        vec![Vec::new(); manifest.chunk_count]
    } else {
        blob.chunks_exact(manifest.dims * 4).map(blob_to_vec).collect()
    };

    tracing::info!(
        path = %path.display(),
        chunks = chunks.len(),
        provider = %manifest.fingerprint,
        "loaded index snapshot"
    );

    Ok(VectorIndex {
        manifest,
        chunks,
        vectors,
    })
}

/// Process-wide handle to the currently served index.
///
/// Readers take a cheap `Arc` clone; a rebuild swaps in a new index without
/// disturbing queries already holding the old one.
#[derive(Debug, Clone, Default)]
pub struct SharedIndex {
    inner: Arc<RwLock<Option<Arc<VectorIndex>>>>,
}

impl SharedIndex {
    pub fn new(index: Option<VectorIndex>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index.map(Arc::new))),
        }
    }

    pub fn current(&self) -> Option<Arc<VectorIndex>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, index: VectorIndex) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(index));
    }
}
