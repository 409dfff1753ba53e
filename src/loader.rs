//! Corpus loader.
//!
//! Walks the corpus directory and turns every file matching the include
//! globs (and none of the exclude globs) into one [`Document`] holding the
//! full file text. Documents are sorted by `source_id` so builds are
//! deterministic.

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::IndexConfig;
use crate::error::{RagError, Result};
use crate::models::{Document, Metadata};

/// Load every eligible file under `root`.
///
/// # Errors
///
/// - [`RagError::CorpusNotFound`] if `root` is missing or not a directory,
///   or if it contains files but none of them match the include globs.
///
/// An existing directory with no files at all returns an empty list.
pub fn load_documents(root: &Path, config: &IndexConfig) -> Result<Vec<Document>> {
    if !root.is_dir() {
        return Err(RagError::CorpusNotFound {
            path: root.to_path_buf(),
            reason: "directory does not exist".to_string(),
        });
    }

    let include_set = build_globset(&config.include_globs)?;
    let exclude_set = build_globset(&config.exclude_globs)?;

    let mut documents = Vec::new();
    let mut seen_files = 0usize;

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| RagError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        seen_files += 1;

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        documents.push(file_to_document(path, &rel_str)?);
    }

    if seen_files > 0 && documents.is_empty() {
        return Err(RagError::CorpusNotFound {
            path: root.to_path_buf(),
            reason: format!(
                "{} file(s) found but none match {:?}",
                seen_files, config.include_globs
            ),
        });
    }

    documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    tracing::info!(
        corpus = %root.display(),
        documents = documents.len(),
        "loaded corpus"
    );
    Ok(documents)
}

fn file_to_document(path: &Path, relative_path: &str) -> Result<Document> {
    let text = std::fs::read_to_string(path)?;

    let mut metadata = Metadata::new();
    metadata.insert("source".to_string(), path.display().to_string());
    if let Some(name) = path.file_name() {
        metadata.insert("file_name".to_string(), name.to_string_lossy().to_string());
    }
    if let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) {
        let modified: DateTime<Utc> = modified.into();
        metadata.insert("modified_at".to_string(), modified.to_rfc3339());
    }

    Ok(Document {
        source_id: relative_path.to_string(),
        text,
        metadata,
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::InvalidConfig(format!("bad glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::InvalidConfig(e.to_string()))
}
