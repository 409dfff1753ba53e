//! Sliding-window text chunker.
//!
//! Splits a [`Document`] into fixed-size [`Chunk`]s of `chunk_size` chars,
//! where each window starts `chunk_size - chunk_overlap` chars after the
//! previous one. Adjacent chunks of the same document therefore share
//! exactly `chunk_overlap` chars, and dropping that shared prefix from every
//! chunk after the first reconstructs the document text.
//!
//! Lengths and offsets count chars, not bytes, so windows never split a
//! multi-byte character.
//!
//! Chunk ids and hashes are derived only from the input, so re-chunking the
//! same document with the same parameters yields an identical sequence.
//!
//! # Example
//!
//! ```rust
//! use product_query_bot::chunk::chunk_text;
//!
//! let chunks = chunk_text("doc.txt", "abcdefghij", 4, 1);
//! let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(texts, ["abcd", "defg", "ghij"]);
//! ```

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Document, Metadata};

/// Chunk every document, preserving document order.
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| chunk_document(doc, config.chunk_size, config.chunk_overlap))
        .collect()
}

/// Chunk one document, copying its metadata onto each chunk.
pub fn chunk_document(doc: &Document, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    split_windows(
        &doc.source_id,
        &doc.text,
        chunk_size,
        chunk_overlap,
        &doc.metadata,
    )
}

/// Chunk raw text without metadata.
pub fn chunk_text(source_id: &str, text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    split_windows(source_id, text, chunk_size, chunk_overlap, &Metadata::new())
}

/// Empty text produces no chunks. A zero window is treated as one char and
/// an overlap that is not below the window degrades to a step of one char.
fn split_windows(
    source_id: &str,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    metadata: &Metadata,
) -> Vec<Chunk> {
    // Byte position of every char start, plus the end of the text.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = bounds.len() - 1;
    if char_count == 0 {
        return Vec::new();
    }

    let size = chunk_size.max(1);
    let step = size.saturating_sub(chunk_overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(char_count);
        let piece = &text[bounds[start]..bounds[end]];
        chunks.push(make_chunk(source_id, chunks.len(), start, piece, metadata));
        if end == char_count {
            break;
        }
        start += step;
    }
    chunks
}

fn make_chunk(
    source_id: &str,
    index: usize,
    offset: usize,
    text: &str,
    metadata: &Metadata,
) -> Chunk {
    let hash = format!("{:x}", Sha256::digest(text.as_bytes()));

    let mut id_hasher = Sha256::new();
    id_hasher.update(source_id.as_bytes());
    id_hasher.update(b":");
    id_hasher.update(index.to_le_bytes());
    let id = format!("{:x}", id_hasher.finalize());

    Chunk {
        id: id[..32].to_string(),
        source_id: source_id.to_string(),
        chunk_index: index,
        offset,
        text: text.to_string(),
        hash,
        metadata: metadata.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild a document from its chunks by dropping each overlap.
    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for c in chunks {
            let skip = covered - c.offset;
            out.extend(c.text.chars().skip(skip));
            covered = c.offset + c.text.chars().count();
        }
        out
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 1000, 200);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("doc1", "", 1000, 200).is_empty());
    }

    #[test]
    fn test_window_and_overlap() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text("doc1", &text, 1000, 200);

        let offsets: Vec<usize> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 800, 1600]);
        assert_eq!(chunks[0].text.len(), 1000);
        assert_eq!(chunks[1].text.len(), 1000);
        // Last chunk is shorter than the window.
        assert_eq!(chunks[2].text.len(), 900);

        for pair in chunks.windows(2) {
            let tail: String = pair[0].text.chars().skip(800).collect();
            let head: String = pair[1].text.chars().take(200).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_exact_multiple_does_not_emit_trailing_overlap_chunk() {
        // 1800 chars: [0,1000) then [800,1800) reaches the end.
        let text = "x".repeat(1800);
        let chunks = chunk_text("doc1", &text, 1000, 200);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_reconstructs_source() {
        let text = "The Trailblazer jacket is lightweight, waterproof and packs into its own pocket. "
            .repeat(40);
        let chunks = chunk_text("doc1", &text, 120, 30);
        assert!(chunks.len() > 1);
        assert_eq!(reconstruct(&chunks), text);
    }

    #[test]
    fn test_multibyte_chars_not_split() {
        let text = "camión eléctrico — ñandú ".repeat(30);
        let chunks = chunk_text("doc1", &text, 17, 5);
        assert_eq!(reconstruct(&chunks), text);
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(c.text.chars().count(), 17);
        }
    }

    #[test]
    fn test_indices_contiguous() {
        let text = "word ".repeat(500);
        let chunks = chunk_text("doc1", &text, 100, 20);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha beta gamma delta. ".repeat(100);
        let c1 = chunk_text("doc1", &text, 200, 50);
        let c2 = chunk_text("doc1", &text, 200, 50);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_ids_unique_across_documents() {
        let a = chunk_text("a.txt", "same text", 100, 10);
        let b = chunk_text("b.txt", "same text", 100, 10);
        assert_ne!(a[0].id, b[0].id);
        assert_eq!(a[0].hash, b[0].hash);
    }

    #[test]
    fn test_metadata_copied_to_chunks() {
        let mut metadata = Metadata::new();
        metadata.insert("file_name".to_string(), "p1.txt".to_string());
        let doc = Document {
            source_id: "p1.txt".to_string(),
            text: "z".repeat(50),
            metadata,
        };
        let chunks = chunk_document(&doc, 20, 5);
        assert!(chunks.len() > 1);
        assert!(chunks
            .iter()
            .all(|c| c.metadata.get("file_name").map(String::as_str) == Some("p1.txt")));
    }
}
