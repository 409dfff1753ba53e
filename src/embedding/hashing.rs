//! Feature-hashing embedder.
//!
//! Maps lowercase alphanumeric tokens into a fixed number of signed buckets
//! and L2-normalizes the result. It needs no model files and no network, and
//! identical token multisets always produce identical vectors, which makes it
//! the offline model of choice for tests and air-gapped setups.

use sha2::{Digest, Sha256};

/// Model name selecting this embedder in `[embedding].offline_model`.
pub const HASHING_MODEL: &str = "hashing";

pub const HASHING_DIMS: usize = 384;

pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; HASHING_DIMS];

    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let digest = Sha256::digest(token.to_lowercase().as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % HASHING_DIMS as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in &mut vector {
            *x /= norm;
        }
    }
    vector
}
