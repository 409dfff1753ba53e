//! Embedding providers.
//!
//! [`EmbeddingProvider`] is a tagged variant with one arm per backend:
//! - **`Local`**: calls an Ollama-compatible `POST /api/embed` endpoint.
//! - **`Hosted`**: calls the OpenAI `POST /v1/embeddings` API.
//! - **`Offline`**: runs a fixed local model with no API key: fastembed
//!   (`all-minilm-l6-v2` by default) or the built-in [`hashing`] embedder.
//!
//! All arms are used through the [`Embedder`] capability trait.
//!
//! Also provides vector utilities used by the index snapshot:
//! - [`cosine_similarity`]: compute similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`]: decode those bytes back into a `Vec<f32>`
//!
//! # Provider Selection
//!
//! [`select_embedding_provider`] applies the same precedence as generation:
//! local endpoint + model, then a real hosted key, then the offline model.
//! It must pick the same provider at build time and query time; the index
//! snapshot records a [`ProviderFingerprint`] so a mismatch is detected.

pub mod hashing;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{EmbeddingConfig, ProviderSettings};
use crate::error::{RagError, Result};
use crate::http::{join_url, post_json, HttpOptions};

/// Which family of backend serves a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Local,
    Hosted,
    Offline,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Local => "local",
            ProviderKind::Hosted => "hosted",
            ProviderKind::Offline => "offline",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the embedding function that produced a set of vectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFingerprint {
    pub provider: ProviderKind,
    pub model: String,
}

impl fmt::Display for ProviderFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Capability interface for turning text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn fingerprint(&self) -> ProviderFingerprint;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let provider = self.fingerprint().provider;
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::provider(provider.as_str(), "empty embedding response"))
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Local {
        url: String,
        model: String,
        http: HttpOptions,
    },
    Hosted {
        api_key: String,
        base_url: String,
        model: String,
        http: HttpOptions,
    },
    Offline {
        model: String,
        batch_size: usize,
    },
}

impl fmt::Debug for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbeddingProvider::Local { url, model, .. } => f
                .debug_struct("Local")
                .field("url", url)
                .field("model", model)
                .finish(),
            EmbeddingProvider::Hosted {
                base_url, model, ..
            } => f
                .debug_struct("Hosted")
                .field("base_url", base_url)
                .field("model", model)
                .finish_non_exhaustive(),
            EmbeddingProvider::Offline { model, .. } => {
                f.debug_struct("Offline").field("model", model).finish()
            }
        }
    }
}

/// Pick the embedding provider for the given settings.
///
/// Precedence:
/// 1. local endpoint and model configured → `Local`
/// 2. hosted key configured and not the placeholder → `Hosted`
/// 3. otherwise → `Offline` with `config.offline_model`
pub fn select_embedding_provider(
    settings: &ProviderSettings,
    config: &EmbeddingConfig,
) -> EmbeddingProvider {
    let http = HttpOptions {
        timeout_secs: config.timeout_secs,
        max_retries: config.max_retries,
    };

    if let Some((url, model)) = settings.local_embedding() {
        EmbeddingProvider::Local {
            url: url.to_string(),
            model: model.to_string(),
            http,
        }
    } else if let Some(api_key) = settings.hosted_api_key() {
        EmbeddingProvider::Hosted {
            api_key: api_key.to_string(),
            base_url: config.hosted_base_url.clone(),
            model: config.hosted_model.clone(),
            http,
        }
    } else {
        EmbeddingProvider::Offline {
            model: config.offline_model.clone(),
            batch_size: config.batch_size,
        }
    }
}

impl EmbeddingProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            EmbeddingProvider::Local { .. } => ProviderKind::Local,
            EmbeddingProvider::Hosted { .. } => ProviderKind::Hosted,
            EmbeddingProvider::Offline { .. } => ProviderKind::Offline,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            EmbeddingProvider::Local { model, .. }
            | EmbeddingProvider::Hosted { model, .. }
            | EmbeddingProvider::Offline { model, .. } => model,
        }
    }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
    fn fingerprint(&self) -> ProviderFingerprint {
        ProviderFingerprint {
            provider: self.kind(),
            model: self.model_name().to_string(),
        }
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match self {
            EmbeddingProvider::Local { url, model, http } => {
                embed_ollama(url, model, *http, texts).await?
            }
            EmbeddingProvider::Hosted {
                api_key,
                base_url,
                model,
                http,
            } => embed_openai(api_key, base_url, model, *http, texts).await?,
            EmbeddingProvider::Offline { model, batch_size } => {
                embed_offline(model, *batch_size, texts).await?
            }
        };

        if vectors.len() != texts.len() {
            return Err(RagError::provider(
                self.kind().as_str(),
                format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    vectors.len()
                ),
            ));
        }
        Ok(vectors)
    }
}

// ============ Local (Ollama) ============

async fn embed_ollama(
    url: &str,
    model: &str,
    http: HttpOptions,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });
    let json = post_json("local", &join_url(url, "api/embed"), None, &body, http).await?;
    parse_ollama_response(&json)
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| RagError::provider("local", "invalid response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .ok_or_else(|| RagError::provider("local", "invalid response: embedding is not an array"))
                .and_then(|values| floats(values, "local"))
        })
        .collect()
}

// ============ Hosted (OpenAI) ============

async fn embed_openai(
    api_key: &str,
    base_url: &str,
    model: &str,
    http: HttpOptions,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    let body = serde_json::json!({
        "model": model,
        "input": texts,
    });
    let json = post_json(
        "hosted",
        &join_url(base_url, "embeddings"),
        Some(api_key),
        &body,
        http,
    )
    .await?;
    parse_openai_response(&json)
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::provider("hosted", "invalid response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| RagError::provider("hosted", "invalid response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, floats(embedding, "hosted")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn floats(values: &[serde_json::Value], provider: &str) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RagError::provider(provider, "invalid response: non-numeric embedding value"))
        })
        .collect()
}

// ============ Offline ============

async fn embed_offline(model: &str, batch_size: usize, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if model == hashing::HASHING_MODEL {
        return Ok(texts.iter().map(|t| hashing::embed(t)).collect());
    }
    embed_fastembed(model, batch_size, texts).await
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => Err(RagError::InvalidConfig(format!(
            "unknown offline embedding model '{}'. Supported: all-minilm-l6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, multilingual-e5-small, {}",
            other,
            hashing::HASHING_MODEL
        ))),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
async fn embed_fastembed(model: &str, batch_size: usize, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let fastembed_model = config_to_fastembed_model(model)?;
    let texts = texts.to_vec();

    tokio::task::spawn_blocking(move || {
        let mut model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
        )
        .map_err(|e| RagError::provider("offline", format!("failed to initialize model: {}", e)))?;

        model
            .embed(texts, Some(batch_size))
            .map_err(|e| RagError::provider("offline", format!("embedding failed: {}", e)))
    })
    .await
    .map_err(|e| RagError::provider("offline", e))?
}

#[cfg(not(feature = "local-embeddings-fastembed"))]
async fn embed_fastembed(model: &str, _batch_size: usize, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
    Err(RagError::InvalidConfig(format!(
        "offline embedding model '{}' requires --features local-embeddings-fastembed; \
         use offline_model = \"{}\" otherwise",
        model,
        hashing::HASHING_MODEL
    )))
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes.
///
/// ```rust
/// use product_query_bot::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode bytes produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, or a zero-magnitude vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_settings() -> ProviderSettings {
        ProviderSettings {
            local_llm_url: Some("http://localhost:11434".to_string()),
            local_llm_model: Some("llama3".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_local_when_url_and_model_set() {
        let settings = ProviderSettings {
            openai_api_key: Some("sk-real".to_string()),
            ..local_settings()
        };
        let provider = select_embedding_provider(&settings, &EmbeddingConfig::default());
        assert_eq!(provider.kind(), ProviderKind::Local);
        assert_eq!(provider.model_name(), "llama3");
    }

    #[test]
    fn test_select_hosted_with_real_key() {
        let settings = ProviderSettings {
            openai_api_key: Some("sk-real".to_string()),
            ..Default::default()
        };
        let provider = select_embedding_provider(&settings, &EmbeddingConfig::default());
        assert_eq!(provider.kind(), ProviderKind::Hosted);
        assert_eq!(provider.model_name(), "text-embedding-ada-002");
    }

    #[test]
    fn test_select_offline_without_credentials() {
        let settings = ProviderSettings {
            openai_api_key: Some(crate::config::PLACEHOLDER_API_KEY.to_string()),
            local_llm_url: Some("http://localhost:11434".to_string()),
            ..Default::default()
        };
        let provider = select_embedding_provider(&settings, &EmbeddingConfig::default());
        assert_eq!(
            provider.fingerprint(),
            ProviderFingerprint {
                provider: ProviderKind::Offline,
                model: "all-minilm-l6-v2".to_string(),
            }
        );
    }

    #[test]
    fn test_selection_is_deterministic() {
        let config = EmbeddingConfig::default();
        let a = select_embedding_provider(&local_settings(), &config);
        let b = select_embedding_provider(&local_settings(), &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_debug_hides_api_key() {
        let settings = ProviderSettings {
            openai_api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let provider = select_embedding_provider(&settings, &EmbeddingConfig::default());
        assert!(!format!("{:?}", provider).contains("sk-secret"));
    }

    #[tokio::test]
    async fn test_offline_hashing_embeds_in_order() {
        let provider = EmbeddingProvider::Offline {
            model: hashing::HASHING_MODEL.to_string(),
            batch_size: 8,
        };
        let texts = vec!["tent".to_string(), "jacket".to_string()];
        let vectors = provider.embed_texts(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], hashing::embed("tent"));
        assert_eq!(vectors[1], hashing::embed("jacket"));
        assert_eq!(provider.embed_query("tent").await.unwrap(), vectors[0]);
    }

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_response_missing_data() {
        let err = parse_openai_response(&serde_json::json!({ "error": "nope" })).unwrap_err();
        assert!(matches!(err, RagError::ProviderInvocation { .. }));
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({ "embeddings": [[0.5, 0.25], [1.0, 2.0]] });
        let vectors = parse_ollama_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![0.5, 0.25], vec![1.0, 2.0]]);

        let bad = serde_json::json!({ "embeddings": [["x"]] });
        assert!(parse_ollama_response(&bad).is_err());
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
