use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

use product_query_bot::config::{Config, DEFAULT_APOLOGY};
use product_query_bot::embedding::{
    hashing, Embedder, EmbeddingProvider, ProviderFingerprint, ProviderKind,
};
use product_query_bot::error::{RagError, Result};
use product_query_bot::generation::{GenerationProvider, Generator, GroundingPrompt};
use product_query_bot::index::{build_index, load_index, SharedIndex};
use product_query_bot::models::{PipelineStage, PipelineState};
use product_query_bot::pipeline::{Pipeline, ProviderResolver};

/// Hashing embedder that counts invocations.
struct CountingEmbedder {
    calls: Arc<AtomicUsize>,
    model: String,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn fingerprint(&self) -> ProviderFingerprint {
        ProviderFingerprint {
            provider: ProviderKind::Offline,
            model: self.model.clone(),
        }
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| hashing::embed(t)).collect())
    }
}

/// Generator that counts invocations and echoes the context.
struct CountingGenerator {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Generator for CountingGenerator {
    fn fingerprint(&self) -> ProviderFingerprint {
        ProviderFingerprint {
            provider: ProviderKind::Local,
            model: "mock".to_string(),
        }
    }

    async fn generate(&self, prompt: &GroundingPrompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Answer based on: {}", prompt.context))
    }
}

#[derive(Default)]
struct MockResolver {
    embed_calls: Arc<AtomicUsize>,
    generate_calls: Arc<AtomicUsize>,
    resolutions: Arc<AtomicUsize>,
    embedding_model: Option<String>,
}

impl MockResolver {
    fn provider_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst) + self.generate_calls.load(Ordering::SeqCst)
    }
}

impl ProviderResolver for MockResolver {
    fn embedder(&self) -> Box<dyn Embedder> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        Box::new(CountingEmbedder {
            calls: self.embed_calls.clone(),
            model: self
                .embedding_model
                .clone()
                .unwrap_or_else(|| hashing::HASHING_MODEL.to_string()),
        })
    }

    fn generator(&self) -> Box<dyn Generator> {
        self.resolutions.fetch_add(1, Ordering::SeqCst);
        Box::new(CountingGenerator {
            calls: self.generate_calls.clone(),
        })
    }
}

fn write_two_product_corpus(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("product1.txt"),
        "Summit Trail Jacket. This jacket is lightweight, waterproof and breathable. \
         Sealed seams keep rain out on long hikes.",
    )
    .unwrap();
    fs::write(
        dir.join("product2.txt"),
        "Barista Pro Espresso Machine. Fifteen bar pump, steam wand for milk, \
         and a stainless steel body.",
    )
    .unwrap();
}

fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.index.corpus_dir = root.join("products");
    config.index.store_path = root.join("vector_store");
    config.embedding.offline_model = hashing::HASHING_MODEL.to_string();
    config
}

async fn build_fixture(root: &Path) -> (Config, SharedIndex) {
    let config = test_config(root);
    write_two_product_corpus(&config.index.corpus_dir);
    let embedder = EmbeddingProvider::Offline {
        model: hashing::HASHING_MODEL.to_string(),
        batch_size: 8,
    };
    build_index(
        &config.index.corpus_dir,
        &config.index.store_path,
        &config,
        &embedder,
    )
    .await
    .unwrap();
    let index = SharedIndex::new(Some(load_index(&config.index.store_path).unwrap()));
    (config, index)
}

#[tokio::test]
async fn test_scenario_a_retrieves_matching_product() {
    let tmp = TempDir::new().unwrap();
    let (config, index) = build_fixture(tmp.path()).await;
    let resolver = Arc::new(MockResolver::default());
    let pipeline = Pipeline::new(&config, index, resolver.clone());

    let state = pipeline
        .run("Which product is lightweight, waterproof?")
        .await
        .unwrap();

    assert_eq!(state.stage, PipelineStage::Done);
    assert!(!state.documents.is_empty());
    assert!(state.documents.len() <= config.retrieval.top_k);
    assert_eq!(state.documents[0].source_id, "product1.txt");
    assert!(state.response.contains("lightweight, waterproof"));
    assert_eq!(resolver.generate_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scenario_b_missing_index() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());

    let err = load_index(&config.index.store_path).unwrap_err();
    assert!(matches!(err, RagError::IndexNotFound { .. }));

    let resolver = Arc::new(MockResolver::default());
    let pipeline = Pipeline::new(&config, SharedIndex::default(), resolver.clone());
    let err = pipeline.run("anything").await.unwrap_err();
    assert!(matches!(err, RagError::IndexNotFound { .. }));
    assert_eq!(resolver.provider_calls(), 0);
}

#[tokio::test]
async fn test_scenario_c_empty_documents_invoke_no_provider() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let resolver = Arc::new(MockResolver::default());
    let pipeline = Pipeline::new(&config, SharedIndex::default(), resolver.clone());

    let state = pipeline
        .generate(PipelineState::with_documents("Do you sell kayaks?", Vec::new()))
        .await
        .unwrap();

    assert_eq!(state.response, DEFAULT_APOLOGY);
    assert_eq!(resolver.provider_calls(), 0);
    assert_eq!(resolver.resolutions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_retrieve_never_calls_generator() {
    let tmp = TempDir::new().unwrap();
    let (config, index) = build_fixture(tmp.path()).await;
    let resolver = Arc::new(MockResolver::default());
    let pipeline = Pipeline::new(&config, index, resolver.clone());

    let state = pipeline
        .retrieve(PipelineState::new("espresso machine"))
        .await
        .unwrap();

    assert_eq!(state.stage, PipelineStage::Retrieved);
    assert!(state.response.is_empty());
    assert_eq!(state.documents[0].source_id, "product2.txt");
    assert_eq!(resolver.embed_calls.load(Ordering::SeqCst), 1);
    assert_eq!(resolver.generate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_retrieve_then_generate_with_k_two() {
    let tmp = TempDir::new().unwrap();
    let (config, index) = build_fixture(tmp.path()).await;
    let resolver = Arc::new(MockResolver::default());
    let pipeline = Pipeline::new(&config, index, resolver).with_top_k(2);

    let state = pipeline
        .retrieve(PipelineState::new("Tell me about the jacket"))
        .await
        .unwrap();
    assert_eq!(state.documents.len(), 2);

    let state = pipeline.generate(state).await.unwrap();
    assert!(!state.response.is_empty());
    assert_ne!(state.response, DEFAULT_APOLOGY);
}

#[tokio::test]
async fn test_offline_fallback_end_to_end() {
    struct OfflineResolver;

    impl ProviderResolver for OfflineResolver {
        fn embedder(&self) -> Box<dyn Embedder> {
            Box::new(EmbeddingProvider::Offline {
                model: hashing::HASHING_MODEL.to_string(),
                batch_size: 8,
            })
        }

        fn generator(&self) -> Box<dyn Generator> {
            Box::new(GenerationProvider::OfflineFallback)
        }
    }

    let tmp = TempDir::new().unwrap();
    let (config, index) = build_fixture(tmp.path()).await;
    let pipeline = Pipeline::new(&config, index, Arc::new(OfflineResolver));

    let state = pipeline.run("waterproof jacket").await.unwrap();
    assert!(state.response.contains("offline fallback"));
    assert!(state.response.contains("Summit Trail Jacket"));
}

#[tokio::test]
async fn test_embedding_model_change_is_configuration_mismatch() {
    let tmp = TempDir::new().unwrap();
    let (config, index) = build_fixture(tmp.path()).await;
    let resolver = Arc::new(MockResolver {
        embedding_model: Some("all-minilm-l6-v2".to_string()),
        ..Default::default()
    });
    let pipeline = Pipeline::new(&config, index, resolver.clone());

    let err = pipeline.run("waterproof jacket").await.unwrap_err();
    assert!(matches!(err, RagError::ConfigurationMismatch { .. }));
    assert_eq!(resolver.provider_calls(), 0);
}

#[tokio::test]
async fn test_empty_index_yields_apology() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    fs::create_dir_all(&config.index.corpus_dir).unwrap();
    let embedder = EmbeddingProvider::Offline {
        model: hashing::HASHING_MODEL.to_string(),
        batch_size: 8,
    };
    build_index(
        &config.index.corpus_dir,
        &config.index.store_path,
        &config,
        &embedder,
    )
    .await
    .unwrap();

    let index = SharedIndex::new(Some(load_index(&config.index.store_path).unwrap()));
    let resolver = Arc::new(MockResolver::default());
    let pipeline = Pipeline::new(&config, index, resolver.clone());

    let state = pipeline.run("anything at all").await.unwrap();
    assert!(state.documents.is_empty());
    assert_eq!(state.response, DEFAULT_APOLOGY);
    assert_eq!(resolver.generate_calls.load(Ordering::SeqCst), 0);
}
