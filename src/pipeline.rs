//! Query pipeline: `Start → Retrieved → Done`.
//!
//! A run threads one [`PipelineState`] through two stages:
//!
//! 1. **retrieve** embeds the query with the currently selected embedding
//!    provider and takes the top-k chunks from the served index. It never
//!    touches a generation provider.
//! 2. **generate** answers from those chunks. With no chunks it returns the
//!    configured apology without resolving any provider.
//!
//! Any failure aborts the run with a single [`RagError`]; no partial state is
//! returned to the caller.
//!
//! Providers are obtained through a [`ProviderResolver`] on every stage
//! invocation, so a change to the environment between calls is honored.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Config, EmbeddingConfig, GenerationConfig, ProviderSettings};
use crate::embedding::{select_embedding_provider, Embedder};
use crate::error::{RagError, Result};
use crate::generation::{select_generation_provider, GenerationProvider, Generator, GroundingPrompt};
use crate::index::SharedIndex;
use crate::models::{PipelineStage, PipelineState};

/// Supplies the embedding and generation providers for one call.
pub trait ProviderResolver: Send + Sync {
    fn embedder(&self) -> Box<dyn Embedder>;
    fn generator(&self) -> Box<dyn Generator>;
}

/// Resolves providers from config, optionally merged with the environment.
#[derive(Debug, Clone)]
pub struct ConfiguredResolver {
    providers: ProviderSettings,
    embedding: EmbeddingConfig,
    generation: GenerationConfig,
    read_env: bool,
}

impl ConfiguredResolver {
    /// Merge the process environment over `[providers]` at every call.
    pub fn from_config(config: &Config) -> Self {
        Self {
            providers: config.providers.clone(),
            embedding: config.embedding.clone(),
            generation: config.generation.clone(),
            read_env: true,
        }
    }

    /// Use `[providers]` exactly as given, ignoring the environment.
    pub fn fixed(config: &Config) -> Self {
        Self {
            read_env: false,
            ..Self::from_config(config)
        }
    }

    fn settings(&self) -> ProviderSettings {
        if self.read_env {
            self.providers.resolve()
        } else {
            self.providers.clone()
        }
    }

    pub fn embedding_provider(&self) -> crate::embedding::EmbeddingProvider {
        select_embedding_provider(&self.settings(), &self.embedding)
    }

    pub fn generation_provider(&self) -> GenerationProvider {
        select_generation_provider(&self.settings(), &self.generation)
    }
}

impl ProviderResolver for ConfiguredResolver {
    fn embedder(&self) -> Box<dyn Embedder> {
        Box::new(self.embedding_provider())
    }

    fn generator(&self) -> Box<dyn Generator> {
        Box::new(self.generation_provider())
    }
}

/// Runs queries against the shared index.
#[derive(Clone)]
pub struct Pipeline {
    index: SharedIndex,
    resolver: Arc<dyn ProviderResolver>,
    top_k: usize,
    apology: String,
    store_path: PathBuf,
}

impl Pipeline {
    pub fn new(config: &Config, index: SharedIndex, resolver: Arc<dyn ProviderResolver>) -> Self {
        Self {
            index,
            resolver,
            top_k: config.retrieval.top_k.max(1),
            apology: config.generation.apology.clone(),
            store_path: config.index.store_path.clone(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Run both stages for `query`.
    pub async fn run(&self, query: &str) -> Result<PipelineState> {
        let start = Instant::now();
        let state = self.retrieve(PipelineState::new(query)).await?;
        let state = self.generate(state).await?;
        tracing::info!(
            documents = state.documents.len(),
            response_chars = state.response.chars().count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pipeline run complete"
        );
        Ok(state)
    }

    /// Fill `documents` with the top-k chunks for `state.query`.
    ///
    /// # Errors
    ///
    /// - [`RagError::IndexNotFound`] if no index is loaded.
    /// - [`RagError::ConfigurationMismatch`] if the current embedding
    ///   provider or its vector length differs from the index.
    /// - [`RagError::ProviderInvocation`] if embedding the query fails.
    pub async fn retrieve(&self, mut state: PipelineState) -> Result<PipelineState> {
        let index = self.index.current().ok_or_else(|| RagError::IndexNotFound {
            path: self.store_path.clone(),
        })?;

        let embedder = self.resolver.embedder();
        let current = embedder.fingerprint();
        if &current != index.fingerprint() {
            return Err(RagError::ConfigurationMismatch {
                indexed: index.fingerprint().to_string(),
                current: current.to_string(),
            });
        }

        state.documents = if index.is_empty() {
            Vec::new()
        } else {
            let query_vec = embedder.embed_query(&state.query).await?;
            if query_vec.len() != index.dims() {
                return Err(RagError::ConfigurationMismatch {
                    indexed: format!("{} ({} dims)", index.fingerprint(), index.dims()),
                    current: format!("{} ({} dims)", current, query_vec.len()),
                });
            }
            index
                .search(&query_vec, self.top_k)
                .into_iter()
                .map(|hit| hit.chunk)
                .collect()
        };

        tracing::info!(
            documents = state.documents.len(),
            top_k = self.top_k,
            "retrieved documents"
        );
        state.response.clear();
        state.stage = PipelineStage::Retrieved;
        Ok(state)
    }

    /// Produce `response` from `state.documents`.
    pub async fn generate(&self, mut state: PipelineState) -> Result<PipelineState> {
        if state.documents.is_empty() {
            tracing::info!("no documents retrieved, returning apology");
            state.response = self.apology.clone();
            state.stage = PipelineStage::Done;
            return Ok(state);
        }

        let generator = self.resolver.generator();
        let prompt = GroundingPrompt::new(&state.query, &state.documents);
        tracing::debug!(
            provider = %generator.fingerprint(),
            context_chars = prompt.context.chars().count(),
            "generating response"
        );

        state.response = generator.generate(&prompt).await?;
        state.stage = PipelineStage::Done;
        Ok(state)
    }
}
