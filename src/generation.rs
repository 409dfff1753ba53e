//! Answer generation providers and the grounding prompt.
//!
//! [`GenerationProvider`] mirrors the embedding side with three arms:
//! - **`Local`**: Ollama-compatible `POST /api/chat`, non-streaming.
//! - **`Hosted`**: OpenAI `POST /v1/chat/completions`.
//! - **`OfflineFallback`**: no network; renders a fixed template around the
//!   retrieved context so the service stays usable without any model.
//!
//! Generation calls are never retried; a failed call fails the pipeline run.

use async_trait::async_trait;
use std::fmt;

use crate::config::{GenerationConfig, ProviderSettings};
use crate::embedding::{ProviderFingerprint, ProviderKind};
use crate::error::{RagError, Result};
use crate::http::{join_url, post_json, HttpOptions};
use crate::models::Chunk;

/// Model name reported by the offline fallback.
pub const OFFLINE_MODEL: &str = "offline-template";

pub const OFFLINE_RESPONSE_HEADER: &str =
    "Based on the retrieved product information, these are the most relevant details:";

pub const OFFLINE_RESPONSE_FOOTER: &str = "For more details, please consult the complete product \
     information. (Response generated by the offline fallback without a language model.)";

const SYSTEM_INSTRUCTION: &str = "You are a helpful product assistant. Use only the following \
     pieces of context to answer the user's question. If the context does not contain the \
     answer, say that there is insufficient information; do not try to make up an answer.";

/// The context block and question submitted to a generation provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundingPrompt {
    /// Retrieved chunk texts joined by a blank line, in retrieval order.
    pub context: String,
    pub query: String,
}

impl GroundingPrompt {
    pub fn new(query: &str, documents: &[Chunk]) -> Self {
        let context = documents
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            context,
            query: query.to_string(),
        }
    }

    /// The full prompt text sent to model-backed providers.
    pub fn render(&self) -> String {
        format!(
            "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
            SYSTEM_INSTRUCTION, self.context, self.query
        )
    }
}

/// Capability interface for producing an answer from a grounding prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    fn fingerprint(&self) -> ProviderFingerprint;

    async fn generate(&self, prompt: &GroundingPrompt) -> Result<String>;
}

#[derive(Clone, PartialEq)]
pub enum GenerationProvider {
    Local {
        url: String,
        model: String,
        temperature: f32,
        http: HttpOptions,
    },
    Hosted {
        api_key: String,
        base_url: String,
        model: String,
        temperature: f32,
        http: HttpOptions,
    },
    OfflineFallback,
}

impl fmt::Debug for GenerationProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationProvider::Local { url, model, .. } => f
                .debug_struct("Local")
                .field("url", url)
                .field("model", model)
                .finish_non_exhaustive(),
            GenerationProvider::Hosted {
                base_url, model, ..
            } => f
                .debug_struct("Hosted")
                .field("base_url", base_url)
                .field("model", model)
                .finish_non_exhaustive(),
            GenerationProvider::OfflineFallback => f.write_str("OfflineFallback"),
        }
    }
}

/// Pick the generation provider for the given settings.
///
/// Precedence:
/// 1. local endpoint and model configured → `Local`
/// 2. hosted key configured and not the placeholder → `Hosted`
/// 3. otherwise → `OfflineFallback`
pub fn select_generation_provider(
    settings: &ProviderSettings,
    config: &GenerationConfig,
) -> GenerationProvider {
    let http = HttpOptions {
        timeout_secs: config.timeout_secs,
        max_retries: 0,
    };

    if let Some((url, model)) = settings.local_generation() {
        GenerationProvider::Local {
            url: url.to_string(),
            model: model.to_string(),
            temperature: config.temperature,
            http,
        }
    } else if let Some(api_key) = settings.hosted_api_key() {
        GenerationProvider::Hosted {
            api_key: api_key.to_string(),
            base_url: config.hosted_base_url.clone(),
            model: config.hosted_model.clone(),
            temperature: config.temperature,
            http,
        }
    } else {
        GenerationProvider::OfflineFallback
    }
}

impl GenerationProvider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            GenerationProvider::Local { .. } => ProviderKind::Local,
            GenerationProvider::Hosted { .. } => ProviderKind::Hosted,
            GenerationProvider::OfflineFallback => ProviderKind::Offline,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            GenerationProvider::Local { model, .. } | GenerationProvider::Hosted { model, .. } => {
                model
            }
            GenerationProvider::OfflineFallback => OFFLINE_MODEL,
        }
    }
}

#[async_trait]
impl Generator for GenerationProvider {
    fn fingerprint(&self) -> ProviderFingerprint {
        ProviderFingerprint {
            provider: self.kind(),
            model: self.model_name().to_string(),
        }
    }

    async fn generate(&self, prompt: &GroundingPrompt) -> Result<String> {
        match self {
            GenerationProvider::Local {
                url,
                model,
                temperature,
                http,
            } => {
                let body = serde_json::json!({
                    "model": model,
                    "messages": [{ "role": "user", "content": prompt.render() }],
                    "stream": false,
                    "options": { "temperature": temperature },
                });
                let json = post_json("local", &join_url(url, "api/chat"), None, &body, *http).await?;
                parse_ollama_chat(&json)
            }
            GenerationProvider::Hosted {
                api_key,
                base_url,
                model,
                temperature,
                http,
            } => {
                let body = serde_json::json!({
                    "model": model,
                    "messages": [{ "role": "user", "content": prompt.render() }],
                    "temperature": temperature,
                });
                let json = post_json(
                    "hosted",
                    &join_url(base_url, "chat/completions"),
                    Some(api_key),
                    &body,
                    *http,
                )
                .await?;
                parse_openai_chat(&json)
            }
            GenerationProvider::OfflineFallback => Ok(offline_response(prompt)),
        }
    }
}

/// The fixed template produced without any model.
pub fn offline_response(prompt: &GroundingPrompt) -> String {
    format!(
        "{}\n\n{}\n\n{}",
        OFFLINE_RESPONSE_HEADER, prompt.context, OFFLINE_RESPONSE_FOOTER
    )
}

fn parse_ollama_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::provider("local", "invalid response: missing message.content"))
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            RagError::provider("hosted", "invalid response: missing choices[0].message.content")
        })
}
