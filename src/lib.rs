//! # Product Query Bot
//!
//! Retrieval-augmented question answering over a directory of product
//! descriptions.
//!
//! Product text files are chunked, embedded, and persisted as a flat vector
//! index snapshot. Each query then runs a two-stage pipeline: retrieve the
//! nearest chunks, then generate an answer grounded in them with a local
//! model, a hosted model, or an offline template.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────┐   ┌──────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedding │──▶│ Vector Index │
//! │ corpus/  │   │ 1000/200│   │ provider  │   │   snapshot   │
//! └──────────┘   └─────────┘   └───────────┘   └──────┬───────┘
//!                                                     │
//!                        ┌────────────────────────────┤
//!                        ▼                            ▼
//!                 ┌────────────┐   retrieve    ┌────────────┐
//!                 │ CLI (pqb)  │──────────────▶│  Pipeline  │──▶ generate
//!                 │ HTTP server│               └────────────┘
//!                 └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pqb index                          # build ./vector_store from ./data/products
//! pqb query "Is the jacket waterproof?"
//! pqb serve                          # POST /query, POST /index, GET /health
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Documents, chunks, and pipeline state |
//! | [`error`] | Error taxonomy |
//! | [`loader`] | Corpus loading |
//! | [`chunk`] | Sliding-window chunking |
//! | [`embedding`] | Embedding providers and vector utilities |
//! | [`generation`] | Generation providers and the grounding prompt |
//! | [`index`] | Index build, snapshot persistence, and search |
//! | [`pipeline`] | Retrieve → generate controller |
//! | [`server`] | HTTP server |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generation;
mod http;
pub mod index;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod server;
