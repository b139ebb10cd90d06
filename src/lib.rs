//! Smriti - API-first memory backend for AI agents.
//!
//! Ingests raw agent interactions, enriches them (entity extraction,
//! summarization, embeddings), stores them in a private per-agent
//! partition, conditionally scrubs and shares them, and serves
//! semantic search, entity timelines, and daily logs. A background
//! miner distills recent interactions into draft lessons.

pub mod audit;
pub mod auth;
pub mod chunking;
pub mod config;
pub mod constants;
pub mod enrichment;
pub mod errors;
pub mod handlers;
pub mod lessons;
pub mod memory;
pub mod metrics;
pub mod middleware;
pub mod pipeline;
pub mod rate_limit;
pub mod retrieval;
pub mod tracing_setup;
pub mod validation;
pub mod vector_index;

pub use config::ServerConfig;
pub use errors::AppError;
pub use handlers::ServiceState;
