//! # Language Model Collaborators
//!
//! This crate holds everything that talks to a language model on behalf of
//! a paper tree:
//!
//! - **Contracts**: [`LanguageModel`] for generation, [`EmbeddingProvider`] for vectors
//! - **Ollama**: an HTTP client implementing both contracts
//! - **Retry**: bounded retries with per-call deadlines and exponential backoff
//! - **Summary Cache**: node summaries keyed by body fingerprint
//! - **Summarization**: concurrent, cancellable summarization of whole trees
//! - **Prompts**: node summary, paper summary, citation analysis and question answering
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Model Collaborators                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  OllamaClient ──► RetryingModel ──► dyn LanguageModel           │
//! │                                            │                    │
//! │                                            ▼                    │
//! │  Tree ──► Summarizer ──► SummaryCache ──► SummaryReport         │
//! │                              │                                  │
//! │                              ▼                                  │
//! │                     summaries.json                              │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod ollama;
pub mod prompt;
pub mod provider;
pub mod retry;
pub mod similarity;
pub mod summarize;

pub use cache::{CacheStats, SummaryCache, SummaryEntry, SummaryKey};
pub use error::{LlmError, Result};
pub use ollama::OllamaClient;
pub use prompt::Prompt;
pub use provider::{EmbeddingProvider, GenerationConfig, LanguageModel, compose_prompt};
pub use retry::{RetryPolicy, RetryingModel};
pub use similarity::cosine_similarity;
pub use summarize::{NodeSummary, SummaryOutcome, SummaryReport, Summarizer};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
