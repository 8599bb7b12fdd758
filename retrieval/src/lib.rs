//! # Subtree Retrieval
//!
//! This crate answers queries against paper trees with budgeted context:
//!
//! - **Scoring**: keyword and embedding relevance of individual nodes
//! - **Bundles**: a node with its descendants, ancestor path and child headings
//! - **Budgets**: character or token limits with a fixed truncation order
//! - **Collections**: concurrent querying across many documents
//! - **Configuration**: one TOML file for storage, retrieval, model and summaries
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Subtree Retrieval                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │   Keyword    │  │   Semantic   │  │   Summary    │           │
//! │  │   Scorer     │  │   Scorer     │  │   Report     │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! │         │                │                  │                   │
//! │         └────────────────┼──────────────────┘                   │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │   Subtree    │  per document                 │
//! │                  │  Retriever   │                               │
//! │                  └──────────────┘                               │
//! │                          │                                      │
//! │                          ▼                                      │
//! │                  ┌──────────────┐                               │
//! │                  │  Document    │  merge, re-rank, re-budget    │
//! │                  │  Collection  │                               │
//! │                  └──────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use paperindex_retrieval::{Budget, DocumentCollection, KeywordScorer};
//!
//! let mut collection = DocumentCollection::new();
//! collection.build_all(records);
//!
//! let result = collection
//!     .query("scaled dot-product attention", Arc::new(KeywordScorer::default()), 5, Budget::tokens(1_000))
//!     .await?;
//! println!("{}", result.render());
//! ```

pub mod budget;
pub mod bundle;
pub mod collection;
pub mod config;
pub mod engine;
pub mod error;
pub mod scoring;

pub use budget::{Budget, BudgetUnit};
pub use bundle::{BundleSection, ContextBundle};
pub use collection::{BuildSummary, DocumentCollection, DocumentSource};
pub use config::{LlmConfig, PaperIndexConfig, RetrievalConfig, SummaryConfig};
pub use engine::{Answer, DocumentFailure, RetrievalResult, SubtreeRetriever};
pub use error::{Result, RetrievalError};
pub use scoring::{KeywordScorer, RelevanceScorer, SemanticScorer};
