//! Configuration for indexing, summarization and retrieval.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use paperindex_doc_tree::TreeStore;
use paperindex_llm::{
    GenerationConfig, LanguageModel, OllamaClient, RetryPolicy, RetryingModel, SummaryCache,
    Summarizer,
};
use serde::{Deserialize, Serialize};

use crate::budget::Budget;
use crate::error::{Result, RetrievalError};
use crate::scoring::KeywordScorer;

/// Top-level configuration, usually read from `paperindex.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperIndexConfig {
    /// Directory holding persisted trees and the summary cache.
    pub storage_dir: PathBuf,

    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub summary: SummaryConfig,
}

impl PaperIndexConfig {
    /// Create a new configuration with default values.
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            summary: SummaryConfig::default(),
        }
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RetrievalError::Config(e.to_string()))
    }

    /// Read a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| RetrievalError::Config(e.to_string()))
    }

    pub fn with_retrieval(mut self, config: RetrievalConfig) -> Self {
        self.retrieval = config;
        self
    }

    pub fn with_llm(mut self, config: LlmConfig) -> Self {
        self.llm = config;
        self
    }

    pub fn with_summary(mut self, config: SummaryConfig) -> Self {
        self.summary = config;
        self
    }

    /// Where persisted trees live.
    pub fn trees_dir(&self) -> PathBuf {
        self.storage_dir.join("trees")
    }

    pub fn tree_store(&self) -> TreeStore {
        TreeStore::new(self.trees_dir())
    }

    pub fn summary_cache_path(&self) -> PathBuf {
        self.storage_dir.join("summaries.json")
    }

    /// Build a summarizer over the configured model and summary cache.
    pub async fn summarizer(&self) -> Result<Summarizer> {
        let cache = if self.summary.persist {
            SummaryCache::with_persistence(self.summary_cache_path()).await?
        } else {
            SummaryCache::new()
        };
        let cache = match self.summary.compute_timeout_secs {
            Some(secs) => cache.with_compute_timeout(Duration::from_secs(secs)),
            None => cache,
        };

        let model: Arc<dyn LanguageModel> = Arc::new(self.llm.client()?);
        Ok(Summarizer::new(model, Arc::new(cache))
            .with_generation_config(self.llm.generation.clone())
            .with_max_concurrency(self.summary.max_concurrency))
    }
}

impl Default for PaperIndexConfig {
    fn default() -> Self {
        Self::new(dirs::data_dir().unwrap_or_default().join("paperindex"))
    }
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Maximum number of bundles to return.
    pub top_k: usize,

    /// Size limit for the assembled context.
    pub budget: Budget,

    /// Nodes must score above this to be selected.
    pub min_score: f64,

    /// Keyword score for a query term in a title.
    pub title_weight: f64,

    /// Base keyword score for a query term in a body.
    pub body_weight: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            budget: Budget::default(),
            min_score: 0.0,
            title_weight: 2.0,
            body_weight: 1.0,
        }
    }
}

impl RetrievalConfig {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    /// Keyword scorer with the configured weights.
    pub fn keyword_scorer(&self) -> KeywordScorer {
        KeywordScorer::new(self.title_weight, self.body_weight)
    }
}

/// Configuration for the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,

    /// Transport timeout for one HTTP request, in seconds.
    pub request_timeout_secs: u64,

    pub retry: RetryPolicy,
    pub generation: GenerationConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: paperindex_llm::ollama::DEFAULT_BASE_URL.to_string(),
            model: paperindex_llm::ollama::DEFAULT_MODEL.to_string(),
            embedding_model: paperindex_llm::ollama::DEFAULT_MODEL.to_string(),
            request_timeout_secs: 120,
            retry: RetryPolicy::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Ollama client wrapped in the configured retry policy.
    pub fn client(&self) -> Result<RetryingModel<OllamaClient>> {
        let client = OllamaClient::new()
            .with_base_url(self.base_url.as_str())
            .with_model(self.model.as_str())
            .with_embedding_model(self.embedding_model.as_str())
            .with_timeout(Duration::from_secs(self.request_timeout_secs))?;
        Ok(RetryingModel::new(client, self.retry))
    }
}

/// Configuration for node summarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Summaries computed at once.
    pub max_concurrency: usize,

    /// Deadline for one summary, retries included.
    pub compute_timeout_secs: Option<u64>,

    /// Keep the summary cache on disk.
    pub persist: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_concurrency: paperindex_llm::summarize::DEFAULT_MAX_CONCURRENCY,
            compute_timeout_secs: None,
            persist: true,
        }
    }
}
