//! Concurrent node summarization through the summary cache.

use std::collections::HashSet;
use std::sync::Arc;

use paperindex_doc_tree::{CachedSummary, Node, NodeId, Tree};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cache::SummaryCache;
use crate::error::{LlmError, Result};
use crate::prompt;
use crate::provider::{GenerationConfig, LanguageModel};

/// Default number of summaries computed at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Summary state of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum SummaryOutcome {
    /// The summary text.
    Ready(String),
    /// Summarization failed; carries the error message.
    Failed(String),
}

impl SummaryOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Ready(text) => Some(text),
            Self::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Outcome for one node, with the fingerprint of the body it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node_id: NodeId,
    pub fingerprint: String,
    pub outcome: SummaryOutcome,
}

/// Outcomes of summarizing a tree, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub summaries: Vec<NodeSummary>,
}

impl SummaryReport {
    /// Outcome for a node, if it was summarized.
    pub fn get(&self, node_id: &str) -> Option<&SummaryOutcome> {
        self.summaries
            .iter()
            .find(|s| s.node_id == node_id)
            .map(|s| &s.outcome)
    }

    /// Nodes whose summarization failed.
    pub fn failures(&self) -> impl Iterator<Item = &NodeSummary> {
        self.summaries.iter().filter(|s| s.outcome.is_failed())
    }

    /// Attach every ready summary to `tree`. Returns how many nodes changed.
    pub fn apply(&self, tree: &mut Tree) -> paperindex_doc_tree::Result<usize> {
        let mut changed = 0;
        for summary in &self.summaries {
            if let SummaryOutcome::Ready(text) = &summary.outcome {
                let cached = CachedSummary::new(text.as_str(), summary.fingerprint.as_str());
                if tree.attach_summary(&summary.node_id, cached)? {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }
}

/// Produces node summaries with a language model, memoized in a
/// [`SummaryCache`].
#[derive(Clone)]
pub struct Summarizer {
    model: Arc<dyn LanguageModel>,
    cache: Arc<SummaryCache>,
    config: GenerationConfig,
    max_concurrency: usize,
}

impl Summarizer {
    pub fn new(model: Arc<dyn LanguageModel>, cache: Arc<SummaryCache>) -> Self {
        Self {
            model,
            cache,
            config: GenerationConfig::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<SummaryCache> {
        &self.cache
    }

    /// Summarize one node, reusing a cached summary of the same body.
    pub async fn summarize_node(
        &self,
        document_id: &str,
        node: &Node,
        cancel: &CancellationToken,
    ) -> Result<String> {
        summarize_one(
            self.model.as_ref(),
            &self.cache,
            &self.config,
            document_id,
            node,
            cancel,
        )
        .await
    }

    /// Summarize every node with a non-blank body.
    ///
    /// A node whose summarization fails is reported as
    /// [`SummaryOutcome::Failed`] while the others continue. Cancellation
    /// aborts the outstanding work and returns [`LlmError::Cancelled`].
    pub async fn summarize_tree(
        &self,
        document_id: &str,
        tree: &Tree,
        cancel: &CancellationToken,
    ) -> Result<SummaryReport> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut pending: HashSet<NodeId> = HashSet::new();

        for (index, node) in tree.iter().enumerate() {
            if node.body.trim().is_empty() {
                continue;
            }
            pending.insert(node.id.clone());

            let node = node.clone();
            let model = Arc::clone(&self.model);
            let cache = Arc::clone(&self.cache);
            let config = self.config.clone();
            let document_id = document_id.to_string();
            let cancel = cancel.clone();
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let result = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(_permit) => {
                            summarize_one(model.as_ref(), &cache, &config, &document_id, &node, &cancel)
                                .await
                        }
                        Err(_) => Err(LlmError::Cancelled),
                    },
                    () = cancel.cancelled() => Err(LlmError::Cancelled),
                };
                (index, node, result)
            });
        }

        let mut outcomes: Vec<(usize, NodeSummary)> = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next().await {
            let (index, node, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!("Summary task for {document_id} did not complete: {e}");
                    continue;
                }
            };
            pending.remove(&node.id);

            let outcome = match result {
                Ok(text) => SummaryOutcome::Ready(text),
                Err(LlmError::Cancelled) => {
                    tasks.abort_all();
                    return Err(LlmError::Cancelled);
                }
                Err(e) => {
                    warn!("Failed to summarize {document_id}/{}: {e}", node.id);
                    SummaryOutcome::Failed(e.to_string())
                }
            };
            outcomes.push((
                index,
                NodeSummary {
                    fingerprint: node.fingerprint(),
                    node_id: node.id,
                    outcome,
                },
            ));
        }

        // Tasks that panicked never reported back.
        for node_id in pending {
            let index = tree.doc_order(&node_id).unwrap_or(usize::MAX);
            let fingerprint = tree.get(&node_id).map(Node::fingerprint).unwrap_or_default();
            outcomes.push((
                index,
                NodeSummary {
                    node_id,
                    fingerprint,
                    outcome: SummaryOutcome::Failed("summary task aborted".to_string()),
                },
            ));
        }

        outcomes.sort_by_key(|(index, _)| *index);
        let report = SummaryReport {
            summaries: outcomes.into_iter().map(|(_, summary)| summary).collect(),
        };
        info!(
            "Summarized {} nodes of {document_id} ({} failed)",
            report.summaries.len(),
            report.failures().count()
        );
        Ok(report)
    }

    /// A few sentences on the whole paper, from its outline and any
    /// attached node summaries.
    pub async fn summarize_paper(&self, tree: &Tree) -> Result<String> {
        self.run_paper_prompt(prompt::paper_summary(tree)).await
    }

    /// A one-sentence description of the paper's contribution.
    pub async fn describe_document(&self, tree: &Tree) -> Result<String> {
        self.run_paper_prompt(prompt::document_description(tree)).await
    }

    /// How the paper's sections lean on its bibliography.
    pub async fn analyze_citations(&self, tree: &Tree) -> Result<String> {
        self.run_paper_prompt(prompt::citation_analysis(tree)).await
    }

    async fn run_paper_prompt(&self, prompt: prompt::Prompt) -> Result<String> {
        let text = prompt.run(self.model.as_ref(), &self.config).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("empty response".to_string()));
        }
        Ok(text.to_string())
    }
}

async fn summarize_one(
    model: &dyn LanguageModel,
    cache: &SummaryCache,
    config: &GenerationConfig,
    document_id: &str,
    node: &Node,
    cancel: &CancellationToken,
) -> Result<String> {
    cache
        .get_or_compute_cancellable(
            document_id,
            node,
            || async move {
                let summary = prompt::node_summary(node).run(model, config).await?;
                if summary.trim().is_empty() {
                    return Err(LlmError::InvalidResponse("empty summary".to_string()));
                }
                Ok(summary)
            },
            cancel,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paperindex_doc_tree::{DocumentMeta, Segment, TreeBuilder};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Echoes the first word of the section text; fails on bodies containing
    /// "FAIL".
    #[derive(Default)]
    struct EchoModel {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(
            &self,
            _prompt: &str,
            context: &str,
            _config: &GenerationConfig,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let text = context.rsplit("Section Text: ").next().unwrap_or_default();
            if text.contains("FAIL") {
                return Err(LlmError::Api {
                    status: 400,
                    message: "rejected".to_string(),
                });
            }
            Ok(format!("About {}", text.split_whitespace().next().unwrap_or_default()))
        }
    }

    fn tree(method_body: &str) -> Tree {
        let segments = vec![
            Segment::new(1, "Intro", "Transformers replace recurrence."),
            Segment::new(1, "Method", method_body),
            Segment::new(2, "Heads", "Multi-head attention."),
            Segment::new(1, "Empty", "   "),
        ];
        TreeBuilder::new()
            .build(&segments, DocumentMeta::titled("Paper"), Vec::new())
            .unwrap()
            .tree
    }

    fn summarizer(model: &Arc<EchoModel>) -> Summarizer {
        let model: Arc<dyn LanguageModel> = Arc::clone(model) as Arc<dyn LanguageModel>;
        Summarizer::new(model, Arc::new(SummaryCache::new())).with_max_concurrency(2)
    }

    #[tokio::test]
    async fn test_paper_level_prompts_reach_model() {
        let model = Arc::new(EchoModel::default());
        let summarizer = summarizer(&model);
        let tree = tree("Scaled dot-product attention.");

        assert_eq!(summarizer.summarize_paper(&tree).await.unwrap(), "About You");
        assert_eq!(summarizer.describe_document(&tree).await.unwrap(), "About You");
        assert_eq!(summarizer.analyze_citations(&tree).await.unwrap(), "About You");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
        assert!(summarizer.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_summarize_tree_in_document_order() {
        let model = Arc::new(EchoModel::default());
        let report = summarizer(&model)
            .summarize_tree("paper", &tree("Scaled dot-product attention."), &CancellationToken::new())
            .await
            .unwrap();

        let ids: Vec<&str> = report.summaries.iter().map(|s| s.node_id.as_str()).collect();
        assert_eq!(ids, vec!["0.0", "0.1", "0.1.0"]);
        assert_eq!(
            report.get("0.1"),
            Some(&SummaryOutcome::Ready("About Scaled".to_string()))
        );
        assert_eq!(report.get("0.2"), None);
        assert!(model.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let model = Arc::new(EchoModel::default());
        let report = summarizer(&model)
            .summarize_tree("paper", &tree("FAIL here"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.get("0.1").unwrap().is_failed());
        assert_eq!(report.get("0.0").and_then(SummaryOutcome::text), Some("About Transformers"));
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_hits_cache_and_apply_is_idempotent() {
        let model = Arc::new(EchoModel::default());
        let summarizer = summarizer(&model);
        let mut tree = tree("Scaled dot-product attention.");
        let cancel = CancellationToken::new();

        let first = summarizer.summarize_tree("paper", &tree, &cancel).await.unwrap();
        let second = summarizer.summarize_tree("paper", &tree, &cancel).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);

        assert_eq!(first.apply(&mut tree).unwrap(), 3);
        assert_eq!(first.apply(&mut tree).unwrap(), 0);
        assert_eq!(tree.node("0.1.0").unwrap().fresh_summary(), Some("About Multi-head"));
    }

    #[tokio::test]
    async fn test_cancelled_run_writes_nothing() {
        let model = Arc::new(EchoModel::default());
        let summarizer = summarizer(&model);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = summarizer
            .summarize_tree("paper", &tree("Scaled dot-product attention."), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Cancelled));
        assert!(summarizer.cache().is_empty().await);
    }
}
