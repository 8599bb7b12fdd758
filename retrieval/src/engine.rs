//! Subtree retrieval over a single paper tree.

use std::cmp::Reverse;

use ordered_float::OrderedFloat;
use paperindex_doc_tree::Tree;
use paperindex_llm::{GenerationConfig, LanguageModel, SummaryReport, prompt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::budget::{Budget, BudgetUnit, fit};
use crate::bundle::ContextBundle;
use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::scoring::RelevanceScorer;

/// Bundles selected for a query, in rank order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub bundles: Vec<ContextBundle>,

    /// Whether any content was cut or left out to respect the budget.
    pub truncated: bool,

    /// Total size of the bundles.
    pub used: usize,

    pub unit: BudgetUnit,

    /// Documents of a collection query that could not be searched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<DocumentFailure>,
}

/// A document left out of a collection query, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub error: String,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Rendered bundles separated by rules, ready to use as model context.
    pub fn render(&self) -> String {
        self.bundles
            .iter()
            .map(ContextBundle::render)
            .collect::<Vec<_>>()
            .join("\n\n---\n\n")
    }
}

/// A model's answer to a question, with the context it was given.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub context: RetrievalResult,
}

/// Greedily pack ranked bundles into `budget`.
///
/// A bundle that only fits partially is cut per [`fit`]; the first bundle
/// that cannot fit at all ends assembly.
pub fn assemble(ranked: Vec<ContextBundle>, budget: Budget) -> RetrievalResult {
    let mut bundles = Vec::with_capacity(ranked.len());
    let mut used = 0;
    let mut truncated = false;
    let total = ranked.len();

    for bundle in ranked {
        match fit(bundle, budget.limit.saturating_sub(used), budget.unit) {
            Some(bundle) => {
                truncated |= bundle.truncated;
                used += bundle.size(budget.unit);
                bundles.push(bundle);
            }
            None => {
                truncated = true;
                break;
            }
        }
    }

    if truncated {
        debug!(
            "Budget of {} kept {}/{total} bundles",
            budget.limit,
            bundles.len()
        );
    }

    RetrievalResult {
        bundles,
        truncated,
        used,
        unit: budget.unit,
        failed: Vec::new(),
    }
}

/// Retrieves node subtrees from a tree by id or by query.
#[derive(Debug, Clone, Default)]
pub struct SubtreeRetriever {
    config: RetrievalConfig,
}

impl SubtreeRetriever {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// The bundle for node `id`, unbudgeted.
    pub fn bundle_for(&self, tree: &Tree, id: &str) -> Result<ContextBundle> {
        Ok(ContextBundle::from_tree(tree, id)?)
    }

    /// The `top_k` most relevant subtrees for `query`, packed into `budget`.
    ///
    /// Ranks by descending score, ties broken by document order. Nodes that
    /// score at or below the configured minimum are never selected.
    pub fn retrieve(
        &self,
        tree: &Tree,
        query: &str,
        scorer: &dyn RelevanceScorer,
        top_k: usize,
        budget: Budget,
    ) -> Result<RetrievalResult> {
        let ranked = self.ranked(tree, query, scorer, top_k, None)?;
        Ok(assemble(ranked, budget))
    }

    /// Like [`retrieve`](Self::retrieve), taking summaries from `report`,
    /// including failure markers.
    pub fn retrieve_with_summaries(
        &self,
        tree: &Tree,
        query: &str,
        scorer: &dyn RelevanceScorer,
        top_k: usize,
        budget: Budget,
        report: &SummaryReport,
    ) -> Result<RetrievalResult> {
        let ranked = self.ranked(tree, query, scorer, top_k, Some(report))?;
        Ok(assemble(ranked, budget))
    }

    /// [`retrieve`](Self::retrieve) with the configured `top_k` and budget.
    pub fn query(
        &self,
        tree: &Tree,
        query: &str,
        scorer: &dyn RelevanceScorer,
    ) -> Result<RetrievalResult> {
        self.retrieve(tree, query, scorer, self.config.top_k, self.config.budget)
    }

    /// Retrieve context for `question` under the configured budget and ask
    /// `model` to answer from it.
    pub async fn answer<M: LanguageModel + ?Sized>(
        &self,
        tree: &Tree,
        question: &str,
        scorer: &dyn RelevanceScorer,
        model: &M,
        config: &GenerationConfig,
    ) -> Result<Answer> {
        let context = self.query(tree, question, scorer)?;
        debug!(
            "Answering from {} bundles of {}",
            context.bundles.len(),
            tree.title()
        );
        let text = prompt::query_answer(tree.title(), question, &context.render())
            .run(model, config)
            .await?;
        Ok(Answer {
            text: text.trim().to_string(),
            context,
        })
    }

    fn ranked(
        &self,
        tree: &Tree,
        query: &str,
        scorer: &dyn RelevanceScorer,
        top_k: usize,
        report: Option<&SummaryReport>,
    ) -> Result<Vec<ContextBundle>> {
        let mut scored: Vec<(OrderedFloat<f64>, usize, &str)> = tree
            .iter()
            .enumerate()
            .map(|(position, node)| {
                let score = OrderedFloat(scorer.score(query, node));
                (score, position, node.id.as_str())
            })
            .filter(|(score, _, _)| score.0 > self.config.min_score)
            .collect();
        scored.sort_by_key(|(score, position, _)| (Reverse(*score), *position));
        scored.truncate(top_k);

        debug!("Selected {} nodes for query: {query}", scored.len());

        scored
            .into_iter()
            .map(|(score, _, id)| -> Result<ContextBundle> {
                let mut bundle = ContextBundle::from_tree(tree, id)?.with_score(score.0);
                if let Some(outcome) = report.and_then(|r| r.get(id)) {
                    bundle.summary = Some(outcome.clone());
                }
                Ok(bundle)
            })
            .collect()
    }
}
