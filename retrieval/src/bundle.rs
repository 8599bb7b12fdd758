//! Context bundles: a node's subtree packaged for a language model.

use paperindex_doc_tree::{NodeId, Result, Tree};
use paperindex_llm::SummaryOutcome;
use serde::{Deserialize, Serialize};

use crate::budget::BudgetUnit;

/// A descendant section carried inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSection {
    pub node_id: NodeId,

    /// Depth below the bundle's node (children are 1).
    pub depth: usize,

    pub title: String,
    pub body: String,
}

/// A node with its subtree content and surrounding headings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    /// Owning document, set when bundles from several documents are mixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,

    pub node_id: NodeId,
    pub title: String,
    pub body: String,

    /// Deeper content in document order.
    pub descendants: Vec<BundleSection>,

    /// Titles from the root down to the parent.
    pub ancestor_titles: Vec<String>,

    pub child_titles: Vec<String>,

    /// Node summary, or the marker of a failed summarization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryOutcome>,

    /// Relevance score; 0.0 for bundles fetched by id.
    pub score: f64,

    /// Position of the node in document order.
    pub position: usize,

    /// Whether content was removed to fit a budget.
    pub truncated: bool,
}

impl ContextBundle {
    /// Package the node `id` of `tree`.
    pub fn from_tree(tree: &Tree, id: &str) -> Result<Self> {
        let node = tree.node(id)?;
        let base_depth = node.depth();

        let descendants = tree
            .descendants(id)
            .into_iter()
            .map(|d| BundleSection {
                node_id: d.id.clone(),
                depth: d.depth().saturating_sub(base_depth),
                title: d.title.clone(),
                body: d.body.clone(),
            })
            .collect();

        Ok(Self {
            document_id: None,
            node_id: node.id.clone(),
            title: node.title.clone(),
            body: node.body.clone(),
            descendants,
            ancestor_titles: tree.ancestors(id).into_iter().map(|a| a.title.clone()).collect(),
            child_titles: tree.children(id).into_iter().map(|c| c.title.clone()).collect(),
            summary: node
                .fresh_summary()
                .map(|text| SummaryOutcome::Ready(text.to_string())),
            score: 0.0,
            position: tree.doc_order(id).unwrap_or_default(),
            truncated: false,
        })
    }

    pub fn with_document_id(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    pub fn with_summary(mut self, summary: SummaryOutcome) -> Self {
        self.summary = Some(summary);
        self
    }

    /// Size of everything the bundle carries, in `unit`.
    pub fn size(&self, unit: BudgetUnit) -> usize {
        let summary = match &self.summary {
            Some(SummaryOutcome::Ready(text)) => unit.measure(text),
            Some(SummaryOutcome::Failed(_)) | None => 0,
        };
        unit.measure(&self.title)
            + unit.measure(&self.body)
            + summary
            + self
                .descendants
                .iter()
                .map(|d| unit.measure(&d.title) + unit.measure(&d.body))
                .sum::<usize>()
            + self.ancestor_titles.iter().map(|t| unit.measure(t)).sum::<usize>()
            + self.child_titles.iter().map(|t| unit.measure(t)).sum::<usize>()
    }

    /// Plain-text rendering for a language model.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if let Some(document_id) = &self.document_id {
            out.push_str(&format!("[{document_id}]\n"));
        }
        if !self.ancestor_titles.is_empty() {
            out.push_str(&format!("Path: {}\n", self.ancestor_titles.join(" > ")));
        }
        out.push_str(&format!("# {}\n", self.title));

        match &self.summary {
            Some(SummaryOutcome::Ready(text)) => out.push_str(&format!("Summary: {text}\n")),
            Some(SummaryOutcome::Failed(reason)) => {
                out.push_str(&format!("Summary unavailable: {reason}\n"));
            }
            None => {}
        }

        if !self.body.is_empty() {
            out.push_str(&self.body);
            out.push('\n');
        }

        for section in &self.descendants {
            out.push_str(&format!("{} {}\n", "#".repeat(section.depth + 1), section.title));
            if !section.body.is_empty() {
                out.push_str(&section.body);
                out.push('\n');
            }
        }

        if !self.child_titles.is_empty() {
            out.push_str(&format!("Subsections: {}\n", self.child_titles.join(", ")));
        }

        out.trim_end().to_string()
    }
}
