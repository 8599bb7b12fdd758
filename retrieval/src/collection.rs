//! Multi-document collections and cross-document querying.

use std::cmp::Reverse;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use paperindex_doc_tree::{
    BibliographyEntry, BuildReport, DanglingCitation, DocumentMeta, IndexError, Segment,
    StructuredDocument, Tree, TreeBuilder, TreeStore,
};
use paperindex_llm::EmbeddingProvider;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::budget::Budget;
use crate::engine::{DocumentFailure, RetrievalResult, SubtreeRetriever, assemble};
use crate::error::{Result, RetrievalError};
use crate::scoring::{RelevanceScorer, SemanticScorer};

/// Input for one document of a batch build.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// A structured record from the extraction service.
    Record(StructuredDocument),

    /// A saved structured record, read when the batch runs.
    RecordFile(PathBuf),

    /// Heading-annotated text.
    Text {
        text: String,
        meta: DocumentMeta,
        bibliography: Vec<BibliographyEntry>,
    },

    /// Segments produced by another parser.
    Segments {
        segments: Vec<Segment>,
        meta: DocumentMeta,
        bibliography: Vec<BibliographyEntry>,
    },
}

impl DocumentSource {
    fn build(self, builder: TreeBuilder) -> paperindex_doc_tree::Result<BuildReport> {
        match self {
            Self::Record(document) => builder.from_document(&document),
            Self::RecordFile(path) => {
                builder.from_document(&StructuredDocument::from_json_file(path)?)
            }
            Self::Text {
                text,
                meta,
                bibliography,
            } => builder.from_text(&text, meta, bibliography),
            Self::Segments {
                segments,
                meta,
                bibliography,
            } => builder.build(&segments, meta, bibliography),
        }
    }
}

impl From<StructuredDocument> for DocumentSource {
    fn from(document: StructuredDocument) -> Self {
        Self::Record(document)
    }
}

/// Outcome of building several documents at once.
#[derive(Debug, Default)]
pub struct BuildSummary {
    /// Documents added to the collection, in input order.
    pub built: Vec<String>,

    /// Documents rejected with their error.
    pub failed: Vec<(String, IndexError)>,

    /// Citations left unresolved, across all built documents.
    pub dangling_citations: Vec<(String, DanglingCitation)>,
}

/// Trees of several documents, keyed by document id in insertion order.
#[derive(Debug, Clone, Default)]
pub struct DocumentCollection {
    trees: IndexMap<String, Arc<Tree>>,
    retriever: SubtreeRetriever,
}

impl DocumentCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retriever(mut self, retriever: SubtreeRetriever) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn retriever(&self) -> &SubtreeRetriever {
        &self.retriever
    }

    /// Add or replace a document's tree, returning the previous one.
    pub fn insert(&mut self, document_id: impl Into<String>, tree: Tree) -> Option<Arc<Tree>> {
        self.trees.insert(document_id.into(), Arc::new(tree))
    }

    pub fn get(&self, document_id: &str) -> Option<&Arc<Tree>> {
        self.trees.get(document_id)
    }

    /// The tree of a document, or [`RetrievalError::DocumentNotFound`].
    pub fn tree(&self, document_id: &str) -> Result<&Arc<Tree>> {
        self.get(document_id)
            .ok_or_else(|| RetrievalError::DocumentNotFound(document_id.to_string()))
    }

    pub fn remove(&mut self, document_id: &str) -> Option<Arc<Tree>> {
        self.trees.shift_remove(document_id)
    }

    pub fn document_ids(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Build and add every document. A document that cannot be read or
    /// violates the tree invariants is reported and skipped; the others are
    /// still added.
    pub fn build_all<S: Into<DocumentSource>>(
        &mut self,
        documents: impl IntoIterator<Item = (String, S)>,
    ) -> BuildSummary {
        let builder = TreeBuilder::new();
        let mut summary = BuildSummary::default();

        for (document_id, source) in documents {
            match source.into().build(builder) {
                Ok(report) => {
                    summary.dangling_citations.extend(
                        report
                            .dangling_citations
                            .into_iter()
                            .map(|d| (document_id.clone(), d)),
                    );
                    self.insert(document_id.clone(), report.tree);
                    summary.built.push(document_id);
                }
                Err(e) => {
                    warn!("Skipping document {document_id}: {e}");
                    summary.failed.push((document_id, e));
                }
            }
        }

        info!(
            "Built {} documents, {} failed",
            summary.built.len(),
            summary.failed.len()
        );
        summary
    }

    /// Load every persisted tree in `dir`. Unreadable files are skipped.
    pub fn load_dir(dir: impl AsRef<Path>) -> Self {
        let store = TreeStore::new(dir.as_ref());
        let mut collection = Self::new();
        for (document_id, tree) in store.load_all() {
            collection.insert(document_id, tree);
        }
        info!("Loaded {} documents from {:?}", collection.len(), dir.as_ref());
        collection
    }

    /// Persist every tree into `dir`.
    pub fn save_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let store = TreeStore::new(dir.as_ref());
        for (document_id, tree) in &self.trees {
            store.save(document_id, tree)?;
        }
        Ok(())
    }

    /// Query every document concurrently and merge the results.
    ///
    /// Each document contributes its own top-`top_k` within `budget`; the
    /// merged list is re-ranked by score (ties by document insertion order,
    /// then document order), cut to `top_k` and packed into `budget` again.
    /// Every bundle carries its document id.
    pub async fn query(
        &self,
        query: &str,
        scorer: Arc<dyn RelevanceScorer>,
        top_k: usize,
        budget: Budget,
    ) -> Result<RetrievalResult> {
        let mut tasks = JoinSet::new();
        for (rank, (document_id, tree)) in self.trees.iter().enumerate() {
            let tree = Arc::clone(tree);
            let scorer = Arc::clone(&scorer);
            let retriever = self.retriever.clone();
            let document_id = document_id.clone();
            let query = query.to_string();
            tasks.spawn(async move {
                let result = retriever.retrieve(&tree, &query, scorer.as_ref(), top_k, budget);
                (rank, document_id, result)
            });
        }
        self.merge(tasks, top_k, budget).await
    }

    /// Like [`query`](Self::query), scoring each document by embedding
    /// similarity.
    pub async fn query_semantic(
        &self,
        query: &str,
        provider: Arc<dyn EmbeddingProvider>,
        top_k: usize,
        budget: Budget,
    ) -> Result<RetrievalResult> {
        let mut tasks = JoinSet::new();
        for (rank, (document_id, tree)) in self.trees.iter().enumerate() {
            let tree = Arc::clone(tree);
            let provider = Arc::clone(&provider);
            let retriever = self.retriever.clone();
            let document_id = document_id.clone();
            let query = query.to_string();
            tasks.spawn(async move {
                let result = match SemanticScorer::prepare(provider.as_ref(), &query, &tree).await {
                    Ok(scorer) => retriever.retrieve(&tree, &query, &scorer, top_k, budget),
                    Err(e) => Err(e.into()),
                };
                (rank, document_id, result)
            });
        }
        self.merge(tasks, top_k, budget).await
    }

    /// Merge per-document results. A document whose retrieval fails is
    /// logged and listed in [`RetrievalResult::failed`]; the query only
    /// fails when no document succeeded.
    async fn merge(
        &self,
        mut tasks: JoinSet<(usize, String, Result<RetrievalResult>)>,
        top_k: usize,
        budget: Budget,
    ) -> Result<RetrievalResult> {
        let mut candidates = Vec::new();
        let mut truncated = false;
        let mut succeeded = 0;
        let mut failed = Vec::new();
        let mut first_error = None;

        while let Some(joined) = tasks.join_next().await {
            let (rank, document_id, result) = joined?;
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    warn!("Query failed for document {document_id}: {e}");
                    failed.push((rank, DocumentFailure {
                        document_id,
                        error: e.to_string(),
                    }));
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    continue;
                }
            };
            succeeded += 1;
            truncated |= result.truncated;
            candidates.extend(
                result
                    .bundles
                    .into_iter()
                    .map(|bundle| (rank, bundle.with_document_id(document_id.as_str()))),
            );
        }

        if succeeded == 0
            && let Some(e) = first_error
        {
            return Err(e);
        }

        candidates.sort_by_key(|(rank, bundle)| {
            (Reverse(OrderedFloat(bundle.score)), *rank, bundle.position)
        });
        candidates.truncate(top_k);
        failed.sort_by_key(|(rank, _)| *rank);

        let mut result = assemble(
            candidates.into_iter().map(|(_, bundle)| bundle).collect(),
            budget,
        );
        result.truncated |= truncated;
        result.failed = failed.into_iter().map(|(_, failure)| failure).collect();
        Ok(result)
    }
}
