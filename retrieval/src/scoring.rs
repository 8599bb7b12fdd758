//! Relevance scoring of tree nodes against a query.

use std::collections::{HashMap, HashSet};

use paperindex_doc_tree::{Node, NodeId, Tree};
use paperindex_llm::{Embedding, EmbeddingProvider, cosine_similarity};
use tracing::debug;

/// Scores how relevant a node is to a query. Higher is more relevant.
pub trait RelevanceScorer: Send + Sync {
    fn score(&self, query: &str, node: &Node) -> f64;
}

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "can", "to",
    "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "through", "during",
    "before", "after", "between", "under", "then", "here", "there", "when", "where", "why", "how",
    "all", "each", "more", "most", "other", "some", "such", "no", "nor", "not", "only", "so",
    "than", "too", "very", "and", "but", "if", "or", "because", "while", "what", "which", "who",
    "this", "that", "these", "those", "we", "our", "you", "it", "they", "its", "their", "paper",
    "section",
];

/// Lowercased words of `text`, split on anything but letters, digits, `-`
/// and `_`.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
}

/// Distinct content terms of a query, in order of appearance.
pub fn query_terms(query: &str) -> Vec<String> {
    let stop_words: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    let mut seen = HashSet::new();
    words(query)
        .filter(|word| word.chars().count() >= 2 && !stop_words.contains(word.as_str()))
        .filter(|word| seen.insert(word.clone()))
        .collect()
}

/// Term-matching scorer.
///
/// Each query term found in the title adds `title_weight`; a term found `n`
/// times in the body adds `body_weight * (1 + ln n)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordScorer {
    pub title_weight: f64,
    pub body_weight: f64,
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self {
            title_weight: 2.0,
            body_weight: 1.0,
        }
    }
}

impl KeywordScorer {
    pub fn new(title_weight: f64, body_weight: f64) -> Self {
        Self {
            title_weight,
            body_weight,
        }
    }
}

impl RelevanceScorer for KeywordScorer {
    fn score(&self, query: &str, node: &Node) -> f64 {
        let terms = query_terms(query);
        if terms.is_empty() {
            return 0.0;
        }

        let title: HashSet<String> = words(&node.title).collect();
        let mut body: HashMap<String, usize> = HashMap::new();
        for word in words(&node.body) {
            *body.entry(word).or_default() += 1;
        }

        terms
            .iter()
            .map(|term| {
                let in_title = if title.contains(term) {
                    self.title_weight
                } else {
                    0.0
                };
                let in_body = match body.get(term) {
                    Some(&n) if n > 0 => self.body_weight * (1.0 + (n as f64).ln()),
                    _ => 0.0,
                };
                in_title + in_body
            })
            .sum()
    }
}

/// Embedding-similarity scorer prepared for one query and one tree.
#[derive(Debug, Clone)]
pub struct SemanticScorer {
    query: String,
    query_embedding: Embedding,
    node_embeddings: HashMap<NodeId, Embedding>,
}

impl SemanticScorer {
    /// Embed `query` and every node of `tree`.
    pub async fn prepare<P: EmbeddingProvider + ?Sized>(
        provider: &P,
        query: &str,
        tree: &Tree,
    ) -> paperindex_llm::Result<Self> {
        let query_embedding = provider.embed(query).await?;

        let ids: Vec<NodeId> = tree.iter().map(|node| node.id.clone()).collect();
        let texts: Vec<String> = tree
            .iter()
            .map(|node| format!("{}\n{}", node.title, node.body))
            .collect();
        let embeddings = provider.embed_batch(&texts).await?;
        debug!("Embedded {} nodes with {}", embeddings.len(), provider.name());

        Ok(Self {
            query: query.to_string(),
            query_embedding,
            node_embeddings: ids.into_iter().zip(embeddings).collect(),
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

impl RelevanceScorer for SemanticScorer {
    /// Cosine similarity to the prepared query. Nodes of other trees, other
    /// queries and mismatched dimensions score 0.0.
    fn score(&self, query: &str, node: &Node) -> f64 {
        if query != self.query {
            return 0.0;
        }
        self.node_embeddings
            .get(&node.id)
            .and_then(|embedding| cosine_similarity(&self.query_embedding, embedding).ok())
            .map_or(0.0, f64::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use paperindex_doc_tree::{DocumentMeta, Segment, TreeBuilder};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_query_terms_drop_stop_words() {
        assert_eq!(
            query_terms("How does the multi-head Attention work with attention?"),
            vec!["multi-head", "attention", "work"]
        );
        assert!(query_terms("what is the").is_empty());
    }

    #[test]
    fn test_title_hits_outweigh_body_hits() {
        let scorer = KeywordScorer::default();
        let titled = Node::new("0.1", 2, "Attention", "Something else entirely.");
        let mentioned = Node::new("0.2", 2, "Model", "We use attention here.");

        assert_eq!(scorer.score("attention", &titled), 2.0);
        assert_eq!(scorer.score("attention", &mentioned), 1.0);
        assert_eq!(scorer.score("convolution", &titled), 0.0);
    }

    #[test]
    fn test_repeated_body_hits_grow_logarithmically() {
        let scorer = KeywordScorer::default();
        let node = Node::new("0.1", 2, "Model", "attention attention attention");
        let expected = 1.0 + 3f64.ln();
        assert!((scorer.score("attention", &node) - expected).abs() < 1e-9);
    }

    /// Embeds text as counts of two marker words.
    struct CountingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn name(&self) -> &str {
            "counting"
        }

        fn default_model(&self) -> &str {
            "counts"
        }

        async fn embed(&self, text: &str) -> paperindex_llm::Result<Embedding> {
            let text = text.to_lowercase();
            Ok(vec![
                text.matches("attention").count() as f32,
                text.matches("recurrence").count() as f32,
            ])
        }
    }

    #[tokio::test]
    async fn test_semantic_scorer_prefers_similar_nodes() {
        let segments = vec![
            Segment::new(1, "Attention", "attention only"),
            Segment::new(1, "Background", "recurrence everywhere"),
        ];
        let tree = TreeBuilder::new()
            .build(&segments, DocumentMeta::titled("Paper"), Vec::new())
            .unwrap()
            .tree;

        let scorer = SemanticScorer::prepare(&CountingEmbedder, "attention", &tree)
            .await
            .unwrap();

        let attention = scorer.score("attention", tree.node("0.0").unwrap());
        let background = scorer.score("attention", tree.node("0.1").unwrap());
        assert!((attention - 1.0).abs() < 1e-6);
        assert_eq!(background, 0.0);
        assert_eq!(scorer.score("other query", tree.node("0.0").unwrap()), 0.0);
    }
}
