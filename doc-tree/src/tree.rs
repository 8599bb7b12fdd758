//! Node store for a single paper.
//!
//! A `Tree` owns every node of one document in an insertion-ordered arena.
//! Insertion order is document order (a pre-order walk from the root), so
//! position in the arena doubles as the tie-breaker used by retrieval.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::debug;

use crate::document::{BibliographyEntry, DocumentMeta};
use crate::error::{IndexError, Result, StructureError};
use crate::node::{CachedSummary, Node, NodeId, ROOT_ID, child_id};

/// The hierarchical index of one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    /// ID of the root node.
    root: NodeId,

    /// Title, authors and other document-level fields.
    meta: DocumentMeta,

    /// Bibliography citation targets are bound against.
    bibliography: Vec<BibliographyEntry>,

    /// All nodes, in document order.
    nodes: IndexMap<NodeId, Node>,
}

impl Tree {
    /// Assemble a tree from its parts and check every structural invariant.
    pub fn from_parts(
        meta: DocumentMeta,
        bibliography: Vec<BibliographyEntry>,
        nodes: IndexMap<NodeId, Node>,
    ) -> Result<Self> {
        let tree = Self {
            root: ROOT_ID.to_string(),
            meta,
            bibliography,
            nodes,
        };
        tree.validate()?;
        Ok(tree)
    }

    pub fn root_id(&self) -> &str {
        &self.root
    }

    /// Get the root node.
    pub fn root(&self) -> Option<&Node> {
        self.nodes.get(&self.root)
    }

    pub fn meta(&self) -> &DocumentMeta {
        &self.meta
    }

    /// Document title, as recorded in the metadata.
    pub fn title(&self) -> &str {
        &self.meta.title
    }

    pub fn bibliography(&self) -> &[BibliographyEntry] {
        &self.bibliography
    }

    /// Look up a bibliography entry by its id.
    pub fn bibliography_entry(&self, id: &str) -> Option<&BibliographyEntry> {
        self.bibliography.iter().find(|entry| entry.id == id)
    }

    /// Get a node by ID.
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a node by ID, failing with `NodeNotFound`.
    pub fn node(&self, id: &str) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| IndexError::NodeNotFound(id.to_string()))
    }

    /// Check if the tree holds a node with this id.
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Get the parent of a node.
    pub fn parent(&self, id: &str) -> Option<&Node> {
        let parent = self.nodes.get(id)?.parent.as_deref()?;
        self.nodes.get(parent)
    }

    /// Direct children of a node, in document order.
    pub fn children(&self, id: &str) -> Vec<&Node> {
        self.nodes
            .get(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child| self.nodes.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ancestors of a node ordered from the root down to its parent.
    pub fn ancestors(&self, id: &str) -> Vec<&Node> {
        let mut ancestors = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent.as_deref());

        while let Some(parent_id) = current {
            match self.nodes.get(parent_id) {
                Some(parent) => {
                    ancestors.push(parent);
                    current = parent.parent.as_deref();
                }
                None => break,
            }
        }

        ancestors.reverse();
        ancestors
    }

    /// All nodes below `id`, in document order.
    pub fn descendants(&self, id: &str) -> Vec<&Node> {
        let mut descendants = Vec::new();
        let mut to_visit: Vec<&str> = match self.nodes.get(id) {
            Some(node) => node.children.iter().rev().map(String::as_str).collect(),
            None => return descendants,
        };

        while let Some(current) = to_visit.pop() {
            if let Some(node) = self.nodes.get(current) {
                descendants.push(node);
                to_visit.extend(node.children.iter().rev().map(String::as_str));
            }
        }

        descendants
    }

    /// Number of ancestors of a node.
    pub fn depth(&self, id: &str) -> Option<usize> {
        self.contains(id).then(|| self.ancestors(id).len())
    }

    /// Position of a node in document order.
    pub fn doc_order(&self, id: &str) -> Option<usize> {
        self.nodes.get_index_of(id)
    }

    /// All nodes in document order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Attach a summary to a node.
    ///
    /// Attaching the same summary twice is a no-op. Returns whether the node
    /// changed.
    pub fn attach_summary(&mut self, id: &str, summary: CachedSummary) -> Result<bool> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| IndexError::NodeNotFound(id.to_string()))?;

        if node.summary.as_ref() == Some(&summary) {
            return Ok(false);
        }
        debug!("Attached summary to node {id}");
        node.summary = Some(summary);
        Ok(true)
    }

    /// Check every structural invariant of the tree.
    pub fn validate(&self) -> std::result::Result<(), StructureError> {
        let root = self.nodes.get(&self.root).ok_or_else(|| {
            StructureError::Rootedness(format!("root {} is missing", self.root))
        })?;
        if root.parent.is_some() {
            return Err(StructureError::Rootedness(format!(
                "root {} has a parent",
                self.root
            )));
        }

        let bibliography: HashSet<&str> =
            self.bibliography.iter().map(|e| e.id.as_str()).collect();

        for (key, node) in &self.nodes {
            if *key != node.id {
                return Err(StructureError::IdMismatch {
                    id: node.id.clone(),
                    expected: key.clone(),
                });
            }
            self.validate_links(node)?;

            if let Some(target) = node
                .citations
                .iter()
                .filter_map(|c| c.target())
                .find(|t| !bibliography.contains(t))
            {
                return Err(StructureError::UnknownCitationTarget {
                    id: node.id.clone(),
                    target: target.to_string(),
                });
            }
        }

        self.validate_order()
    }

    fn validate_links(&self, node: &Node) -> std::result::Result<(), StructureError> {
        match node.parent.as_deref() {
            None if node.id != self.root => {
                return Err(StructureError::Rootedness(format!(
                    "node {} has no parent but is not the root",
                    node.id
                )));
            }
            None => {}
            Some(parent_id) => {
                let parent =
                    self.nodes
                        .get(parent_id)
                        .ok_or_else(|| StructureError::DanglingLink {
                            id: node.id.clone(),
                            missing: parent_id.to_string(),
                        })?;
                if node.level <= parent.level {
                    return Err(StructureError::LevelNotIncreasing {
                        id: node.id.clone(),
                        level: node.level,
                        parent: parent.id.clone(),
                        parent_level: parent.level,
                    });
                }
                if !parent.children.contains(&node.id) {
                    return Err(StructureError::Rootedness(format!(
                        "node {} is not listed among the children of {parent_id}",
                        node.id
                    )));
                }
            }
        }

        for (ordinal, child) in node.children.iter().enumerate() {
            let expected = child_id(&node.id, ordinal);
            if *child != expected {
                return Err(StructureError::IdMismatch {
                    id: child.clone(),
                    expected,
                });
            }
            let child_node = self
                .nodes
                .get(child)
                .ok_or_else(|| StructureError::DanglingLink {
                    id: node.id.clone(),
                    missing: child.clone(),
                })?;
            if child_node.parent.as_deref() != Some(node.id.as_str()) {
                return Err(StructureError::DanglingLink {
                    id: child.clone(),
                    missing: node.id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Walk from the root and compare against arena order. Catches cycles,
    /// unreachable nodes and out-of-order storage.
    fn validate_order(&self) -> std::result::Result<(), StructureError> {
        let mut seen = HashSet::new();
        let mut to_visit = vec![self.root.as_str()];
        let mut stored = self.nodes.keys();

        while let Some(current) = to_visit.pop() {
            if !seen.insert(current) {
                return Err(StructureError::Rootedness(format!(
                    "cycle through node {current}"
                )));
            }
            match stored.next() {
                Some(id) if id == current => {}
                Some(id) => {
                    return Err(StructureError::OutOfOrder {
                        id: id.clone(),
                        expected: current.to_string(),
                    });
                }
                None => {
                    return Err(StructureError::Rootedness(format!(
                        "node {current} is reachable but not stored"
                    )));
                }
            }
            if let Some(node) = self.nodes.get(current) {
                to_visit.extend(node.children.iter().rev().map(String::as_str));
            }
        }

        if seen.len() != self.nodes.len() {
            return Err(StructureError::Rootedness(format!(
                "{} nodes are unreachable from the root",
                self.nodes.len() - seen.len()
            )));
        }
        Ok(())
    }

    /// Get statistics about the tree.
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            total_nodes: self.nodes.len(),
            bibliography_entries: self.bibliography.len(),
            ..TreeStats::default()
        };

        for node in self.nodes.values() {
            stats.max_depth = stats.max_depth.max(node.depth());
            if node.is_leaf() {
                stats.leaves += 1;
            }
            stats.resolved_citations += node.resolved_citations().count();
            stats.unresolved_citations += node.unresolved_citations().count();
            if node.fresh_summary().is_some() {
                stats.summarized += 1;
            }
            stats.body_chars += node.body.chars().count();
        }

        stats
    }
}

/// Statistics about a document tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub max_depth: usize,
    pub leaves: usize,
    pub resolved_citations: usize,
    pub unresolved_citations: usize,
    pub bibliography_entries: usize,
    pub summarized: usize,
    pub body_chars: usize,
}

impl std::fmt::Display for TreeStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Document Tree Statistics:")?;
        writeln!(f, "  Total nodes: {}", self.total_nodes)?;
        writeln!(f, "  Max depth: {}", self.max_depth)?;
        writeln!(f, "  Leaves: {}", self.leaves)?;
        writeln!(
            f,
            "  Citations: {} resolved, {} unresolved",
            self.resolved_citations, self.unresolved_citations
        )?;
        writeln!(f, "  Bibliography entries: {}", self.bibliography_entries)?;
        writeln!(f, "  Summarized nodes: {}", self.summarized)?;
        writeln!(f, "  Body characters: {}", self.body_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{CitationRef, CitationResolution};
    use pretty_assertions::assert_eq;

    /// 0 Paper
    /// ├── 0.0 Intro
    /// └── 0.1 Method
    ///     ├── 0.1.0 Data
    ///     └── 0.1.1 Model
    fn arena() -> IndexMap<NodeId, Node> {
        let specs = [
            ("0", None, 1, "Paper"),
            ("0.0", Some("0"), 2, "Intro"),
            ("0.1", Some("0"), 2, "Method"),
            ("0.1.0", Some("0.1"), 3, "Data"),
            ("0.1.1", Some("0.1"), 4, "Model"),
        ];
        let mut nodes: IndexMap<NodeId, Node> = IndexMap::new();
        for (id, parent, level, title) in specs {
            let mut node = Node::new(id, level, title, format!("{title} body"));
            node.parent = parent.map(str::to_string);
            if let Some(parent) = parent {
                nodes[parent].children.push(id.to_string());
            }
            nodes.insert(id.to_string(), node);
        }
        nodes
    }

    fn sample() -> Tree {
        Tree::from_parts(
            DocumentMeta::titled("Paper"),
            vec![BibliographyEntry::new("b0", "Ref")],
            arena(),
        )
        .unwrap()
    }

    fn ids<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Vec<&'a str> {
        nodes.into_iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_navigation() {
        let tree = sample();

        assert_eq!(tree.root().unwrap().title, "Paper");
        assert_eq!(tree.parent("0.1.1").unwrap().id, "0.1");
        assert!(tree.parent("0").is_none());
        assert_eq!(ids(tree.children("0.1")), vec!["0.1.0", "0.1.1"]);
        assert_eq!(ids(tree.ancestors("0.1.1")), vec!["0", "0.1"]);
        assert_eq!(ids(tree.descendants("0")), vec!["0.0", "0.1", "0.1.0", "0.1.1"]);
        assert!(tree.descendants("missing").is_empty());
        assert_eq!(tree.doc_order("0.1.0"), Some(3));
    }

    #[test]
    fn test_depth_equals_ancestor_count() {
        let tree = sample();
        for node in tree.iter() {
            assert_eq!(tree.depth(&node.id), Some(node.depth()));
        }
        assert_eq!(tree.depth("9.9"), None);
    }

    #[test]
    fn test_node_not_found() {
        let tree = sample();
        assert!(matches!(tree.node("0.7"), Err(IndexError::NodeNotFound(id)) if id == "0.7"));
    }

    #[test]
    fn test_attach_summary_is_idempotent() {
        let mut tree = sample();
        let fingerprint = tree.get("0.0").unwrap().fingerprint();
        let summary = CachedSummary::new("Intro in brief", fingerprint);

        assert!(tree.attach_summary("0.0", summary.clone()).unwrap());
        let once = tree.clone();
        assert!(!tree.attach_summary("0.0", summary).unwrap());
        assert_eq!(tree, once);
        assert_eq!(tree.get("0.0").unwrap().fresh_summary(), Some("Intro in brief"));
    }

    #[test]
    fn test_rejects_non_increasing_level() {
        let mut nodes = arena();
        nodes["0.1.1"].level = 2;
        let err = Tree::from_parts(DocumentMeta::default(), Vec::new(), nodes).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Structure(StructureError::LevelNotIncreasing { ref id, .. }) if id == "0.1.1"
        ));
    }

    #[test]
    fn test_rejects_second_root() {
        let mut nodes = arena();
        nodes.insert("1".to_string(), Node::new("1", 1, "Stray", ""));
        let err = Tree::from_parts(DocumentMeta::default(), Vec::new(), nodes).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Structure(StructureError::Rootedness(_))
        ));
    }

    #[test]
    fn test_rejects_out_of_order_storage() {
        let mut nodes = arena();
        nodes.swap_indices(1, 2);
        let err = Tree::from_parts(DocumentMeta::default(), Vec::new(), nodes).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Structure(StructureError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_citation_target() {
        let mut nodes = arena();
        nodes["0.0"].citations.push(CitationRef {
            marker: "[9]".to_string(),
            position: None,
            resolution: CitationResolution::Resolved("b9".to_string()),
        });
        let err = Tree::from_parts(
            DocumentMeta::default(),
            vec![BibliographyEntry::new("b0", "Ref")],
            nodes,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            IndexError::Structure(StructureError::UnknownCitationTarget { ref target, .. }) if target == "b9"
        ));
    }

    #[test]
    fn test_stats() {
        let tree = sample();
        let stats = tree.stats();
        assert_eq!(stats.total_nodes, 5);
        assert_eq!(stats.max_depth, 2);
        assert_eq!(stats.leaves, 3);
        assert_eq!(stats.bibliography_entries, 1);
        assert!(stats.to_string().contains("Total nodes: 5"));
    }
}
