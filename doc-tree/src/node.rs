//! Core types for the document section tree.
//!
//! A `Node` is one heading-delimited section of a paper. Nodes never own
//! each other: parent and children are referenced by their path-encoded ids
//! and resolved through the owning [`Tree`](crate::tree::Tree).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Path-encoded node identifier (`"0"`, `"0.1"`, `"0.1.2"`, ...).
pub type NodeId = String;

/// Id of the root node in every tree.
pub const ROOT_ID: &str = "0";

/// A section of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Position-encoding identifier, unique within the tree.
    pub id: NodeId,

    /// Heading level (0 for a preamble or synthetic root).
    pub level: u32,

    /// Heading text.
    pub title: String,

    /// Section text up to the next heading.
    #[serde(default)]
    pub body: String,

    /// Parent node ID (None for root).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,

    /// Child node IDs in document order.
    #[serde(default)]
    pub children: Vec<NodeId>,

    /// Citation markers found in the body.
    #[serde(default)]
    pub citations: Vec<CitationRef>,

    /// Summary attached after the tree was built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CachedSummary>,
}

impl Node {
    /// Create a detached node with no links, citations or summary.
    pub fn new(
        id: impl Into<NodeId>,
        level: u32,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            level,
            title: title.into(),
            body: body.into(),
            parent: None,
            children: Vec::new(),
            citations: Vec::new(),
            summary: None,
        }
    }

    /// Check if this node is the root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Check if this node is a leaf node (no children).
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of edges between this node and the root, read off the id.
    pub fn depth(&self) -> usize {
        self.id.matches('.').count()
    }

    /// Fingerprint of the current body text.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.body)
    }

    /// The attached summary, if it was computed from the current body.
    pub fn fresh_summary(&self) -> Option<&str> {
        self.summary
            .as_ref()
            .filter(|s| s.fingerprint == self.fingerprint())
            .map(|s| s.text.as_str())
    }

    /// Citations that were bound to a bibliography entry.
    pub fn resolved_citations(&self) -> impl Iterator<Item = &CitationRef> {
        self.citations.iter().filter(|c| c.is_resolved())
    }

    /// Citations whose target could not be confirmed.
    pub fn unresolved_citations(&self) -> impl Iterator<Item = &CitationRef> {
        self.citations.iter().filter(|c| !c.is_resolved())
    }
}

/// Build the id of the `ordinal`-th child of `parent`.
pub fn child_id(parent: &str, ordinal: usize) -> NodeId {
    format!("{parent}.{ordinal}")
}

/// Deterministic digest of a text, hex encoded.
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// A citation marker found in a node body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRef {
    /// Marker text as it appears in the body (e.g. `[Cho et al., 2014]`).
    pub marker: String,

    /// Byte offset of the marker in the body, when it could be located.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,

    /// Bound bibliography entry, or the unresolved flag.
    pub resolution: CitationResolution,
}

impl CitationRef {
    /// Check if the marker was bound to a bibliography entry.
    pub fn is_resolved(&self) -> bool {
        matches!(self.resolution, CitationResolution::Resolved(_))
    }

    /// The bound bibliography id, if any.
    pub fn target(&self) -> Option<&str> {
        match &self.resolution {
            CitationResolution::Resolved(id) => Some(id),
            CitationResolution::Unresolved => None,
        }
    }
}

/// Outcome of binding a citation marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationResolution {
    /// Bound to the bibliography entry with this id.
    Resolved(String),
    /// No matching bibliography entry.
    Unresolved,
}

/// A summary together with the fingerprint of the body it was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSummary {
    /// Summary text.
    pub text: String,

    /// Fingerprint of the body at computation time.
    pub fingerprint: String,
}

impl CachedSummary {
    /// Create a summary for the given body fingerprint.
    pub fn new(text: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fingerprint: fingerprint.into(),
        }
    }
}
