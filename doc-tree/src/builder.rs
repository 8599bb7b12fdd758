//! Tree builder.
//!
//! Turns an ordered segment sequence into a [`Tree`] with a stack of open
//! ancestors: for each segment, close every open node at the same or a
//! deeper level, attach to whatever is left on top, then open the segment.
//! Skipped levels attach directly; no filler nodes are invented.

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::citation::{CitationLinker, DanglingCitation};
use crate::document::{BibliographyEntry, DocumentMeta, StructuredDocument};
use crate::error::{Result, StructureError};
use crate::heading::{Segment, parse_headings};
use crate::node::{Node, NodeId, ROOT_ID, child_id};
use crate::tree::Tree;

/// Title used for a synthetic root when the document has none.
pub const UNTITLED_DOCUMENT: &str = "Untitled";

/// Outcome of building one document.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    /// The validated tree.
    pub tree: Tree,

    /// Citation markers that could not be bound.
    pub dangling_citations: Vec<DanglingCitation>,
}

impl BuildReport {
    /// Check if every citation marker was bound.
    pub fn is_clean(&self) -> bool {
        self.dangling_citations.is_empty()
    }
}

/// Builds document trees from heading segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeBuilder;

impl TreeBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build from the extraction service's structured record.
    pub fn from_document(&self, document: &StructuredDocument) -> Result<BuildReport> {
        self.build(
            &document.to_segments(),
            document.meta(),
            document.bibliography.clone(),
        )
    }

    /// Parse heading-annotated text and build from its segments.
    pub fn from_text(
        &self,
        text: &str,
        meta: DocumentMeta,
        bibliography: Vec<BibliographyEntry>,
    ) -> Result<BuildReport> {
        self.build(&parse_headings(text), meta, bibliography)
    }

    /// Build a tree from segments in document order.
    ///
    /// A level-0 segment is only accepted in first position. When more than
    /// one segment would end up at the top, a level-0 root titled with the
    /// document title is added above them; an empty sequence yields that
    /// root alone.
    pub fn build(
        &self,
        segments: &[Segment],
        meta: DocumentMeta,
        bibliography: Vec<BibliographyEntry>,
    ) -> Result<BuildReport> {
        if let Some(position) = segments
            .iter()
            .skip(1)
            .position(Segment::is_preamble)
            .map(|p| p + 1)
        {
            return Err(StructureError::MisplacedPreamble { position }.into());
        }

        let linker = CitationLinker::new(&bibliography);
        let mut nodes: IndexMap<NodeId, Node> = IndexMap::with_capacity(segments.len() + 1);
        let mut dangling = Vec::new();
        let mut stack: Vec<(NodeId, u32)> = Vec::new();

        if top_level_count(segments) != 1 {
            debug!("Adding synthetic root above {} segments", segments.len());
            nodes.insert(
                ROOT_ID.to_string(),
                Node::new(ROOT_ID, 0, document_title(&meta), ""),
            );
            stack.push((ROOT_ID.to_string(), 0));
        }

        for segment in segments {
            while stack
                .last()
                .is_some_and(|(_, level)| *level >= segment.level)
            {
                stack.pop();
            }

            let (id, parent) = match stack.last() {
                Some((parent_id, _)) => {
                    let ordinal = nodes
                        .get(parent_id)
                        .map(|p| p.children.len())
                        .unwrap_or_default();
                    (child_id(parent_id, ordinal), Some(parent_id.clone()))
                }
                None if nodes.is_empty() => (ROOT_ID.to_string(), None),
                None => {
                    return Err(StructureError::NoRoot {
                        segments: segments.len(),
                    }
                    .into());
                }
            };

            let title = if parent.is_none() && segment.title.trim().is_empty() {
                document_title(&meta)
            } else {
                segment.title.clone()
            };

            let mut node = Node::new(id.clone(), segment.level, title, segment.body.clone());
            let (citations, unresolved) = linker.link(&id, &segment.body, &segment.citations);
            node.citations = citations;
            dangling.extend(unresolved);

            if let Some(parent_id) = &parent {
                if let Some(parent_node) = nodes.get_mut(parent_id) {
                    parent_node.children.push(id.clone());
                }
            }
            node.parent = parent;

            stack.push((id.clone(), segment.level));
            nodes.insert(id, node);
        }

        let tree = Tree::from_parts(meta, bibliography, nodes)?;
        info!(
            "Built tree '{}': {} nodes, {} dangling citations",
            tree.title(),
            tree.len(),
            dangling.len()
        );

        Ok(BuildReport {
            tree,
            dangling_citations: dangling,
        })
    }
}

/// Number of segments the stack algorithm would leave without a parent.
fn top_level_count(segments: &[Segment]) -> usize {
    let mut min_level = u32::MAX;
    let mut count = 0;
    for segment in segments {
        if segment.level <= min_level {
            count += 1;
            min_level = segment.level;
        }
    }
    count
}

fn document_title(meta: &DocumentMeta) -> String {
    let title = meta.title.trim();
    if title.is_empty() {
        UNTITLED_DOCUMENT.to_string()
    } else {
        title.to_string()
    }
}
