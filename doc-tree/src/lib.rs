//! # Paper Section Tree
//!
//! This crate turns a scholarly paper into a navigable tree of sections. It
//! provides:
//!
//! - **Heading Parsing**: heading-annotated text to ordered `(level, title, body)` segments
//! - **Citation Linking**: inline citation markers bound to bibliography entries
//! - **Tree Building**: a stack-based builder assigning path-encoded node ids
//! - **Node Store**: an ordered arena with parent, child, ancestor and descendant lookups
//! - **Persistence**: a validated JSON format and a per-document file store
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Tree Construction                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  StructuredDocument ──► Segment ◄── parse_headings(text)        │
//! │                            │                                    │
//! │                            ▼                                    │
//! │  CitationLinker ──► TreeBuilder ──► BuildReport                 │
//! │                                         │                       │
//! │                                         ▼                       │
//! │                    Tree (IndexMap<NodeId, Node>)                │
//! │                                         │                       │
//! │                                         ▼                       │
//! │                    PersistedTree ──► TreeStore                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod builder;
pub mod citation;
pub mod document;
pub mod error;
pub mod heading;
pub mod node;
pub mod tree;
pub mod tree_storage;

pub use builder::{BuildReport, TreeBuilder, UNTITLED_DOCUMENT};
pub use citation::{CitationLinker, DanglingCitation, DanglingReason};
pub use document::{
    Author, BibliographyEntry, CitationMarker, DocumentMeta, Section, StructuredDocument,
    UNTITLED_SECTION,
};
pub use error::{IndexError, Result, StructureError};
pub use heading::{Segment, parse_headings};
pub use node::{
    CachedSummary, CitationRef, CitationResolution, Node, NodeId, ROOT_ID, child_id, fingerprint,
};
pub use tree::{Tree, TreeStats};
pub use tree_storage::{
    PersistedTree, TreeStore, TreeVisualization, tree_from_json, tree_to_json,
};
