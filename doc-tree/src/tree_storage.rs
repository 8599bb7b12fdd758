//! Persistent storage for document trees.
//!
//! Trees are written as pretty-printed JSON, one file per document, named
//! after the document id. Loading validates every invariant before handing
//! the tree back.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document::{BibliographyEntry, DocumentMeta};
use crate::error::{IndexError, Result};
use crate::node::{Node, NodeId};
use crate::tree::Tree;

const TREE_EXTENSION: &str = "json";
const BACKUP_EXTENSION: &str = "json.bak";

/// Storage format for a document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedTree {
    /// Version of the storage format.
    pub version: u32,

    /// Document-level metadata.
    pub meta: DocumentMeta,

    /// Bibliography the citations are bound against.
    #[serde(default)]
    pub bibliography: Vec<BibliographyEntry>,

    /// ID of the root node.
    pub root: NodeId,

    /// All nodes in document order.
    pub nodes: Vec<Node>,
}

impl PersistedTree {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn from_tree(tree: &Tree) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            meta: tree.meta().clone(),
            bibliography: tree.bibliography().to_vec(),
            root: tree.root_id().to_string(),
            nodes: tree.iter().cloned().collect(),
        }
    }

    /// Rebuild and validate the tree.
    pub fn into_tree(self) -> Result<Tree> {
        if self.version != Self::CURRENT_VERSION {
            return Err(IndexError::InvalidFormat(format!(
                "unsupported tree version {}, expected {}",
                self.version,
                Self::CURRENT_VERSION
            )));
        }

        let mut nodes: IndexMap<NodeId, Node> = IndexMap::with_capacity(self.nodes.len());
        for node in self.nodes {
            if let Some(previous) = nodes.insert(node.id.clone(), node) {
                return Err(IndexError::InvalidFormat(format!(
                    "duplicate node id {}",
                    previous.id
                )));
            }
        }

        let tree = Tree::from_parts(self.meta, self.bibliography, nodes)?;
        if tree.root_id() != self.root {
            return Err(IndexError::InvalidFormat(format!(
                "stored root {} does not match {}",
                self.root,
                tree.root_id()
            )));
        }
        Ok(tree)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| IndexError::InvalidFormat(format!("Failed to deserialize tree: {e}")))
    }
}

/// Serialize a tree to its persisted JSON form.
pub fn tree_to_json(tree: &Tree) -> Result<String> {
    PersistedTree::from_tree(tree).to_json()
}

/// Parse and validate a persisted tree.
pub fn tree_from_json(json: &str) -> Result<Tree> {
    PersistedTree::from_json(json)?.into_tree()
}

/// File-backed storage for document trees, one file per document id.
#[derive(Debug, Clone)]
pub struct TreeStore {
    /// Base directory for storage.
    base_path: PathBuf,
}

impl TreeStore {
    /// Create a new tree store at the given path.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Get the base path of the store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Ensure the storage directory exists.
    fn ensure_dir(&self) -> Result<()> {
        if !self.base_path.exists() {
            fs::create_dir_all(&self.base_path)?;
            info!("Created storage directory: {}", self.base_path.display());
        }
        Ok(())
    }

    fn tree_path(&self, doc_id: &str) -> Result<PathBuf> {
        if doc_id.is_empty()
            || doc_id.starts_with('.')
            || doc_id.contains(['/', '\\'])
        {
            return Err(IndexError::InvalidFormat(format!(
                "document id {doc_id:?} cannot be used as a file name"
            )));
        }
        Ok(self.base_path.join(format!("{doc_id}.{TREE_EXTENSION}")))
    }

    fn backup_path(&self, doc_id: &str) -> Result<PathBuf> {
        self.tree_path(doc_id)
            .map(|path| path.with_extension(BACKUP_EXTENSION))
    }

    /// Save a document tree, keeping the previous version as a backup.
    pub fn save(&self, doc_id: &str, tree: &Tree) -> Result<()> {
        let tree_path = self.tree_path(doc_id)?;
        self.ensure_dir()?;

        if tree_path.exists() {
            let backup_path = self.backup_path(doc_id)?;
            fs::copy(&tree_path, &backup_path)?;
            debug!("Created backup at {}", backup_path.display());
        }

        fs::write(&tree_path, tree_to_json(tree)?)?;

        info!(
            "Saved tree {doc_id} ({} nodes) to {}",
            tree.len(),
            tree_path.display()
        );
        Ok(())
    }

    /// Load and validate a stored document tree.
    pub fn load(&self, doc_id: &str) -> Result<Tree> {
        let tree_path = self.tree_path(doc_id)?;
        let json = fs::read_to_string(&tree_path)?;
        let tree = tree_from_json(&json)?;

        info!(
            "Loaded tree {doc_id} ({} nodes) from {}",
            tree.len(),
            tree_path.display()
        );
        Ok(tree)
    }

    /// Check if a tree is stored for the document.
    pub fn exists(&self, doc_id: &str) -> bool {
        self.tree_path(doc_id).is_ok_and(|path| path.exists())
    }

    /// Delete a stored tree and its backup.
    pub fn delete(&self, doc_id: &str) -> Result<()> {
        for path in [self.tree_path(doc_id)?, self.backup_path(doc_id)?] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }

        info!("Deleted stored tree {doc_id}");
        Ok(())
    }

    /// Ids of all stored documents, sorted.
    pub fn list(&self) -> Vec<String> {
        if !self.base_path.exists() {
            return Vec::new();
        }

        let mut ids: Vec<String> = WalkDir::new(&self.base_path)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let path = entry.path();
                let is_tree = path
                    .extension()
                    .is_some_and(|ext| ext == TREE_EXTENSION);
                if !is_tree {
                    return None;
                }
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect();
        ids.sort();
        ids
    }

    /// Load every stored tree.
    ///
    /// A file that fails to load is skipped with a warning; the rest still
    /// load.
    pub fn load_all(&self) -> Vec<(String, Tree)> {
        self.list()
            .into_iter()
            .filter_map(|doc_id| match self.load(&doc_id) {
                Ok(tree) => Some((doc_id, tree)),
                Err(e) => {
                    warn!("Skipping stored tree {doc_id}: {e}");
                    None
                }
            })
            .collect()
    }

    /// Export tree structure for visualization.
    pub fn export_structure(&self, tree: &Tree) -> TreeVisualization {
        let mut viz = TreeVisualization::new();

        fn build_viz(tree: &Tree, node: &Node, viz: &mut TreeVisualization, depth: usize) {
            let indent = "  ".repeat(depth);
            let preview: String = node.body.chars().take(50).collect();
            let ellipsis = if node.body.chars().count() > 50 { "..." } else { "" };
            let mut line = format!("{indent}{} [{}]", node.title, node.id);
            if !preview.is_empty() {
                line.push_str(&format!(" - {preview}{ellipsis}"));
            }
            viz.lines.push(line.replace('\n', " "));

            for child in tree.children(&node.id) {
                build_viz(tree, child, viz, depth + 1);
            }
        }

        if let Some(root) = tree.root() {
            build_viz(tree, root, &mut viz, 0);
        }
        viz
    }
}

/// A visualization of the tree structure.
#[derive(Debug, Default)]
pub struct TreeVisualization {
    /// Lines of the visualization.
    pub lines: Vec<String>,
}

impl TreeVisualization {
    fn new() -> Self {
        Self { lines: Vec::new() }
    }
}

impl std::fmt::Display for TreeVisualization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lines.join("\n"))
    }
}
