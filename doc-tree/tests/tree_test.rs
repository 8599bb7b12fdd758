//! Integration tests for building, validating and persisting paper trees.

use std::path::PathBuf;

use paperindex_doc_tree::{
    BibliographyEntry, CitationMarker, CitationRef, DanglingReason, DocumentMeta, Segment,
    StructuredDocument, Tree, TreeBuilder, TreeStore, tree_from_json, tree_to_json,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Get the path to the test data directory.
fn data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data")
}

fn attention() -> StructuredDocument {
    StructuredDocument::from_json_file(data_dir().join("attention.json")).unwrap()
}

fn outline(tree: &Tree) -> Vec<(String, u32, String)> {
    tree.iter()
        .map(|n| (n.id.clone(), n.level, n.title.clone()))
        .collect()
}

#[test]
fn test_builds_nested_sections() {
    let segments = [
        Segment::new(1, "Title", "p0"),
        Segment::new(2, "Intro", "p1"),
        Segment::new(2, "Method", "p2"),
        Segment::new(3, "Setup", "p3"),
    ];
    let tree = TreeBuilder::new()
        .build(&segments, DocumentMeta::titled("Title"), Vec::new())
        .unwrap()
        .tree;

    let root = tree.root().unwrap();
    assert_eq!(root.id, "0");
    assert_eq!(root.title, "Title");
    assert_eq!(root.children, vec!["0.0".to_string(), "0.1".to_string()]);
    assert_eq!(tree.get("0.0").unwrap().title, "Intro");
    assert_eq!(tree.get("0.1").unwrap().title, "Method");
    assert_eq!(tree.get("0.1").unwrap().children, vec!["0.1.0".to_string()]);
    assert_eq!(tree.get("0.1.0").unwrap().title, "Setup");
    assert_eq!(tree.get("0.1.0").unwrap().body, "p3");
}

#[test]
fn test_missing_bibliography_target_is_flagged() {
    let segments = [
        Segment::new(1, "Title", "Prior work [7] and [1].").with_citations(vec![
            CitationMarker::new("B7", "[7]"),
            CitationMarker::new("B1", "[1]"),
        ]),
    ];
    let report = TreeBuilder::new()
        .build(
            &segments,
            DocumentMeta::titled("Title"),
            vec![BibliographyEntry::new("B1", "Some reference")],
        )
        .unwrap();

    let root = report.tree.root().unwrap();
    assert_eq!(root.citations.len(), 2);
    assert!(!root.citations[0].is_resolved());
    assert_eq!(root.citations[1].target(), Some("B1"));
    assert_eq!(report.dangling_citations.len(), 1);
    assert_eq!(report.dangling_citations[0].target.as_deref(), Some("B7"));
}

#[test]
fn test_attention_paper_structure() {
    let report = TreeBuilder::new().from_document(&attention()).unwrap();
    let tree = &report.tree;

    let expected: Vec<(String, u32, String)> = [
        ("0", 1, "Attention Is All You Need"),
        ("0.0", 2, "Abstract"),
        ("0.1", 2, "1 Introduction"),
        ("0.2", 2, "2 Background"),
        ("0.3", 2, "3 Model Architecture"),
        ("0.3.0", 3, "3.1 Encoder and Decoder Stacks"),
        ("0.3.1", 3, "3.2 Attention"),
        ("0.3.1.0", 4, "3.2.1 Scaled Dot-Product Attention"),
        ("0.3.1.1", 4, "3.2.2 Multi-Head Attention"),
        ("0.4", 2, "7 Conclusion"),
        ("0.5", 2, "References"),
    ]
    .into_iter()
    .map(|(id, level, title)| (id.to_string(), level, title.to_string()))
    .collect();
    assert_eq!(outline(tree), expected);

    assert_eq!(tree.meta().authors.len(), 3);
    assert_eq!(tree.bibliography().len(), 4);

    let intro = tree.get("0.1").unwrap();
    let targets: Vec<Option<&str>> = intro.citations.iter().map(CitationRef::target).collect();
    assert_eq!(targets, vec![Some("b12"), Some("b6")]);

    let reasons: Vec<(&str, DanglingReason)> = report
        .dangling_citations
        .iter()
        .map(|d| (d.node_id.as_str(), d.reason))
        .collect();
    assert_eq!(
        reasons,
        vec![
            ("0.2", DanglingReason::NotInBibliography),
            ("0.3.1.1", DanglingReason::NoCandidate),
        ]
    );
}

#[test]
fn test_markdown_and_record_paths_agree() {
    let document = attention();
    let markdown = std::fs::read_to_string(data_dir().join("attention.md")).unwrap();

    let from_record = TreeBuilder::new().from_document(&document).unwrap().tree;
    let from_text = TreeBuilder::new()
        .from_text(&markdown, document.meta(), document.bibliography.clone())
        .unwrap()
        .tree;

    let contents = |tree: &Tree| -> Vec<(String, u32, String, String)> {
        tree.iter()
            .map(|n| (n.id.clone(), n.level, n.title.clone(), n.body.clone()))
            .collect()
    };
    assert_eq!(contents(&from_text), contents(&from_record));
}

#[test]
fn test_rebuild_is_deterministic() {
    let document = attention();
    let first = TreeBuilder::new().from_document(&document).unwrap();
    let second = TreeBuilder::new().from_document(&document).unwrap();

    assert_eq!(first, second);
    assert_eq!(
        tree_to_json(&first.tree).unwrap(),
        tree_to_json(&second.tree).unwrap()
    );
}

#[test]
fn test_levels_increase_and_depth_matches_ancestors() {
    let tree = TreeBuilder::new().from_document(&attention()).unwrap().tree;

    for node in tree.iter() {
        if let Some(parent) = tree.parent(&node.id) {
            assert!(node.level > parent.level, "{} under {}", node.id, parent.id);
        }
        assert_eq!(tree.ancestors(&node.id).len(), node.depth());
    }
}

#[test]
fn test_resolved_citations_exist_in_bibliography() {
    let tree = TreeBuilder::new().from_document(&attention()).unwrap().tree;

    for citation in tree.iter().flat_map(|n| n.citations.iter()) {
        if let Some(target) = citation.target() {
            assert!(tree.bibliography_entry(target).is_some());
        }
    }
    assert_eq!(tree.stats().unresolved_citations, 2);
}

#[test]
fn test_persisted_tree_roundtrip() {
    let tree = TreeBuilder::new().from_document(&attention()).unwrap().tree;

    let json = tree_to_json(&tree).unwrap();
    let restored = tree_from_json(&json).unwrap();
    assert_eq!(restored, tree);

    let temp_dir = TempDir::new().unwrap();
    let store = TreeStore::new(temp_dir.path());
    store.save("attention", &tree).unwrap();
    assert_eq!(store.load("attention").unwrap(), tree);
}

#[test]
fn test_persisted_json_shape() {
    let tree = TreeBuilder::new().from_document(&attention()).unwrap().tree;
    let value: serde_json::Value = serde_json::from_str(&tree_to_json(&tree).unwrap()).unwrap();

    assert_eq!(value["version"], 1);
    assert_eq!(value["root"], "0");
    assert_eq!(value["meta"]["title"], "Attention Is All You Need");

    let intro = &value["nodes"][2];
    assert_eq!(intro["id"], "0.1");
    assert_eq!(intro["parent"], "0");
    assert_eq!(intro["citations"][0]["marker"], "[13]");
    assert_eq!(intro["citations"][0]["resolution"]["resolved"], "b12");

    let multi_head = &value["nodes"][8];
    assert_eq!(multi_head["citations"][0]["resolution"], "unresolved");
}
