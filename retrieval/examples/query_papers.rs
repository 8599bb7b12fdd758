//! Build trees for saved paper records and query them with keyword scoring.
//!
//! Usage: cargo run -p paperindex-retrieval --example query_papers -- "<query>" [record.json...]
//!
//! With no records given, the attention paper fixture from the doc-tree
//! tests is used. No model service is needed.

use std::path::PathBuf;
use std::sync::Arc;

use paperindex_retrieval::{Budget, DocumentCollection, DocumentSource, PaperIndexConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let query = args
        .next()
        .unwrap_or_else(|| "multi-head attention".to_string());
    let mut records: Vec<PathBuf> = args.map(PathBuf::from).collect();
    if records.is_empty() {
        records.push(
            PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("../doc-tree/tests/data/attention.json"),
        );
    }

    let config = PaperIndexConfig::default();
    let mut collection = DocumentCollection::new();
    let summary = collection.build_all(records.into_iter().map(|path| {
        let document_id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        (document_id, DocumentSource::RecordFile(path))
    }));

    println!("Built: {}", summary.built.join(", "));
    for (document_id, error) in &summary.failed {
        println!("Failed: {document_id}: {error}");
    }
    for (document_id, dangling) in &summary.dangling_citations {
        println!("Unresolved citation in {document_id}: {dangling:?}");
    }

    let scorer = Arc::new(config.retrieval.keyword_scorer());
    let result = collection
        .query(&query, scorer, config.retrieval.top_k, Budget::tokens(800))
        .await?;

    println!(
        "\n{} bundles, {} {:?} used{}\n",
        result.bundles.len(),
        result.used,
        result.unit,
        if result.truncated { ", truncated" } else { "" }
    );
    for failure in &result.failed {
        println!("Skipped {}: {}", failure.document_id, failure.error);
    }
    println!("{}", result.render());

    Ok(())
}
