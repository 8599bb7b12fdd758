//! Prompt builders for the paper-level language model tasks.

use paperindex_doc_tree::{CitationRef, Node, Tree};

use crate::error::Result;
use crate::provider::{GenerationConfig, LanguageModel};

/// Largest outline or context embedded in a single prompt, in characters.
pub const MAX_CONTEXT_CHARS: usize = 12_000;

/// Bibliography entries listed in a citation analysis prompt.
pub const MAX_BIBLIOGRAPHY_ENTRIES: usize = 30;

/// Sections listed in a citation analysis prompt.
pub const MAX_CITING_SECTIONS: usize = 20;

const ASSISTANT_ROLE: &str = "You are an academic research assistant.";

/// An instruction and the material it operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub instruction: String,
    pub context: String,
}

impl Prompt {
    pub fn new(instruction: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            context: context.into(),
        }
    }

    /// Send the prompt to `model`.
    pub async fn run<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        config: &GenerationConfig,
    ) -> Result<String> {
        model
            .generate(&self.instruction, &self.context, config)
            .await
    }
}

/// Ask for a short description of one section.
pub fn node_summary(node: &Node) -> Prompt {
    Prompt::new(
        "Generate a brief description of the main points covered in this section.\n\
         Return only the description, no preamble.",
        format!(
            "You are given a part of a document.\n\nSection Text: {}",
            node.body
        ),
    )
}

/// Ask for a 3-5 sentence summary of the whole paper from its outline.
pub fn paper_summary(tree: &Tree) -> Prompt {
    Prompt::new(
        "Given the page index above, write a brief summary (3-5 sentences) that \
         captures the paper's main contribution, methodology, and key findings.\n\n\
         Summary:",
        format!(
            "{ASSISTANT_ROLE}\n\nPaper Title: {}\n\nPage Index:\n{}",
            tree.title(),
            truncate_context(&outline(tree))
        ),
    )
}

/// Ask for a one-sentence description of the paper's main contribution.
pub fn document_description(tree: &Tree) -> Prompt {
    Prompt::new(
        "Given this document structure, generate a one-sentence description that \
         captures the paper's main contribution.\nReturn only the description.",
        format!(
            "You are an expert at summarising academic documents.\n\nDocument Structure:\n{}",
            truncate_context(&outline(tree))
        ),
    )
}

/// Ask how the paper's citations support its argument.
pub fn citation_analysis(tree: &Tree) -> Prompt {
    let bibliography: Vec<String> = tree
        .bibliography()
        .iter()
        .take(MAX_BIBLIOGRAPHY_ENTRIES)
        .map(|entry| {
            let authors = entry
                .authors
                .iter()
                .take(3)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "  {}: {authors}. \"{}\" ({})",
                entry.id,
                entry.title.as_deref().unwrap_or_default(),
                entry.date.as_deref().unwrap_or_default()
            )
        })
        .collect();

    let usage: Vec<String> = tree
        .iter()
        .filter_map(|node| {
            let keys: Vec<&str> = node
                .resolved_citations()
                .filter_map(CitationRef::target)
                .collect();
            if keys.is_empty() {
                None
            } else {
                Some(format!("  Section \"{}\": [{}]", node.title, keys.join(", ")))
            }
        })
        .take(MAX_CITING_SECTIONS)
        .collect();

    Prompt::new(
        "Provide a brief analysis of:\n\
         1. Which citations are most central to the paper's argument\n\
         2. How different sections rely on different citation groups\n\
         3. Any patterns in the citation usage\n\n\
         Analysis:",
        format!(
            "{ASSISTANT_ROLE} Analyse how the citations in this paper support its arguments.\n\n\
             Paper Title: {}\n\n\
             Bibliography:\n{}\n\n\
             Citation usage by section:\n{}",
            tree.title(),
            bibliography.join("\n"),
            usage.join("\n")
        ),
    )
}

/// Ask a question against already retrieved context.
pub fn query_answer(title: &str, question: &str, retrieved: &str) -> Prompt {
    Prompt::new(
        format!("Question: {question}\n\nAnswer:"),
        format!(
            "{ASSISTANT_ROLE} Answer the following question based on the paper excerpts.\n\n\
             Paper Title: {title}\n\n\
             Excerpts:\n{}",
            truncate_context(retrieved)
        ),
    )
}

/// Indented outline of the tree, one heading per line.
pub fn outline(tree: &Tree) -> String {
    tree.iter()
        .map(|node| {
            let indent = "  ".repeat(node.depth());
            match node.fresh_summary() {
                Some(summary) => format!("{indent}{} [{}]: {summary}", node.title, node.id),
                None => format!("{indent}{} [{}]", node.title, node.id),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cap `text` at [`MAX_CONTEXT_CHARS`], marking the cut.
pub fn truncate_context(text: &str) -> String {
    match text.char_indices().nth(MAX_CONTEXT_CHARS) {
        Some((cut, _)) => format!("{}\n... [truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperindex_doc_tree::{
        BibliographyEntry, CitationMarker, DocumentMeta, Segment, TreeBuilder,
    };
    use pretty_assertions::assert_eq;

    fn tree() -> Tree {
        let bibliography = vec![
            BibliographyEntry::new("b0", "Cho et al. 2014")
                .with_title("Learning phrase representations")
                .with_authors(vec![
                    "K. Cho".to_string(),
                    "B. van Merrienboer".to_string(),
                    "C. Gulcehre".to_string(),
                    "D. Bahdanau".to_string(),
                ])
                .with_date("2014"),
        ];
        let segments = vec![
            Segment::new(1, "Intro", "Recurrent models [1] dominate.")
                .with_citations(vec![CitationMarker::new("b0", "[1]")]),
            Segment::new(2, "Background", "Attention helps."),
            Segment::new(1, "Method", "We use [1] again.")
                .with_citations(vec![CitationMarker::new("b0", "[1]")]),
        ];
        TreeBuilder::new()
            .build(&segments, DocumentMeta::titled("Attention"), bibliography)
            .unwrap()
            .tree
    }

    #[test]
    fn test_outline_indents_by_depth() {
        assert_eq!(
            outline(&tree()),
            "Attention [0]\n  Intro [0.0]\n    Background [0.0.0]\n  Method [0.1]"
        );
    }

    #[test]
    fn test_node_summary_embeds_body() {
        let tree = tree();
        let prompt = node_summary(tree.node("0.1").unwrap());
        assert!(prompt.context.ends_with("Section Text: We use [1] again."));
        assert!(prompt.instruction.contains("no preamble"));
    }

    #[test]
    fn test_citation_analysis_lists_bibliography_and_usage() {
        let prompt = citation_analysis(&tree());
        assert!(prompt.context.contains(
            "  b0: K. Cho, B. van Merrienboer, C. Gulcehre. \"Learning phrase representations\" (2014)"
        ));
        assert!(prompt.context.contains("  Section \"Intro\": [b0]"));
        assert!(prompt.context.contains("  Section \"Method\": [b0]"));
        assert!(!prompt.context.contains("Section \"Background\""));
        assert!(prompt.instruction.ends_with("Analysis:"));
    }

    #[test]
    fn test_truncate_context() {
        let long = "é".repeat(MAX_CONTEXT_CHARS + 5);
        let cut = truncate_context(&long);
        assert!(cut.ends_with("\n... [truncated]"));
        assert_eq!(cut.chars().filter(|c| *c == 'é').count(), MAX_CONTEXT_CHARS);
        assert_eq!(truncate_context("short"), "short");
    }

    fn cited_tree(sections: usize, entries: usize) -> Tree {
        let bibliography = (0..entries)
            .map(|i| BibliographyEntry::new(format!("b{i}"), format!("Ref {i}")))
            .collect();
        let segments: Vec<Segment> = (0..sections)
            .map(|i| {
                Segment::new(1, format!("Part {i}"), "As shown in [1].")
                    .with_citations(vec![CitationMarker::new(format!("b{i}"), "[1]")])
            })
            .collect();
        TreeBuilder::new()
            .build(&segments, DocumentMeta::titled("Survey"), bibliography)
            .unwrap()
            .tree
    }

    #[test]
    fn test_citation_analysis_caps_entries_and_sections() {
        let prompt = citation_analysis(&cited_tree(25, 35));
        let entries = prompt
            .context
            .lines()
            .filter(|line| line.starts_with("  b"))
            .count();
        let sections = prompt
            .context
            .lines()
            .filter(|line| line.starts_with("  Section \""))
            .count();

        assert_eq!(entries, MAX_BIBLIOGRAPHY_ENTRIES);
        assert_eq!(sections, MAX_CITING_SECTIONS);
        assert!(prompt.context.contains("  b29: "));
        assert!(!prompt.context.contains("  b30: "));
        assert!(prompt.context.contains("Section \"Part 19\""));
        assert!(!prompt.context.contains("Section \"Part 20\""));
    }

    #[test]
    fn test_paper_prompts_cap_outline() {
        let tree = cited_tree(1_000, 0);
        assert!(outline(&tree).chars().count() > MAX_CONTEXT_CHARS);

        for prompt in [paper_summary(&tree), document_description(&tree)] {
            let (_, index) = prompt.context.split_once(":\n").unwrap();
            assert!(index.ends_with("\n... [truncated]"));
            assert!(index.chars().count() <= MAX_CONTEXT_CHARS + "\n... [truncated]".len());
        }
    }

    #[test]
    fn test_paper_prompts_keep_short_outline() {
        let tree = tree();
        let summary = paper_summary(&tree);
        assert!(summary.context.contains("Paper Title: Attention"));
        assert!(summary.context.ends_with(&outline(&tree)));
        assert!(summary.instruction.ends_with("Summary:"));

        let description = document_description(&tree);
        assert!(description.context.ends_with(&outline(&tree)));
        assert!(description.instruction.contains("one-sentence"));
    }

    #[test]
    fn test_query_answer_caps_excerpts() {
        let excerpts = "z".repeat(MAX_CONTEXT_CHARS * 2);
        let prompt = query_answer("Survey", "Why?", &excerpts);
        let kept = prompt.context.chars().filter(|c| *c == 'z').count();
        assert_eq!(kept, MAX_CONTEXT_CHARS);
        assert!(prompt.context.ends_with("\n... [truncated]"));
    }

    #[test]
    fn test_query_answer() {
        let prompt = query_answer("Attention", "What is attention?", "Intro: ...");
        assert_eq!(prompt.instruction, "Question: What is attention?\n\nAnswer:");
        assert!(prompt.context.contains("Paper Title: Attention"));
    }
}
