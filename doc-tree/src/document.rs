//! Upstream record produced by the document-extraction service.
//!
//! The extraction service turns a PDF into a title, an author list, ordered
//! sections carrying inline citation markers, and a bibliography. This module
//! only defines that shape and how it flattens into heading segments; the
//! extraction itself happens elsewhere.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::heading::Segment;

/// Heading used for a section that arrived without one.
pub const UNTITLED_SECTION: &str = "Untitled Section";

/// Structured text for a single paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredDocument {
    /// Paper title.
    #[serde(default)]
    pub title: String,

    /// Authors in byline order.
    #[serde(default)]
    pub authors: Vec<Author>,

    /// Abstract text.
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,

    /// Publication date as reported by the extractor.
    #[serde(default)]
    pub date: String,

    /// Body sections in document order.
    #[serde(default)]
    pub sections: Vec<Section>,

    /// Bibliography entries.
    #[serde(default)]
    pub bibliography: Vec<BibliographyEntry>,
}

impl StructuredDocument {
    /// Parse a record from its JSON form.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a record saved by the extraction step.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Document-level metadata carried onto the tree.
    pub fn meta(&self) -> DocumentMeta {
        DocumentMeta {
            title: self.title.clone(),
            authors: self.authors.clone(),
            date: self.date.clone(),
            abstract_text: self.abstract_text.clone(),
        }
    }

    /// Flatten the record into heading segments.
    ///
    /// The layout follows the markdown rendering of the same record: the
    /// title is the level-1 heading carrying the byline, the abstract and
    /// every top-level section sit one level below it, and the references
    /// close the document.
    pub fn to_segments(&self) -> Vec<Segment> {
        let mut segments = Vec::with_capacity(self.sections.len() + 3);

        let title = if self.title.trim().is_empty() {
            "Untitled"
        } else {
            self.title.trim()
        };
        segments.push(Segment::new(1, title, self.byline()));

        if !self.abstract_text.trim().is_empty() {
            segments.push(Segment::new(2, "Abstract", self.abstract_text.trim()));
        }

        for section in &self.sections {
            segments.push(
                Segment::new(
                    section.level.saturating_add(1),
                    section.display_heading(),
                    section.text.trim(),
                )
                .with_citations(section.citations.clone()),
            );
        }

        if !self.bibliography.is_empty() {
            let references = self
                .bibliography
                .iter()
                .enumerate()
                .map(|(i, entry)| format!("[{}] {}", i + 1, entry.display_text()))
                .collect::<Vec<_>>()
                .join("\n\n");
            segments.push(Segment::new(2, "References", references));
        }

        segments
    }

    fn byline(&self) -> String {
        let mut lines = Vec::new();
        if !self.authors.is_empty() {
            let names = self
                .authors
                .iter()
                .map(Author::display)
                .collect::<Vec<_>>()
                .join("; ");
            lines.push(format!("**Authors:** {names}"));
        }
        if !self.date.is_empty() {
            lines.push(format!("**Date:** {}", self.date));
        }
        lines.join("\n\n")
    }
}

/// A paper author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            affiliation: None,
        }
    }

    pub fn with_affiliation(mut self, affiliation: impl Into<String>) -> Self {
        self.affiliation = Some(affiliation.into());
        self
    }

    /// `Name (Affiliation)`, or just the name.
    pub fn display(&self) -> String {
        match self.affiliation.as_deref().filter(|a| !a.is_empty()) {
            Some(affiliation) => format!("{} ({affiliation})", self.name),
            None => self.name.clone(),
        }
    }
}

/// One body section of the paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Heading text without numbering.
    #[serde(default)]
    pub heading: String,

    /// Section number as printed (`"2.1"`), may be empty.
    #[serde(default)]
    pub section_num: String,

    /// Nesting level, 1 for top-level sections.
    pub level: u32,

    /// Section body with citation markers inline.
    #[serde(default)]
    pub text: String,

    /// Citation markers in the order they occur in `text`.
    #[serde(default)]
    pub citations: Vec<CitationMarker>,
}

impl Section {
    /// `"<num> <heading>"`, falling back to a placeholder when both are empty.
    pub fn display_heading(&self) -> String {
        let parts: Vec<&str> = [self.section_num.trim(), self.heading.trim()]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            UNTITLED_SECTION.to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// An inline citation as reported by the extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationMarker {
    /// Candidate bibliography id (e.g. `#b0`); absent when the extractor
    /// could not propose one.
    #[serde(default, alias = "key", skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Marker text as it reads in the section body.
    #[serde(default)]
    pub text: String,
}

impl CitationMarker {
    pub fn new(target: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            target: Some(target.into()),
            text: text.into(),
        }
    }

    /// A marker the extractor could not attach to any candidate.
    pub fn untargeted(text: impl Into<String>) -> Self {
        Self {
            target: None,
            text: text.into(),
        }
    }
}

/// A bibliography entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographyEntry {
    /// Identifier citation markers point at.
    pub id: String,

    /// Raw citation text, when the extractor kept it.
    #[serde(default)]
    pub raw: String,

    #[serde(default)]
    pub authors: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Publication date (`"1997"`, `"2017-06-12"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

impl BibliographyEntry {
    pub fn new(id: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            raw: raw.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    /// Four-digit year taken from the date, if present.
    pub fn year(&self) -> Option<&str> {
        let date = self.date.as_deref()?;
        let year = date.get(..4)?;
        year.chars().all(|c| c.is_ascii_digit()).then_some(year)
    }

    /// Human-readable reference line.
    ///
    /// Uses the raw text when available, otherwise assembles
    /// `Authors. "Title". *Journal*. (date). DOI: ...` from whatever fields
    /// are present.
    pub fn display_text(&self) -> String {
        if !self.raw.trim().is_empty() {
            return self.raw.trim().to_string();
        }

        let mut parts = Vec::new();
        if !self.authors.is_empty() {
            parts.push(format!("{}.", self.authors.join(", ")));
        }
        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            parts.push(format!("\"{title}\"."));
        }
        if let Some(journal) = self.journal.as_deref().filter(|j| !j.is_empty()) {
            parts.push(format!("*{journal}*."));
        }
        if let Some(date) = self.date.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("({date})."));
        }
        if let Some(doi) = self.doi.as_deref().filter(|d| !d.is_empty()) {
            parts.push(format!("DOI: {doi}"));
        }
        if parts.is_empty() {
            self.id.clone()
        } else {
            parts.join(" ")
        }
    }
}

/// Document-level metadata kept on the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub authors: Vec<Author>,

    #[serde(default)]
    pub date: String,

    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
}

impl DocumentMeta {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> StructuredDocument {
        StructuredDocument {
            title: "Attention Is All You Need".to_string(),
            authors: vec![Author::new("Ashish Vaswani").with_affiliation("Google Brain")],
            abstract_text: "We propose the Transformer.".to_string(),
            date: "2017-06-12".to_string(),
            sections: vec![
                Section {
                    heading: "Introduction".to_string(),
                    section_num: "1".to_string(),
                    level: 1,
                    text: "Recurrent networks [Cho et al., 2014] dominate.".to_string(),
                    citations: vec![CitationMarker::new("#b1", "[Cho et al., 2014]")],
                },
                Section {
                    heading: "Self-Attention".to_string(),
                    section_num: "1.1".to_string(),
                    level: 2,
                    text: String::new(),
                    citations: Vec::new(),
                },
            ],
            bibliography: vec![
                BibliographyEntry::new("b1", "")
                    .with_title("Learning Phrase Representations")
                    .with_authors(vec!["Kyunghyun Cho".to_string()])
                    .with_date("2014"),
            ],
        }
    }

    #[test]
    fn test_to_segments_layout() {
        let segments = sample().to_segments();
        let outline: Vec<(u32, &str)> = segments
            .iter()
            .map(|s| (s.level, s.title.as_str()))
            .collect();

        assert_eq!(
            outline,
            vec![
                (1, "Attention Is All You Need"),
                (2, "Abstract"),
                (2, "1 Introduction"),
                (3, "1.1 Self-Attention"),
                (2, "References"),
            ]
        );
        assert_eq!(
            segments[0].body,
            "**Authors:** Ashish Vaswani (Google Brain)\n\n**Date:** 2017-06-12"
        );
        assert_eq!(segments[2].citations.len(), 1);
        assert!(segments[4].body.starts_with("[1] Kyunghyun Cho."));
    }

    #[test]
    fn test_untitled_section_heading() {
        let section = Section {
            level: 1,
            ..Section::default()
        };
        assert_eq!(section.display_heading(), UNTITLED_SECTION);
    }

    #[test]
    fn test_extractor_json_shape() {
        let json = r##"{
            "title": "T",
            "abstract": "A",
            "sections": [
                {"heading": "Intro", "level": 1, "text": "x [1]",
                 "citations": [{"key": "#b0", "text": "[1]"}, {"text": "[2]"}]}
            ],
            "bibliography": [{"id": "b0", "raw": "Someone. 1999."}]
        }"##;

        let doc = StructuredDocument::from_json_str(json).unwrap();
        assert_eq!(doc.abstract_text, "A");
        assert_eq!(doc.sections[0].citations[0].target.as_deref(), Some("#b0"));
        assert_eq!(doc.sections[0].citations[1].target, None);
        assert_eq!(doc.bibliography[0].display_text(), "Someone. 1999.");
    }

    #[test]
    fn test_bibliography_year() {
        let entry = BibliographyEntry::new("b0", "").with_date("2017-06-12");
        assert_eq!(entry.year(), Some("2017"));
        assert_eq!(BibliographyEntry::new("b1", "").year(), None);
        assert_eq!(
            BibliographyEntry::new("b2", "").with_date("n.d.").year(),
            None
        );
    }
}
