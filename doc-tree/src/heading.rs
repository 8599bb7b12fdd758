//! Heading parser.
//!
//! Splits heading-annotated text into ordered `(level, title, body)`
//! segments. Only ATX-style `#` headings are recognized; everything else is
//! body text.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::CitationMarker;

static HEADING_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#+)(?:[ \t]+(.*))?$").ok());

/// A heading-delimited unit of text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Heading level; 0 marks text that preceded the first heading.
    pub level: u32,

    /// Heading text.
    pub title: String,

    /// Text up to the next heading.
    pub body: String,

    /// Citation markers the extractor found in `body`.
    #[serde(default)]
    pub citations: Vec<CitationMarker>,
}

impl Segment {
    pub fn new(level: u32, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            body: body.into(),
            citations: Vec::new(),
        }
    }

    /// Attach the citation markers for this segment's body.
    pub fn with_citations(mut self, citations: Vec<CitationMarker>) -> Self {
        self.citations = citations;
        self
    }

    /// Check if this is the preamble segment.
    pub fn is_preamble(&self) -> bool {
        self.level == 0
    }
}

/// Parse heading-annotated text into segments.
///
/// Text before the first heading becomes a level-0 preamble segment when it
/// is not blank. Levels may skip (`#` followed by `###`); heading-only
/// segments keep an empty body. Lines inside fenced code blocks are never
/// headings.
pub fn parse_headings(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current: Option<(u32, String)> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut fence: Option<&'static str> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            body.push(line);
            continue;
        }
        if let Some(marker) = ["```", "~~~"].into_iter().find(|m| trimmed.starts_with(m)) {
            fence = Some(marker);
            body.push(line);
            continue;
        }

        match match_heading(line) {
            Some((level, title)) => {
                flush(&mut segments, current.take(), &body);
                body.clear();
                current = Some((level, title));
            }
            None => body.push(line),
        }
    }
    flush(&mut segments, current, &body);

    debug!("Parsed {} segments", segments.len());
    segments
}

fn flush(segments: &mut Vec<Segment>, heading: Option<(u32, String)>, body: &[&str]) {
    let body = join_body(body);
    match heading {
        Some((level, title)) => segments.push(Segment::new(level, title, body)),
        None if !body.is_empty() => segments.push(Segment::new(0, "", body)),
        None => {}
    }
}

/// Join body lines, dropping blank lines at either end.
fn join_body(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

fn match_heading(line: &str) -> Option<(u32, String)> {
    let re = HEADING_RE.as_ref()?;
    let caps = re.captures(line)?;
    let level = u32::try_from(caps.get(1)?.as_str().len()).ok()?;
    let raw = caps.get(2).map_or("", |m| m.as_str());
    Some((level, strip_closing_hashes(raw.trim())))
}

/// Remove an optional closing `#` run (`## Title ##`).
fn strip_closing_hashes(title: &str) -> String {
    let stripped = title.trim_end_matches('#');
    if stripped.len() != title.len() && (stripped.is_empty() || stripped.ends_with([' ', '\t'])) {
        stripped.trim_end().to_string()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn outline(segments: &[Segment]) -> Vec<(u32, &str, &str)> {
        segments
            .iter()
            .map(|s| (s.level, s.title.as_str(), s.body.as_str()))
            .collect()
    }

    #[test]
    fn test_heading_regex_compiles() {
        assert!(HEADING_RE.is_some());
    }

    #[test]
    fn test_basic_segments() {
        let text = "# Title\np0\n## Intro\np1\n## Method\np2\n### Setup\np3\n";
        assert_eq!(
            outline(&parse_headings(text)),
            vec![
                (1, "Title", "p0"),
                (2, "Intro", "p1"),
                (2, "Method", "p2"),
                (3, "Setup", "p3"),
            ]
        );
    }

    #[test]
    fn test_preamble_becomes_level_zero() {
        let text = "Preprint, do not cite.\n\n# Title\nbody\n";
        let segments = parse_headings(text);
        assert_eq!(
            outline(&segments),
            vec![(0, "", "Preprint, do not cite."), (1, "Title", "body")]
        );
        assert!(segments[0].is_preamble());
    }

    #[test]
    fn test_blank_preamble_is_dropped() {
        let segments = parse_headings("\n\n   \n# Title\n");
        assert_eq!(outline(&segments), vec![(1, "Title", "")]);
    }

    #[test]
    fn test_level_skips_and_empty_bodies() {
        let text = "# A\n### B\n## C\n\n\ntext\n\n";
        assert_eq!(
            outline(&parse_headings(text)),
            vec![(1, "A", ""), (3, "B", ""), (2, "C", "text")]
        );
    }

    #[test]
    fn test_deep_levels_are_accepted() {
        let segments = parse_headings("####### Seven\nx");
        assert_eq!(outline(&segments), vec![(7, "Seven", "x")]);
    }

    #[test]
    fn test_code_fence_hides_headings() {
        let text = "# Code\n```python\n# not a heading\n```\nafter\n## Next\n";
        let segments = parse_headings(text);
        assert_eq!(segments.len(), 2);
        assert_eq!(
            segments[0].body,
            "```python\n# not a heading\n```\nafter"
        );
        assert_eq!(segments[1].title, "Next");
    }

    #[test]
    fn test_hash_without_space_is_body() {
        let segments = parse_headings("# Tags\n#rust is fun\n");
        assert_eq!(outline(&segments), vec![(1, "Tags", "#rust is fun")]);
    }

    #[test]
    fn test_closing_hashes_are_stripped() {
        let segments = parse_headings("## Results ##\n### C# usage\n#\n");
        assert_eq!(
            outline(&segments),
            vec![(2, "Results", ""), (3, "C# usage", ""), (1, "", "")]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_headings("").is_empty());
    }
}
