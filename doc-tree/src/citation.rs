//! Citation linker.
//!
//! Markers arrive with candidate targets already proposed by the extractor.
//! Linking only checks each candidate against the bibliography and binds it;
//! anything that cannot be confirmed is kept and flagged unresolved.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::{BibliographyEntry, CitationMarker};
use crate::node::{CitationRef, CitationResolution};

/// Lookup from normalized candidate keys to bibliography ids.
#[derive(Debug, Clone, Default)]
pub struct CitationLinker {
    ids: HashMap<String, String>,
}

impl CitationLinker {
    /// Index a bibliography for linking.
    pub fn new(bibliography: &[BibliographyEntry]) -> Self {
        let ids = bibliography
            .iter()
            .map(|entry| (normalize(&entry.id).to_string(), entry.id.clone()))
            .collect();
        Self { ids }
    }

    /// Bibliography id a candidate key refers to, if any.
    pub fn resolve(&self, candidate: &str) -> Option<&str> {
        self.ids.get(normalize(candidate)).map(String::as_str)
    }

    /// Bind the markers of one node body.
    ///
    /// Returns one reference per marker, in marker order, plus a report for
    /// every marker that stayed unresolved.
    pub fn link(
        &self,
        node_id: &str,
        body: &str,
        markers: &[CitationMarker],
    ) -> (Vec<CitationRef>, Vec<DanglingCitation>) {
        let mut refs = Vec::with_capacity(markers.len());
        let mut dangling = Vec::new();
        let mut cursor = 0;

        for marker in markers {
            let position = locate(body, &marker.text, cursor);
            if let Some(pos) = position {
                cursor = pos + marker.text.len();
            }

            let resolution = match marker.target.as_deref() {
                Some(candidate) => match self.resolve(candidate) {
                    Some(id) => CitationResolution::Resolved(id.to_string()),
                    None => {
                        dangling.push(DanglingCitation {
                            node_id: node_id.to_string(),
                            marker: marker.text.clone(),
                            target: Some(candidate.to_string()),
                            reason: DanglingReason::NotInBibliography,
                        });
                        CitationResolution::Unresolved
                    }
                },
                None => {
                    dangling.push(DanglingCitation {
                        node_id: node_id.to_string(),
                        marker: marker.text.clone(),
                        target: None,
                        reason: DanglingReason::NoCandidate,
                    });
                    CitationResolution::Unresolved
                }
            };

            refs.push(CitationRef {
                marker: marker.text.clone(),
                position,
                resolution,
            });
        }

        for report in &dangling {
            warn!("Dangling citation: {report}");
        }

        (refs, dangling)
    }
}

fn normalize(key: &str) -> &str {
    key.trim().trim_start_matches('#')
}

/// Find `needle` in `body` at or after byte offset `from`.
fn locate(body: &str, needle: &str, from: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    body.get(from..)
        .and_then(|rest| rest.find(needle))
        .map(|offset| from + offset)
}

/// A citation marker whose target could not be confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingCitation {
    /// Node whose body holds the marker.
    pub node_id: String,

    /// Marker text.
    pub marker: String,

    /// Candidate the extractor proposed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    pub reason: DanglingReason,
}

impl fmt::Display for DanglingCitation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(
                f,
                "{} in node {} points at {target}, which is not in the bibliography",
                self.marker, self.node_id
            ),
            None => write!(
                f,
                "{} in node {} has no candidate target",
                self.marker, self.node_id
            ),
        }
    }
}

/// Why a marker stayed unresolved. Both cases produce the same
/// `Unresolved` flag on the node; the distinction is diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanglingReason {
    /// The extractor proposed no target.
    NoCandidate,
    /// The proposed target is not a bibliography id.
    NotInBibliography,
}
