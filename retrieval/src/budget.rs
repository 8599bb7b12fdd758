//! Size budgets and the truncation policy for context bundles.
//!
//! A bundle that does not fit sheds content in a fixed order: descendant
//! sections deepest first (later ones first among equals), then the body
//! (trimmed on a character boundary, then removed) together with its
//! summary, then child titles, then ancestor titles farthest first. The
//! title is never cut; a bundle whose title alone overflows is dropped.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bundle::ContextBundle;

/// Average characters per token used by the token estimate.
pub const CHARS_PER_TOKEN: f64 = 3.5;

/// What a budget counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetUnit {
    #[default]
    Characters,
    /// Estimated tokens, about 3.5 characters each.
    Tokens,
}

impl BudgetUnit {
    /// Size of `text` in this unit. Non-empty text is at least one token.
    pub fn measure(self, text: &str) -> usize {
        let chars = text.chars().count();
        match self {
            Self::Characters => chars,
            Self::Tokens if chars == 0 => 0,
            Self::Tokens => ((chars as f64 / CHARS_PER_TOKEN) as usize).max(1),
        }
    }
}

/// Upper bound on the total size of retrieved context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub limit: usize,
    #[serde(default)]
    pub unit: BudgetUnit,
}

impl Budget {
    pub fn characters(limit: usize) -> Self {
        Self {
            limit,
            unit: BudgetUnit::Characters,
        }
    }

    pub fn tokens(limit: usize) -> Self {
        Self {
            limit,
            unit: BudgetUnit::Tokens,
        }
    }

    pub fn measure(&self, text: &str) -> usize {
        self.unit.measure(text)
    }
}

impl Default for Budget {
    fn default() -> Self {
        Self::characters(4_000)
    }
}

/// Shrink `bundle` until it measures at most `available`.
///
/// Returns `None` when even the title does not fit. The returned bundle has
/// `truncated` set if anything was removed.
pub fn fit(mut bundle: ContextBundle, available: usize, unit: BudgetUnit) -> Option<ContextBundle> {
    if bundle.size(unit) <= available {
        return Some(bundle);
    }
    bundle.truncated = true;

    while bundle.size(unit) > available {
        let Some(deepest) = bundle
            .descendants
            .iter()
            .enumerate()
            .max_by_key(|(index, section)| (section.depth, *index))
            .map(|(index, _)| index)
        else {
            break;
        };
        let dropped = bundle.descendants.remove(deepest);
        debug!("Dropped section {} from bundle {}", dropped.node_id, bundle.node_id);
    }
    if bundle.size(unit) <= available {
        return Some(bundle);
    }

    let body = std::mem::take(&mut bundle.body);
    // Failure markers carry no size and stay visible.
    if bundle.size(unit) > available && bundle.summary.as_ref().is_some_and(|s| !s.is_failed()) {
        bundle.summary = None;
    }
    let without_body = bundle.size(unit);
    if without_body < available {
        bundle.body = longest_prefix(&body, available - without_body, unit).to_string();
        return Some(bundle);
    }

    while bundle.size(unit) > available && bundle.child_titles.pop().is_some() {}
    while bundle.size(unit) > available && !bundle.ancestor_titles.is_empty() {
        bundle.ancestor_titles.remove(0);
    }

    (bundle.size(unit) <= available).then_some(bundle)
}

/// Longest prefix of `text`, cut on a character boundary, measuring at most
/// `available`.
fn longest_prefix(text: &str, available: usize, unit: BudgetUnit) -> &str {
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .skip(1)
        .chain(std::iter::once(text.len()))
        .collect();

    // `boundaries[k]` ends the prefix holding k + 1 characters.
    let (mut low, mut high) = (0, boundaries.len());
    while low < high {
        let mid = (low + high) / 2;
        if unit.measure(&text[..boundaries[mid]]) <= available {
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    match low {
        0 => "",
        n => &text[..boundaries[n - 1]],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::BundleSection;
    use paperindex_llm::SummaryOutcome;
    use pretty_assertions::assert_eq;

    fn section(id: &str, depth: usize, title: &str, body: &str) -> BundleSection {
        BundleSection {
            node_id: id.to_string(),
            depth,
            title: title.to_string(),
            body: body.to_string(),
        }
    }

    fn bundle() -> ContextBundle {
        ContextBundle {
            document_id: None,
            node_id: "0.1".to_string(),
            title: "Model".to_string(),
            body: "0123456789".to_string(),
            descendants: vec![
                section("0.1.0", 1, "A", "aaaa"),
                section("0.1.0.0", 2, "B", "bbbb"),
                section("0.1.1", 1, "C", "cccc"),
                section("0.1.1.0", 2, "D", "dddd"),
            ],
            ancestor_titles: vec!["Root".to_string(), "Mid".to_string()],
            child_titles: vec!["A".to_string(), "C".to_string()],
            summary: None,
            score: 1.0,
            position: 2,
            truncated: false,
        }
    }

    fn section_ids(bundle: &ContextBundle) -> Vec<&str> {
        bundle.descendants.iter().map(|d| d.node_id.as_str()).collect()
    }

    #[test]
    fn test_measure() {
        assert_eq!(BudgetUnit::Characters.measure("héllo"), 5);
        assert_eq!(BudgetUnit::Tokens.measure(""), 0);
        assert_eq!(BudgetUnit::Tokens.measure("ab"), 1);
        assert_eq!(BudgetUnit::Tokens.measure(&"x".repeat(35)), 10);
    }

    #[test]
    fn test_fitting_bundle_is_untouched() {
        let original = bundle();
        let size = original.size(BudgetUnit::Characters);
        assert_eq!(size, 44);
        assert_eq!(fit(original.clone(), size, BudgetUnit::Characters), Some(original));
    }

    #[test]
    fn test_deepest_later_sections_go_first() {
        // Dropping D (5 chars) is enough.
        let fitted = fit(bundle(), 39, BudgetUnit::Characters).unwrap();
        assert_eq!(section_ids(&fitted), vec!["0.1.0", "0.1.0.0", "0.1.1"]);
        assert!(fitted.truncated);

        // Both depth-2 sections go before any depth-1 section.
        let fitted = fit(bundle(), 34, BudgetUnit::Characters).unwrap();
        assert_eq!(section_ids(&fitted), vec!["0.1.0", "0.1.1"]);
    }

    #[test]
    fn test_body_is_trimmed_after_sections() {
        // Without sections: 5 + 10 + 7 + 2 = 24.
        let fitted = fit(bundle(), 18, BudgetUnit::Characters).unwrap();
        assert!(fitted.descendants.is_empty());
        assert_eq!(fitted.body, "0123");
        assert_eq!(fitted.size(BudgetUnit::Characters), 18);
    }

    #[test]
    fn test_trim_respects_char_boundaries() {
        let mut wide = bundle();
        wide.descendants.clear();
        wide.body = "ééééé".to_string();
        let fitted = fit(wide, 17, BudgetUnit::Characters).unwrap();
        assert_eq!(fitted.body, "ééé");
    }

    #[test]
    fn test_headings_shed_after_body() {
        let mut with_summary = bundle();
        with_summary.summary = Some(SummaryOutcome::Ready("sum".to_string()));

        // Title 5 + ancestors 7 + children 2 = 14, no room left for body.
        let fitted = fit(with_summary, 14, BudgetUnit::Characters).unwrap();
        assert_eq!(fitted.body, "");
        assert_eq!(fitted.summary, None);
        assert_eq!(fitted.child_titles.len(), 2);

        let fitted = fit(bundle(), 9, BudgetUnit::Characters).unwrap();
        assert!(fitted.child_titles.is_empty());
        assert_eq!(fitted.ancestor_titles, vec!["Mid"]);

        let fitted = fit(bundle(), 5, BudgetUnit::Characters).unwrap();
        assert_eq!(fitted.title, "Model");
        assert_eq!(fitted.size(BudgetUnit::Characters), 5);
    }

    #[test]
    fn test_title_never_cut() {
        assert_eq!(fit(bundle(), 4, BudgetUnit::Characters), None);
    }

    #[test]
    fn test_token_budget() {
        let mut long = bundle();
        long.descendants.clear();
        long.ancestor_titles.clear();
        long.child_titles.clear();
        long.body = "word ".repeat(70);

        let fitted = fit(long, 20, BudgetUnit::Tokens).unwrap();
        assert!(fitted.size(BudgetUnit::Tokens) <= 20);
        assert!(!fitted.body.is_empty());
    }
}
