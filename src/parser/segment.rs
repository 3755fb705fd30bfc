use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::model::{IngredientList, IngredientToken};

// First ingredient after a sentence boundary: ".Water," or ". Water," / "  Water,"
static SENTENCE_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.([A-Z]+[\w\s]*),|[.\s?]\s([A-Z]+[\w\s]*),").unwrap()
});
static LOOSE_FIRST_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"([A-Z][a-z]*),").unwrap());
static NEXT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s([A-Z]+[\w\s]*)").unwrap());

/// Named segmentation heuristics, tried in the configured order.
///
/// `SentenceBoundary` and `LooseCapitalized` are the two first-ingredient
/// patterns of the capitalized-boundary approach: once the first ingredient is
/// found, every following ", Capitalized words" run is an ingredient. A fully
/// lowercase ingredient after the first one is not picked up by either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStrategy {
    SentenceBoundary,
    LooseCapitalized,
    CommaSplit,
}

impl SegmentStrategy {
    pub const CAPITALIZED_BOUNDARY: [SegmentStrategy; 2] =
        [SegmentStrategy::SentenceBoundary, SegmentStrategy::LooseCapitalized];

    pub fn name(&self) -> &'static str {
        match self {
            SegmentStrategy::SentenceBoundary => "sentence_boundary",
            SegmentStrategy::LooseCapitalized => "loose_capitalized",
            SegmentStrategy::CommaSplit => "comma_split",
        }
    }

    pub fn apply(&self, blob: &str) -> Option<Vec<IngredientToken>> {
        let tokens = match self {
            SegmentStrategy::SentenceBoundary => capitalized_run(blob, &SENTENCE_FIRST_RE)?,
            SegmentStrategy::LooseCapitalized => capitalized_run(blob, &LOOSE_FIRST_RE)?,
            SegmentStrategy::CommaSplit => comma_split(blob)?,
        };
        if tokens.is_empty() {
            None
        } else {
            Some(tokens)
        }
    }
}

fn capitalized_run(blob: &str, first_re: &Regex) -> Option<Vec<IngredientToken>> {
    let caps = first_re.captures(blob)?;
    let first = caps.get(1).or_else(|| caps.get(2))?;
    let whole = caps.get(0)?;

    let mut raw = vec![first.as_str()];
    // resume at the comma that closed the first ingredient
    let rest = &blob[whole.end() - 1..];
    raw.extend(
        NEXT_RE
            .captures_iter(rest)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str()),
    );

    Some(raw.into_iter().filter_map(IngredientToken::new).collect())
}

fn comma_split(blob: &str) -> Option<Vec<IngredientToken>> {
    if !blob.contains(", ") {
        return None;
    }
    Some(
        blob.split(", ")
            .map(|frag| frag.trim().to_lowercase())
            .filter_map(|frag| IngredientToken::new(&frag))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segmentation {
    Found {
        strategy: SegmentStrategy,
        tokens: Vec<IngredientToken>,
    },
    /// No first ingredient could be located: ingredient data unavailable.
    NoneFound,
}

impl Segmentation {
    pub fn into_list(self) -> Option<IngredientList> {
        match self {
            Segmentation::Found { tokens, .. } => Some(IngredientList::new(tokens)),
            Segmentation::NoneFound => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Segmenter {
    chain: Vec<SegmentStrategy>,
}

impl Default for Segmenter {
    fn default() -> Self {
        Segmenter {
            chain: vec![
                SegmentStrategy::SentenceBoundary,
                SegmentStrategy::LooseCapitalized,
                SegmentStrategy::CommaSplit,
            ],
        }
    }
}

impl Segmenter {
    pub fn new(chain: Vec<SegmentStrategy>) -> Self {
        Segmenter { chain }
    }

    /// For blobs already isolated to just the ingredient text.
    pub fn isolated() -> Self {
        Segmenter::new(vec![SegmentStrategy::CommaSplit])
    }

    pub fn segment(&self, blob: &str) -> Segmentation {
        if blob.trim().is_empty() {
            return Segmentation::NoneFound;
        }
        for strategy in &self.chain {
            if let Some(tokens) = strategy.apply(blob) {
                debug!(strategy = strategy.name(), tokens = tokens.len(), "segmented ingredients");
                return Segmentation::Found {
                    strategy: *strategy,
                    tokens,
                };
            }
        }
        debug!("no segmentation strategy matched");
        Segmentation::NoneFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(seg: &Segmentation) -> Vec<&str> {
        match seg {
            Segmentation::Found { tokens, .. } => tokens.iter().map(|t| t.as_str()).collect(),
            Segmentation::NoneFound => Vec::new(),
        }
    }

    #[test]
    fn comma_split_isolated_list() {
        let seg = Segmenter::isolated().segment("Water, Glycerin, Niacinamide");
        assert_eq!(names(&seg), vec!["water", "glycerin", "niacinamide"]);
        assert!(matches!(seg, Segmentation::Found { strategy: SegmentStrategy::CommaSplit, .. }));
    }

    #[test]
    fn capitalized_boundary_after_label() {
        let seg = Segmenter::new(SegmentStrategy::CAPITALIZED_BOUNDARY.to_vec())
            .segment("Ingredients: Water, Glycerin.");
        assert_eq!(names(&seg), vec!["water", "glycerin"]);
        // no sentence boundary before "Water", so the looser pattern wins
        assert!(matches!(
            seg,
            Segmentation::Found { strategy: SegmentStrategy::LooseCapitalized, .. }
        ));
    }

    #[test]
    fn sentence_boundary_skips_leading_prose() {
        let blob = "Niacinamide: Visibly brightens skin. Hyaluronic Acid: Hydrates. \
                    Water, Glycerin, Niacinamide, Sodium Hyaluronate.";
        let seg = Segmenter::default().segment(blob);
        assert_eq!(
            names(&seg),
            vec!["water", "glycerin", "niacinamide", "sodium hyaluronate"]
        );
        assert!(matches!(
            seg,
            Segmentation::Found { strategy: SegmentStrategy::SentenceBoundary, .. }
        ));
    }

    #[test]
    fn sentence_boundary_without_space() {
        let seg = Segmenter::new(vec![SegmentStrategy::SentenceBoundary])
            .segment("Suitable for all skin types.Aqua, Squalane, Tocopherol");
        assert_eq!(names(&seg), vec!["aqua", "squalane", "tocopherol"]);
    }

    #[test]
    fn lowercase_tail_is_missed_by_capitalized_strategy() {
        let seg = Segmenter::new(SegmentStrategy::CAPITALIZED_BOUNDARY.to_vec())
            .segment("Water, Glycerin, fragrance, Mica");
        assert_eq!(names(&seg), vec!["water", "glycerin", "mica"]);
    }

    #[test]
    fn falls_back_to_comma_split_for_lowercase_lists() {
        let seg = Segmenter::default().segment("water, glycerin, mineral oil");
        assert_eq!(names(&seg), vec!["water", "glycerin", "mineral oil"]);
        assert!(matches!(seg, Segmentation::Found { strategy: SegmentStrategy::CommaSplit, .. }));
    }

    #[test]
    fn none_found_is_a_value() {
        assert_eq!(Segmenter::default().segment(""), Segmentation::NoneFound);
        assert_eq!(
            Segmenter::default().segment("no ingredient information available"),
            Segmentation::NoneFound
        );
        assert!(Segmentation::NoneFound.into_list().is_none());
    }
}
