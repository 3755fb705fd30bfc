use std::collections::HashSet;

use serde::Serialize;

use crate::model::{IngredientList, IngredientToken, ProductRecord};
use crate::taxonomy::ReferenceTaxonomy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedMatch {
    pub ingredient: IngredientToken,
    /// 1-based position of the first occurrence in the product's list.
    pub rank: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "matches", rename_all = "snake_case")]
pub enum MatchResult {
    NoViolations,
    /// Ordered by rank; each ingredient appears once.
    Violations(Vec<RankedMatch>),
}

impl MatchResult {
    pub fn matches(&self) -> &[RankedMatch] {
        match self {
            MatchResult::NoViolations => &[],
            MatchResult::Violations(m) => m,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, MatchResult::NoViolations)
    }
}

pub fn match_ingredients(list: &IngredientList, taxonomy: &ReferenceTaxonomy) -> MatchResult {
    let mut seen = HashSet::new();
    let matches: Vec<RankedMatch> = list
        .ranked()
        .filter(|(_, token)| taxonomy.contains(token))
        .filter(|(_, token)| seen.insert(*token))
        .map(|(rank, token)| RankedMatch {
            ingredient: token.clone(),
            rank,
        })
        .collect();

    if matches.is_empty() {
        MatchResult::NoViolations
    } else {
        MatchResult::Violations(matches)
    }
}

/// Long-format match row: one per (product, flagged ingredient, rank).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchRow {
    pub product: String,
    pub link: String,
    pub ingredient: IngredientToken,
    pub rank: usize,
}

pub fn match_rows(product: &ProductRecord, result: &MatchResult) -> Vec<MatchRow> {
    result
        .matches()
        .iter()
        .map(|m| MatchRow {
            product: product.name.clone(),
            link: product.link.clone(),
            ingredient: m.ingredient.clone(),
            rank: m.rank,
        })
        .collect()
}
