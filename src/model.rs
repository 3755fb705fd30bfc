use std::collections::BTreeMap;
use std::fmt;

use itertools::Itertools;
use serde::Serialize;

/// One canonical ingredient name: lowercase, no hyphens, parentheses or punctuation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct IngredientToken(String);

impl IngredientToken {
    /// Canonicalize `raw` into a token. Returns `None` when nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let mut out = String::with_capacity(raw.len());
        let mut pending_space = false;

        for c in raw.chars() {
            if c.is_alphanumeric() {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.extend(c.to_lowercase());
            } else if c.is_whitespace() || matches!(c, '-' | '&' | '/') {
                pending_space = true;
            }
            // everything else is punctuation and dropped
        }

        if out.is_empty() {
            None
        } else {
            Some(IngredientToken(out))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IngredientToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered ingredient tokens of one product. Order is declaration order, which
/// by INCI convention is descending concentration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IngredientList(Vec<IngredientToken>);

impl IngredientList {
    pub fn new(tokens: Vec<IngredientToken>) -> Self {
        IngredientList(tokens)
    }

    /// Build from raw strings, dropping anything that canonicalizes to nothing.
    pub fn from_raw<S: AsRef<str>>(items: &[S]) -> Self {
        IngredientList(items.iter().filter_map(|s| IngredientToken::new(s.as_ref())).collect())
    }

    pub fn tokens(&self) -> &[IngredientToken] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First 1-based rank of `token`, if present.
    pub fn rank_of(&self, token: &IngredientToken) -> Option<usize> {
        self.0.iter().position(|t| t == token).map(|i| i + 1)
    }

    /// `(rank, token)` pairs, 1-based.
    pub fn ranked(&self) -> impl Iterator<Item = (usize, &IngredientToken)> {
        self.0.iter().enumerate().map(|(i, t)| (i + 1, t))
    }
}

/// How the ingredient list of a product came to be (or why it is empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionStatus {
    Extracted {
        locator: &'static str,
        segmenter: &'static str,
    },
    BlockNotFound,
    SegmentationMiss,
}

impl ExtractionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ExtractionStatus::Extracted { .. } => "extracted",
            ExtractionStatus::BlockNotFound => "block_not_found",
            ExtractionStatus::SegmentationMiss => "segmentation_miss",
        }
    }

    pub fn is_extracted(&self) -> bool {
        matches!(self, ExtractionStatus::Extracted { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductRecord {
    pub name: String,
    pub brand: Option<String>,
    pub price: Option<String>,
    pub link: String,
    pub raw_ingredients: Option<String>,
    pub ingredients: IngredientList,
    pub status: ExtractionStatus,
}

/// Long-format row: one per (product, ingredient, rank).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngredientRow {
    pub product: String,
    pub ingredient: IngredientToken,
    pub rank: usize,
}

pub fn flatten_products(products: &[ProductRecord]) -> Vec<IngredientRow> {
    products
        .iter()
        .flat_map(|p| {
            p.ingredients.ranked().map(move |(rank, token)| IngredientRow {
                product: p.name.clone(),
                ingredient: token.clone(),
                rank,
            })
        })
        .collect()
}

/// Rebuild per-product ingredient lists from long-format rows.
pub fn regroup_rows<I>(rows: I) -> BTreeMap<String, IngredientList>
where
    I: IntoIterator<Item = IngredientRow>,
{
    rows.into_iter()
        .map(|r| (r.product, (r.rank, r.ingredient)))
        .into_group_map()
        .into_iter()
        .map(|(product, mut ranked)| {
            ranked.sort_by_key(|(rank, _)| *rank);
            let tokens = ranked.into_iter().map(|(_, t)| t).collect();
            (product, IngredientList::new(tokens))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(s: &str) -> IngredientToken {
        IngredientToken::new(s).unwrap()
    }

    fn product(name: &str, items: &[&str]) -> ProductRecord {
        ProductRecord {
            name: name.to_string(),
            brand: None,
            price: None,
            link: format!("https://example.com/{}", name),
            raw_ingredients: None,
            ingredients: IngredientList::from_raw(items),
            status: ExtractionStatus::Extracted {
                locator: "positional_block",
                segmenter: "comma_split",
            },
        }
    }

    #[test]
    fn token_canonicalization() {
        assert_eq!(tok("Mineral Oil").as_str(), "mineral oil");
        assert_eq!(tok(" Ceteareth-20 ").as_str(), "ceteareth 20");
        assert_eq!(tok("D&C Red #3").as_str(), "d c red 3");
        assert_eq!(tok("Glyceryl Stearate (SE).").as_str(), "glyceryl stearate se");
        assert_eq!(tok("Caprylic/Capric Triglyceride").as_str(), "caprylic capric triglyceride");
        assert!(IngredientToken::new(" ., ()").is_none());
    }

    #[test]
    fn rank_is_first_occurrence() {
        let list = IngredientList::from_raw(&["Water", "Glycerin", "Water"]);
        assert_eq!(list.len(), 3);
        assert_eq!(list.rank_of(&tok("water")), Some(1));
        assert_eq!(list.rank_of(&tok("glycerin")), Some(2));
        assert_eq!(list.rank_of(&tok("squalane")), None);
    }

    #[test]
    fn flatten_then_regroup_round_trips() {
        let products = vec![
            product("Day Cream", &["Water", "Mineral Oil", "Glycerin"]),
            product("Night Serum", &["Squalane", "Water", "Squalane"]),
        ];
        let rows = flatten_products(&products);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[1].rank, 2);

        // shuffle order to prove regroup sorts by rank
        let mut reversed = rows.clone();
        reversed.reverse();
        let grouped = regroup_rows(reversed);
        for p in &products {
            assert_eq!(grouped[&p.name], p.ingredients);
        }
    }

    #[test]
    fn empty_products_produce_no_rows() {
        let mut p = product("Mystery Balm", &[]);
        p.status = ExtractionStatus::BlockNotFound;
        assert!(flatten_products(&[p]).is_empty());
    }
}
