//! Comedogenic reference taxonomy: several scraped lists concatenated in
//! source order, patched by a correction table, canonicalized into tokens.
//!
//! The concatenated list and the correction table are separate values so the
//! index dependency between them can be inspected and tested on its own.

pub mod corrections;
pub mod sources;

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

pub use corrections::{CorrectionReport, CorrectionTable, KeyedCorrection, PositionalCorrection};
pub use sources::{SourceKind, SourceRows, TaxonomySource};

use crate::error::TaxonomyError;
use crate::model::IngredientToken;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawEntry {
    pub source: String,
    pub name: String,
}

/// Extracted names from every source, in concatenation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawReferenceList {
    entries: Vec<RawEntry>,
}

impl RawReferenceList {
    pub fn extend<I>(&mut self, source: &str, names: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.entries.extend(names.into_iter().map(|name| RawEntry {
            source: source.to_string(),
            name,
        }));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RawEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.name.as_str())
    }

    pub(crate) fn set(&mut self, index: usize, name: &str) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.name = name.to_string();
        }
    }

    pub(crate) fn replace_all(&mut self, raw: &str, name: &str) -> usize {
        let mut hits = 0;
        for entry in self.entries.iter_mut().filter(|e| e.name == raw) {
            entry.name = name.to_string();
            hits += 1;
        }
        hits
    }
}

/// Concatenate every source's names in order. Fails on the first source that
/// yields nothing usable.
pub fn concatenate_sources(
    inputs: &[(TaxonomySource, SourceRows)],
) -> Result<RawReferenceList, TaxonomyError> {
    let mut list = RawReferenceList::default();
    for (source, rows) in inputs {
        if rows.is_empty() {
            return Err(TaxonomyError::SourceUnavailable {
                source_name: source.name.clone(),
                reason: "no rows".to_string(),
            });
        }
        let names = source.extract_names(rows)?;
        info!(source = %source.name, names = names.len(), "extracted taxonomy source");
        list.extend(&source.name, names);
    }
    Ok(list)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxonomyEntry {
    pub position: usize,
    pub source: String,
    pub raw: String,
    pub token: Option<IngredientToken>,
}

/// The read-only set of comedogenic tokens, with the entries it came from.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTaxonomy {
    tokens: BTreeSet<IngredientToken>,
    entries: Vec<TaxonomyEntry>,
}

impl ReferenceTaxonomy {
    pub fn from_raw(list: &RawReferenceList) -> Self {
        let entries: Vec<TaxonomyEntry> = list
            .entries()
            .iter()
            .enumerate()
            .map(|(position, e)| TaxonomyEntry {
                position,
                source: e.source.clone(),
                raw: e.name.clone(),
                token: IngredientToken::new(&e.name),
            })
            .collect();
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<TaxonomyEntry>) -> Self {
        let tokens = entries.iter().filter_map(|e| e.token.clone()).collect();
        ReferenceTaxonomy { tokens, entries }
    }

    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut list = RawReferenceList::default();
        list.extend("inline", names.iter().map(|n| n.as_ref().to_string()));
        Self::from_raw(&list)
    }

    pub fn contains(&self, token: &IngredientToken) -> bool {
        self.tokens.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> impl Iterator<Item = &IngredientToken> {
        self.tokens.iter()
    }

    pub fn entries(&self) -> &[TaxonomyEntry] {
        &self.entries
    }
}

/// All-or-nothing build: every source must load and every correction must
/// apply, or no taxonomy is produced.
pub fn build_taxonomy(
    inputs: &[(TaxonomySource, SourceRows)],
    corrections: &CorrectionTable,
) -> Result<(ReferenceTaxonomy, CorrectionReport), TaxonomyError> {
    let mut list = concatenate_sources(inputs)?;
    let report = corrections.apply(&mut list)?;
    if !report.unused_keys.is_empty() {
        warn!(
            unused = report.unused_keys.len(),
            "some keyed corrections matched nothing; a source may have changed"
        );
    }

    let taxonomy = ReferenceTaxonomy::from_raw(&list);
    info!(
        raw = list.len(),
        tokens = taxonomy.len(),
        "built reference taxonomy"
    );
    Ok((taxonomy, report))
}
