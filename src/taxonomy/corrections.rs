use serde::{Deserialize, Serialize};
use tracing::warn;

use super::RawReferenceList;
use crate::error::TaxonomyError;

/// Replace every raw entry equal to `raw` with `name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyedCorrection {
    pub raw: String,
    pub name: String,
}

/// Replace the entry at `index` of the concatenated list with `name`.
/// Only valid for one exact source layout.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PositionalCorrection {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorrectionTable {
    #[serde(default)]
    pub keyed: Vec<KeyedCorrection>,
    #[serde(default)]
    pub positional: Vec<PositionalCorrection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionReport {
    pub keyed_applied: usize,
    /// Keyed corrections whose raw name never appeared: upstream drift.
    pub unused_keys: Vec<String>,
    pub positional_applied: usize,
}

impl CorrectionTable {
    pub fn is_empty(&self) -> bool {
        self.keyed.is_empty() && self.positional.is_empty()
    }

    /// Keyed corrections first, then positional ones. Nothing is modified if a
    /// positional index is out of range.
    pub fn apply(&self, list: &mut RawReferenceList) -> Result<CorrectionReport, TaxonomyError> {
        self.validate_positional(list.len())?;

        let (keyed_applied, unused_keys) = self.apply_keyed(list);
        let positional_applied = self.apply_positional(list)?;

        Ok(CorrectionReport {
            keyed_applied,
            unused_keys,
            positional_applied,
        })
    }

    pub fn apply_keyed(&self, list: &mut RawReferenceList) -> (usize, Vec<String>) {
        let mut applied = 0;
        let mut unused = Vec::new();
        for correction in &self.keyed {
            let hits = list.replace_all(&correction.raw, &correction.name);
            if hits == 0 {
                warn!(raw = %correction.raw, "keyed correction matched no extracted name");
                unused.push(correction.raw.clone());
            }
            applied += hits;
        }
        (applied, unused)
    }

    pub fn apply_positional(&self, list: &mut RawReferenceList) -> Result<usize, TaxonomyError> {
        self.validate_positional(list.len())?;
        if !self.positional.is_empty() {
            warn!(
                count = self.positional.len(),
                "applying positional corrections; they break if any source changes length"
            );
        }
        for correction in &self.positional {
            list.set(correction.index, &correction.name);
        }
        Ok(self.positional.len())
    }

    fn validate_positional(&self, len: usize) -> Result<(), TaxonomyError> {
        match self.positional.iter().find(|c| c.index >= len) {
            Some(bad) => Err(TaxonomyError::CorrectionOutOfRange {
                index: bad.index,
                len,
            }),
            None => Ok(()),
        }
    }

    /// Rewrite positional corrections as keyed ones, using the raw names they
    /// currently point at.
    pub fn migrate_positional(
        &self,
        list: &RawReferenceList,
    ) -> Result<Vec<KeyedCorrection>, TaxonomyError> {
        self.validate_positional(list.len())?;
        Ok(self
            .positional
            .iter()
            .filter_map(|c| {
                let raw = list.name(c.index)?;
                (raw != c.name).then(|| KeyedCorrection {
                    raw: raw.to_string(),
                    name: c.name.clone(),
                })
            })
            .collect())
    }
}
