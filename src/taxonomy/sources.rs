use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;

use crate::error::TaxonomyError;

/// Ordered cell-text lists, as handed over by whatever fetched the source.
pub type SourceRows = Vec<Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Table cells, interleaved with severity labels ("High", "Medium") that
    /// are not ingredients.
    SeverityTable,
    /// The name sits in the parent's text after a fixed-width prefix
    /// (the selected element is a rating badge).
    SiblingOffset,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomySource {
    pub name: String,
    pub url: String,
    pub selector: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub skip_labels: Vec<String>,
    /// `[start, end)` slice of the extracted names that are real entries.
    #[serde(default)]
    pub window: Option<(usize, usize)>,
    /// Characters to drop from the front of each parent text.
    #[serde(default)]
    pub offset: usize,
}

impl TaxonomySource {
    pub fn rows_from_html(&self, html: &str) -> Result<SourceRows, TaxonomyError> {
        let selector = Selector::parse(&self.selector).map_err(|e| TaxonomyError::Selector {
            selector: self.selector.clone(),
            message: format!("{:?}", e),
        })?;
        let doc = Html::parse_document(html);

        let rows = match self.kind {
            SourceKind::SeverityTable => doc
                .select(&selector)
                .map(|cell| vec![cell.text().collect::<String>()])
                .collect(),
            SourceKind::SiblingOffset => doc
                .select(&selector)
                .filter_map(|badge| badge.parent().and_then(ElementRef::wrap))
                .map(|parent| vec![parent.text().collect::<String>()])
                .collect(),
        };
        Ok(rows)
    }

    /// Cleaned, ordered ingredient names from raw rows. Empty output means
    /// the source is unusable.
    pub fn extract_names(&self, rows: &[Vec<String>]) -> Result<Vec<String>, TaxonomyError> {
        let cells = rows.iter().flatten();
        let names: Vec<String> = match self.kind {
            SourceKind::SeverityTable => cells
                .map(|c| clean_severity_cell(c))
                .filter(|c| !self.skip_labels.iter().any(|l| l == c))
                .map(|c| c.to_lowercase())
                .collect(),
            SourceKind::SiblingOffset => cells
                .map(|c| clean_offset_cell(c, self.offset))
                .collect(),
        };

        let names = match self.window {
            Some((start, end)) => {
                if start > end || end > names.len() {
                    return Err(TaxonomyError::WindowOutOfRange {
                        source_name: self.name.clone(),
                        start,
                        end,
                        len: names.len(),
                    });
                }
                names[start..end].to_vec()
            }
            None => names,
        };

        if names.is_empty() {
            return Err(TaxonomyError::SourceUnavailable {
                source_name: self.name.clone(),
                reason: "no ingredient names extracted".to_string(),
            });
        }
        Ok(names)
    }
}

fn clean_severity_cell(cell: &str) -> String {
    cell.trim()
        .replace('-', " ")
        .replace(['&', '#'], "")
        .replace("  ", " ")
}

fn clean_offset_cell(cell: &str, offset: usize) -> String {
    let lower = cell.trim().to_lowercase();
    lower
        .chars()
        .skip(offset)
        .collect::<String>()
        .replace(['-', '&'], " ")
        .replace('#', "")
        .trim()
        .to_string()
}
