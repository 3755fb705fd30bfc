//! INCI ingredient-function reference (EU CosIng inventory): one long-format
//! row per (ingredient, function), plus the function category glossary.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Serialize;
use tracing::warn;

use crate::error::SelectorError;

static TBODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody").unwrap());
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InciFunctionRow {
    pub name: String,
    pub description: String,
    /// 1-based position of the function within the ingredient's list.
    pub function_number: usize,
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InciCategory {
    pub category: String,
    pub description: String,
}

/// Cell texts of every row of the first `<tbody>`.
pub fn table_rows_from_html(html: &str) -> Vec<Vec<String>> {
    let doc = Html::parse_document(html);
    let Some(table) = doc.select(&TBODY).next() else {
        return Vec::new();
    };
    table
        .select(&TR)
        .map(|row| {
            row.select(&TD)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .collect()
        })
        .collect()
}

/// `columns` are the name, description and function column indices. The
/// first row is a header. Functions are "/"-separated.
pub fn parse_function_rows(rows: &[Vec<String>], columns: [usize; 3]) -> Vec<InciFunctionRow> {
    let [name_col, desc_col, func_col] = columns;
    let mut out = Vec::new();

    for row in rows.iter().skip(1) {
        let Some(name) = row.get(name_col).filter(|n| !n.is_empty()) else {
            continue;
        };
        let description = row.get(desc_col).cloned().unwrap_or_default();
        let functions = row.get(func_col).map(|f| f.to_uppercase()).unwrap_or_default();

        out.extend(
            functions
                .split('/')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .enumerate()
                .map(|(i, f)| InciFunctionRow {
                    name: name.clone(),
                    description: description.clone(),
                    function_number: i + 1,
                    function: f.to_string(),
                }),
        );
    }
    out
}

pub fn paragraphs_from_html(html: &str, selector: &str) -> Result<Vec<String>, SelectorError> {
    let sel = Selector::parse(selector).map_err(|e| SelectorError {
        field: "inci.category_selector",
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&sel)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .collect())
}

/// Category names are the all-uppercase paragraphs inside `window`; each is
/// paired with the descriptions in order.
pub fn parse_categories(paragraphs: &[String], window: (usize, usize)) -> Vec<InciCategory> {
    let (start, end) = window;
    let end = end.min(paragraphs.len());
    if start >= end {
        warn!(start, end, available = paragraphs.len(), "category window is empty");
        return Vec::new();
    }

    let (names, descriptions): (Vec<&String>, Vec<&String>) = paragraphs[start..end]
        .iter()
        .filter(|p| !p.is_empty())
        .partition(|p| p.to_uppercase() == **p);

    if names.len() != descriptions.len() {
        warn!(
            names = names.len(),
            descriptions = descriptions.len(),
            "unbalanced category paragraphs"
        );
    }

    names
        .into_iter()
        .zip(descriptions)
        .map(|(c, d)| InciCategory {
            category: c.clone(),
            description: d.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn functions_split_into_rows() {
        let rows = vec![
            row(&["INCI name", "a", "b", "c", "d", "Description", "e", "Function"]),
            row(&["GLYCERIN", "", "", "", "", "Propane-1,2,3-triol", "", "denaturant/humectant/solvent"]),
            row(&["AQUA", "", "", "", "", "Water", "", "Solvent"]),
            row(&["", "", "", "", "", "orphan", "", "solvent"]),
        ];
        let out = parse_function_rows(&rows, [0, 5, 7]);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].function, "DENATURANT");
        assert_eq!(out[2].function_number, 3);
        assert_eq!(out[2].function, "SOLVENT");
        assert_eq!(out[3].name, "AQUA");
        assert_eq!(out[3].description, "Water");
    }

    #[test]
    fn short_rows_are_tolerated() {
        let rows = vec![row(&["header"]), row(&["MICA"])];
        assert!(parse_function_rows(&rows, [0, 5, 7]).is_empty());
    }

    #[test]
    fn categories_pair_names_with_descriptions() {
        let paragraphs: Vec<String> = [
            "preamble",
            "ABRASIVE",
            "Removes materials from various body surfaces",
            "ANTIOXIDANT",
            "Inhibits reactions promoted by oxygen",
            "trailer",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let cats = parse_categories(&paragraphs, (1, 5));
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[1].category, "ANTIOXIDANT");
        assert_eq!(cats[1].description, "Inhibits reactions promoted by oxygen");
    }

    #[test]
    fn table_rows_from_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/inci_table.html").unwrap();
        let rows = table_rows_from_html(&html);
        let out = parse_function_rows(&rows, [0, 5, 7]);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|r| r.name == "GLYCERIN" || r.name == "MICA"));
        let paragraphs = paragraphs_from_html(&html, "p.norm").unwrap();
        assert_eq!(parse_categories(&paragraphs, (0, 10)).len(), 1);
    }
}
