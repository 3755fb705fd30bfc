use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use super::locate::ContentBlock;
use crate::config::PageSelectors;
use crate::error::SelectorError;

static KIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b(set|kit)s?\b").unwrap());

/// Identity fields and ordered content blocks of one product page.
#[derive(Debug, Clone)]
pub struct ProductPage {
    pub name: String,
    pub brand: Option<String>,
    pub price: Option<String>,
    pub blocks: Vec<ContentBlock>,
}

/// `PageSelectors` parsed once, shared across pages.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    name: Selector,
    brand: Selector,
    price: Selector,
    details: Selector,
}

impl CompiledSelectors {
    pub fn compile(s: &PageSelectors) -> Result<Self, SelectorError> {
        Ok(CompiledSelectors {
            name: parse_selector("name", &s.name)?,
            brand: parse_selector("brand", &s.brand)?,
            price: parse_selector("price", &s.price)?,
            details: parse_selector("details", &s.details)?,
        })
    }
}

fn parse_selector(field: &'static str, css: &str) -> Result<Selector, SelectorError> {
    Selector::parse(css).map_err(|e| SelectorError {
        field,
        selector: css.to_string(),
        message: format!("{:?}", e),
    })
}

pub fn is_kit_or_set(name: &str) -> bool {
    KIT_RE.is_match(name)
}

/// `None` when the page has no product name or is a kit/set.
pub fn parse_product_page(html: &str, selectors: &CompiledSelectors) -> Option<ProductPage> {
    let doc = Html::parse_document(html);
    let first_text = |sel: &Selector| {
        doc.select(sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    };

    let name = first_text(&selectors.name)?;
    if is_kit_or_set(&name) {
        return None;
    }

    let blocks = doc
        .select(&selectors.details)
        .map(|el| ContentBlock::Markup(el.inner_html()))
        .collect();

    Some(ProductPage {
        brand: first_text(&selectors.brand),
        price: first_text(&selectors.price),
        name,
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    fn selectors() -> CompiledSelectors {
        CompiledSelectors::compile(&Settings::from_toml("").unwrap().selectors).unwrap()
    }

    #[test]
    fn kit_and_set_names() {
        assert!(is_kit_or_set("Mini Skincare Set"));
        assert!(is_kit_or_set("Brow KIT"));
        assert!(is_kit_or_set("Travel Sets"));
        assert!(!is_kit_or_set("Sunset Glow Serum"));
        assert!(!is_kit_or_set("Kitten Heel Lip Balm"));
    }

    #[test]
    fn product_fixture() {
        let html = std::fs::read_to_string("tests/fixtures/product.html").unwrap();
        let page = parse_product_page(&html, &selectors()).unwrap();
        assert_eq!(page.name, "Protini Polypeptide Cream");
        assert_eq!(page.brand.as_deref(), Some("Drunk Elephant"));
        assert_eq!(page.price.as_deref(), Some("$68.00"));
        assert_eq!(page.blocks.len(), 3);
        assert!(page.blocks[2].text().contains("Water, Dicaprylyl Carbonate"));
    }

    #[test]
    fn kit_page_skipped() {
        let html = r#"<html><body><span class="css-0">Glow Starter Kit</span></body></html>"#;
        assert!(parse_product_page(html, &selectors()).is_none());
    }

    #[test]
    fn page_without_name_skipped() {
        let html = r#"<html><body><div class="css-pz80c5">Water, Glycerin</div></body></html>"#;
        assert!(parse_product_page(html, &selectors()).is_none());
    }

    #[test]
    fn bad_selector_is_reported() {
        let mut s = Settings::from_toml("").unwrap().selectors;
        s.price = "div..".to_string();
        let err = CompiledSelectors::compile(&s).unwrap_err();
        assert_eq!(err.field, "price");
    }
}
