use anyhow::{Context, Result};
use regex::Regex;
use tracing::{info, warn};

use crate::config::SitemapSettings;

#[derive(Debug, Default, PartialEq, Eq)]
struct ParsedSitemap {
    pages: Vec<String>,
    children: Vec<String>,
}

/// Fetch the configured sitemap (following a sitemap index one level) and
/// return product page URLs.
pub async fn fetch_product_urls(
    client: &reqwest::Client,
    settings: &SitemapSettings,
) -> Result<Vec<String>> {
    let re = Regex::new(&settings.product_pattern).context("Invalid sitemap.product_pattern")?;

    info!("Fetching sitemap: {}", settings.url);
    let root = parse_sitemap(&fetch_xml(client, &settings.url).await?)?;
    let mut all_urls = root.pages;

    for child in &root.children {
        match fetch_xml(client, child).await.and_then(|xml| parse_sitemap(&xml)) {
            Ok(parsed) => all_urls.extend(parsed.pages),
            Err(e) => warn!("Skipping child sitemap {}: {}", child, e),
        }
    }
    info!("Total URLs in sitemap: {}", all_urls.len());

    let filtered = filter_product_urls(all_urls, &re, &settings.exclude);
    info!("Product pages after filtering: {}", filtered.len());
    Ok(filtered)
}

pub fn filter_product_urls(urls: Vec<String>, re: &Regex, exclude: &[String]) -> Vec<String> {
    urls.into_iter()
        .filter(|url| re.is_match(url))
        .filter(|url| {
            let lower = url.to_lowercase();
            !exclude.iter().any(|x| lower.contains(&x.to_lowercase()))
        })
        .collect()
}

async fn fetch_xml(client: &reqwest::Client, url: &str) -> Result<String> {
    client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("Failed to fetch sitemap {}", url))
}

/// Parse a `<urlset>` or `<sitemapindex>` and return its `<loc>` URLs.
fn parse_sitemap(xml: &str) -> Result<ParsedSitemap> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut parsed = ParsedSitemap::default();
    let mut in_url = false;
    let mut in_sitemap = false;
    let mut in_loc = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => match e.name().as_ref() {
                b"url" => in_url = true,
                b"sitemap" => in_sitemap = true,
                b"loc" if in_url || in_sitemap => in_loc = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(e)) if in_loc => {
                let loc = e.unescape()?.trim().to_string();
                if in_sitemap {
                    parsed.children.push(loc);
                } else {
                    parsed.pages.push(loc);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.name().as_ref() {
                b"loc" => in_loc = false,
                b"url" => in_url = false,
                b"sitemap" => in_sitemap = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
        buf.clear();
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlset() {
        let xml = r#"<?xml version="1.0"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://www.sephora.com/product/protini-P427421</loc></url>
  <url><loc>https://www.sephora.com/shop/skincare</loc></url>
</urlset>"#;
        let parsed = parse_sitemap(xml).unwrap();
        assert_eq!(parsed.pages.len(), 2);
        assert!(parsed.children.is_empty());
    }

    #[test]
    fn sitemap_index() {
        let xml = r#"<sitemapindex>
  <sitemap><loc>https://www.sephora.com/products-sitemap_en-US.xml</loc></sitemap>
</sitemapindex>"#;
        let parsed = parse_sitemap(xml).unwrap();
        assert!(parsed.pages.is_empty());
        assert_eq!(parsed.children, vec!["https://www.sephora.com/products-sitemap_en-US.xml"]);
    }

    #[test]
    fn filters_products_and_exclusions() {
        let re = Regex::new(r"^https://www\.sephora\.com/product/[A-Za-z0-9][A-Za-z0-9_-]*$").unwrap();
        let urls = vec![
            "https://www.sephora.com/product/protini-P427421".to_string(),
            "https://www.sephora.com/product/glow-set-P1".to_string(),
            "https://www.sephora.com/shop/skincare".to_string(),
        ];
        let kept = filter_product_urls(urls, &re, &["-set-".to_string()]);
        assert_eq!(kept, vec!["https://www.sephora.com/product/protini-P427421"]);
    }
}
