use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::parser::locate::{LocateStrategy, Locator};
use crate::parser::normalize::{NormalizeStep, Normalizer};
use crate::parser::segment::{SegmentStrategy, Segmenter};
use crate::taxonomy::{CorrectionTable, TaxonomySource};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub selectors_version: String,
    pub db_path: PathBuf,
    pub concurrency: usize,
    pub sitemap: SitemapSettings,
    pub selectors: PageSelectors,
    pub locator: LocatorSettings,
    pub normalizer: NormalizerSettings,
    pub segmenter: SegmenterSettings,
    pub taxonomy: TaxonomySettings,
    pub inci: InciSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SitemapSettings {
    pub url: String,
    pub product_pattern: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// CSS selectors for the parts of a product page.
#[derive(Debug, Clone, Deserialize)]
pub struct PageSelectors {
    pub name: String,
    pub brand: String,
    pub price: String,
    /// Matches every content block (description, usage, ingredients).
    pub details: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocatorSettings {
    pub strategies: Vec<LocateStrategy>,
    pub position: usize,
    pub min_commas: usize,
    #[serde(default)]
    pub boilerplate: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerSettings {
    pub steps: Vec<NormalizeStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmenterSettings {
    pub strategies: Vec<SegmentStrategy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomySettings {
    pub sources: Vec<TaxonomySource>,
    #[serde(default)]
    pub corrections: CorrectionTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InciSettings {
    pub url: String,
    pub columns: [usize; 3],
    pub category_selector: String,
    pub category_window: (usize, usize),
}

impl Settings {
    /// Embedded defaults, then `comedo.toml` in the working directory, then
    /// `COMEDO__*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::with_name("comedo").required(false))
            .add_source(
                Environment::with_prefix("COMEDO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Embedded defaults overlaid with a TOML snippet.
    pub fn from_toml(overrides: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(overrides, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn locator(&self) -> Locator {
        Locator {
            chain: self.locator.strategies.clone(),
            position: self.locator.position,
            min_commas: self.locator.min_commas,
            boilerplate: self.locator.boilerplate.clone(),
        }
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.normalizer.steps.clone())
    }

    pub fn segmenter(&self) -> Segmenter {
        Segmenter::new(self.segmenter.strategies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::SourceKind;

    #[test]
    fn defaults_parse() {
        let s = Settings::from_toml("").unwrap();
        assert_eq!(s.locator.position, 3);
        assert_eq!(s.locator.min_commas, 10);
        assert_eq!(
            s.locator.strategies,
            vec![LocateStrategy::PositionalBlock, LocateStrategy::CommaDense]
        );
        assert_eq!(s.segmenter.strategies.len(), 3);
        assert_eq!(s.normalizer.steps, NormalizeStep::ALL.to_vec());
        assert_eq!(s.taxonomy.sources.len(), 2);
        assert_eq!(s.taxonomy.sources[0].kind, SourceKind::SeverityTable);
        assert_eq!(s.taxonomy.sources[0].window, Some((4, 132)));
        assert_eq!(s.taxonomy.sources[1].offset, 2);
        assert_eq!(s.taxonomy.corrections.positional.len(), 14);
        assert!(s.taxonomy.corrections.keyed.is_empty());
        assert_eq!(s.inci.columns, [0, 5, 7]);
    }

    #[test]
    fn overrides_replace_defaults() {
        let s = Settings::from_toml(
            r#"
            selectors_version = "test"
            [locator]
            strategies = ["comma_dense"]
            position = 2
            min_commas = 4
            "#,
        )
        .unwrap();
        assert_eq!(s.selectors_version, "test");
        let locator = s.locator();
        assert_eq!(locator.chain, vec![LocateStrategy::CommaDense]);
        assert_eq!(locator.min_commas, 4);
        // untouched keys keep their defaults
        assert!(!locator.boilerplate.is_empty());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = Settings::from_toml("[segmenter]\nstrategies = [\"guess\"]\n");
        assert!(err.is_err());
    }
}
