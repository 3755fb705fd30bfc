pub mod locate;
pub mod normalize;
pub mod page;
pub mod segment;

use tracing::debug;

use crate::config::Settings;
use crate::model::{ExtractionStatus, IngredientList, ProductRecord};
use locate::{ContentBlock, Locator};
use normalize::Normalizer;
use page::{parse_product_page, CompiledSelectors};
use segment::{Segmentation, Segmenter};

/// Ingredient data pulled out of one page's content blocks.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub raw_ingredients: Option<String>,
    pub ingredients: IngredientList,
    pub status: ExtractionStatus,
}

/// Three-stage pipeline: content blocks → ingredient blob → clean text → tokens.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub locator: Locator,
    pub normalizer: Normalizer,
    pub segmenter: Segmenter,
}

impl Pipeline {
    pub fn from_settings(settings: &Settings) -> Self {
        Pipeline {
            locator: settings.locator(),
            normalizer: settings.normalizer(),
            segmenter: settings.segmenter(),
        }
    }

    pub fn extract(&self, blocks: &[ContentBlock]) -> Extraction {
        let Some(located) = self.locator.locate(blocks) else {
            return Extraction {
                raw_ingredients: None,
                ingredients: IngredientList::default(),
                status: ExtractionStatus::BlockNotFound,
            };
        };

        let cleaned = self
            .normalizer
            .normalize(Some(&located.text))
            .unwrap_or_default();

        match self.segmenter.segment(&cleaned) {
            Segmentation::Found { strategy, tokens } => Extraction {
                raw_ingredients: Some(located.text),
                ingredients: IngredientList::new(tokens),
                status: ExtractionStatus::Extracted {
                    locator: located.strategy,
                    segmenter: strategy.name(),
                },
            },
            Segmentation::NoneFound => Extraction {
                raw_ingredients: Some(located.text),
                ingredients: IngredientList::default(),
                status: ExtractionStatus::SegmentationMiss,
            },
        }
    }
}

/// Full product page → record. `None` for pages that are not a single
/// product (no name, kits, sets).
pub fn process_page(
    pipeline: &Pipeline,
    selectors: &CompiledSelectors,
    url: &str,
    html: &str,
) -> Option<ProductRecord> {
    let page = parse_product_page(html, selectors)?;
    let extraction = pipeline.extract(&page.blocks);
    debug!(url, status = extraction.status.label(), tokens = extraction.ingredients.len(), "processed page");

    Some(ProductRecord {
        name: page.name,
        brand: page.brand,
        price: page.price,
        link: url.to_string(),
        raw_ingredients: extraction.raw_ingredients,
        ingredients: extraction.ingredients,
        status: extraction.status,
    })
}
