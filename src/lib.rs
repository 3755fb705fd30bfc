//! Locate, clean and segment INCI ingredient lists scraped from cosmetic
//! product pages, and flag the ones that appear in a comedogenic reference
//! taxonomy.
//!
//! The core (`parser`, `taxonomy`, `matcher`, `model`) does no I/O. `fetch`,
//! `sitemap` and `db` are the collaborators the CLI wires around it.

pub mod config;
pub mod db;
pub mod error;
pub mod fetch;
pub mod inci;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod sitemap;
pub mod taxonomy;

pub use matcher::{match_ingredients, MatchResult, RankedMatch};
pub use model::{ExtractionStatus, IngredientList, IngredientRow, IngredientToken, ProductRecord};
pub use parser::Pipeline;
pub use taxonomy::{build_taxonomy, ReferenceTaxonomy};
