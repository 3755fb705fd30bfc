use comedo_scan::config::Settings;
use comedo_scan::model::{flatten_products, regroup_rows};
use comedo_scan::parser::page::CompiledSelectors;
use comedo_scan::parser::{process_page, Pipeline};
use comedo_scan::{match_ingredients, ExtractionStatus, IngredientToken, MatchResult, ReferenceTaxonomy};

fn tok(s: &str) -> IngredientToken {
    IngredientToken::new(s).unwrap()
}

fn product_fixture() -> comedo_scan::ProductRecord {
    let settings = Settings::from_toml("").unwrap();
    let pipeline = Pipeline::from_settings(&settings);
    let selectors = CompiledSelectors::compile(&settings.selectors).unwrap();
    let html = std::fs::read_to_string("tests/fixtures/product.html").unwrap();
    process_page(
        &pipeline,
        &selectors,
        "https://www.sephora.com/product/protini-polypeptide-cream-P427421",
        &html,
    )
    .unwrap()
}

#[test]
fn product_page_to_flagged_ingredients() {
    let record = product_fixture();
    assert_eq!(record.name, "Protini Polypeptide Cream");
    assert_eq!(
        record.status,
        ExtractionStatus::Extracted {
            locator: "positional_block",
            segmenter: "sentence_boundary",
        }
    );

    let raw = record.raw_ingredients.as_deref().unwrap();
    assert!(!raw.contains("Clean at Sephora"), "{}", raw);

    let tokens = record.ingredients.tokens();
    assert_eq!(tokens[0], tok("water"));
    assert_eq!(tokens[1], tok("dicaprylyl carbonate"));
    assert!(tokens.contains(&tok("ethylhexylglycerin")));
    assert!(!tokens.iter().any(|t| t.as_str().contains("vegetable")));

    let taxonomy = ReferenceTaxonomy::from_names(&["Isopropyl Myristate", "Coconut Oil"]);
    let result = match_ingredients(&record.ingredients, &taxonomy);
    let MatchResult::Violations(matches) = result else {
        panic!("expected a violation");
    };
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].ingredient, tok("isopropyl myristate"));
    assert_eq!(
        Some(matches[0].rank),
        record.ingredients.rank_of(&tok("isopropyl myristate"))
    );
}

#[test]
fn clean_product_has_no_violations() {
    let record = product_fixture();
    let taxonomy = ReferenceTaxonomy::from_names(&["Coconut Oil", "Laureth-4"]);
    assert!(match_ingredients(&record.ingredients, &taxonomy).is_clean());
}

#[test]
fn long_format_regroups_to_same_lists() {
    let record = product_fixture();
    let rows = flatten_products(std::slice::from_ref(&record));
    assert_eq!(rows.len(), record.ingredients.len());
    assert_eq!(rows[0].rank, 1);

    let regrouped = regroup_rows(rows);
    assert_eq!(regrouped.get(&record.name), Some(&record.ingredients));
}
