use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use comedo_scan::config::Settings;
use comedo_scan::error::TaxonomyError;
use comedo_scan::matcher::{match_ingredients, match_rows};
use comedo_scan::parser::page::CompiledSelectors;
use comedo_scan::parser::{process_page, Pipeline};
use comedo_scan::taxonomy::{build_taxonomy, concatenate_sources, SourceRows, TaxonomySource};
use comedo_scan::{db, fetch, inci, sitemap};

#[derive(Parser)]
#[command(name = "comedo_scan", about = "Flag comedogenic ingredients in cosmetic product pages")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch sitemap and populate URL queue
    Init,
    /// Fetch unvisited product pages
    Fetch {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract ingredients from fetched pages and match them
    Process {
        /// Max pages to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch + process in one pipeline
    Run {
        /// Max pages to fetch+process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Comedogenic reference taxonomy
    Taxonomy {
        #[command(subcommand)]
        action: TaxonomyAction,
    },
    /// Fetch the INCI function glossary
    Inci,
    /// Products with their flagged ingredients
    Report {
        /// Only products with at least one flagged ingredient
        #[arg(short, long)]
        flagged: bool,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show pipeline statistics
    Stats,
}

#[derive(Subcommand)]
enum TaxonomyAction {
    /// Fetch every source and store a new build
    Build,
    /// Print the latest build
    Show,
    /// Print keyed corrections equivalent to the positional ones
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load configuration")?;

    let conn = db::connect(&settings.db_path)?;
    db::init_schema(&conn)?;

    let result = match cli.command {
        Commands::Init => {
            let client = fetch::client()?;
            let pages = sitemap::fetch_product_urls(&client, &settings.sitemap).await?;
            let inserted = db::insert_pages(&conn, &pages)?;
            println!("Inserted {} new product URLs ({} total found)", inserted, pages.len());
            Ok(())
        }
        Commands::Fetch { limit } => {
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'init' first or all pages are fetched.");
                return Ok(());
            }
            println!("Fetching {} pages (streaming to DB)...", pages.len());
            let stats = fetch::fetch_pages_streaming(&conn, pages, settings.concurrency).await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed pages. Run 'fetch' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let counts = process_pages(&conn, &settings, &pages)?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit } => {
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'init' first.");
                return Ok(());
            }

            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} pages (streaming to DB)...", pages.len());
            let stats = fetch::fetch_pages_streaming(&conn, pages, settings.concurrency).await?;
            println!(
                "Fetched {} pages ({} ok, {} errors) in {:.1}s",
                stats.total,
                stats.ok,
                stats.errors,
                t_fetch.elapsed().as_secs_f64()
            );

            let t_process = Instant::now();
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process (all fetched pages had errors).");
                return Ok(());
            }
            println!("Processing {} pages...", unprocessed.len());
            let counts = process_pages(&conn, &settings, &unprocessed)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Taxonomy { action } => match action {
            TaxonomyAction::Build => {
                let inputs = fetch_sources(&settings.taxonomy.sources).await?;
                let (taxonomy, report) =
                    build_taxonomy(&inputs, &settings.taxonomy.corrections)?;
                let build_id = db::save_taxonomy(&conn, &taxonomy, &settings.selectors_version)?;
                println!(
                    "Taxonomy build {}: {} entries, {} distinct tokens \
                     ({} keyed, {} positional corrections applied).",
                    build_id,
                    taxonomy.entries().len(),
                    taxonomy.len(),
                    report.keyed_applied,
                    report.positional_applied,
                );
                for key in &report.unused_keys {
                    println!("  unused keyed correction: {:?}", key);
                }
                Ok(())
            }
            TaxonomyAction::Show => {
                let Some((build_id, taxonomy)) = db::load_latest_taxonomy(&conn)? else {
                    println!("No taxonomy built yet. Run 'taxonomy build' first.");
                    return Ok(());
                };
                println!("{:>4} | {:<14} | {:<36} | {}", "#", "Source", "Raw", "Token");
                println!("{}", "-".repeat(90));
                for e in taxonomy.entries() {
                    let token = e.token.as_ref().map(|t| t.as_str()).unwrap_or("-");
                    println!(
                        "{:>4} | {:<14} | {:<36} | {}",
                        e.position,
                        ellipsize(&e.source, 14),
                        ellipsize(&e.raw, 36),
                        token
                    );
                }
                println!("\nBuild {}: {} distinct tokens", build_id, taxonomy.len());
                Ok(())
            }
            TaxonomyAction::Migrate => {
                let inputs = fetch_sources(&settings.taxonomy.sources).await?;
                let list = concatenate_sources(&inputs)?;
                let keyed = settings.taxonomy.corrections.migrate_positional(&list)?;
                println!("[taxonomy.corrections]");
                println!("positional = []");
                println!("keyed = [");
                for k in &keyed {
                    println!("  {{ raw = {:?}, name = {:?} }},", k.raw, k.name);
                }
                println!("]");
                Ok(())
            }
        },
        Commands::Inci => {
            let client = fetch::client()?;
            let html = fetch::fetch_text(&client, &settings.inci.url).await?;
            let rows = inci::table_rows_from_html(&html);
            let functions = inci::parse_function_rows(&rows, settings.inci.columns);
            let paragraphs = inci::paragraphs_from_html(&html, &settings.inci.category_selector)?;
            let categories = inci::parse_categories(&paragraphs, settings.inci.category_window);
            db::save_inci(&conn, &functions, &categories)?;
            println!(
                "Saved {} ingredient functions, {} categories.",
                functions.len(),
                categories.len()
            );
            Ok(())
        }
        Commands::Report { flagged, json, limit } => {
            let Some((build_id, taxonomy)) = db::load_latest_taxonomy(&conn)? else {
                bail!("No taxonomy built yet. Run 'taxonomy build' first.");
            };
            let rows = db::fetch_report(&conn, &taxonomy, flagged, limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            if rows.is_empty() {
                println!("No products found.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<32} | {:<18} | {:<17} | {:>5} | {}",
                "#", "Product", "Brand", "Status", "Ingr", "Flagged (rank)"
            );
            println!("{}", "-".repeat(110));
            for (i, r) in rows.iter().enumerate() {
                let flagged = r
                    .flagged
                    .iter()
                    .map(|m| format!("{} ({})", m.ingredient, m.rank))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "{:>3} | {:<32} | {:<18} | {:<17} | {:>5} | {}",
                    i + 1,
                    ellipsize(&r.name, 32),
                    ellipsize(r.brand.as_deref().unwrap_or("-"), 18),
                    r.status,
                    r.ingredient_count,
                    if flagged.is_empty() { "-".to_string() } else { flagged },
                );
            }
            println!("\n{} products | taxonomy build {}", rows.len(), build_id);
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Pages:             {}", s.pages);
            println!("Visited:           {}", s.visited);
            println!("Fetch errors:      {}", s.fetch_errors);
            println!("Products:          {}", s.products);
            println!("  extracted:       {}", s.extracted);
            println!("  block not found: {}", s.block_not_found);
            println!("  segment miss:    {}", s.segmentation_miss);
            println!("Taxonomy tokens:   {}", s.taxonomy_tokens);
            println!("Flagged products:  {}", s.flagged_products);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }

    result
}

/// Fetch every taxonomy source. Any failure aborts the whole build.
async fn fetch_sources(
    sources: &[TaxonomySource],
) -> anyhow::Result<Vec<(TaxonomySource, SourceRows)>> {
    let client = fetch::client()?;
    let mut inputs = Vec::with_capacity(sources.len());
    for source in sources {
        info!(source = %source.name, url = %source.url, "fetching taxonomy source");
        let html = fetch::fetch_text(&client, &source.url).await.map_err(|e| {
            TaxonomyError::SourceUnavailable {
                source_name: source.name.clone(),
                reason: e.to_string(),
            }
        })?;
        let rows = source.rows_from_html(&html)?;
        inputs.push((source.clone(), rows));
    }
    Ok(inputs)
}

#[derive(Default)]
struct ProcessCounts {
    products: usize,
    skipped: usize,
    extracted: usize,
    ingredients: usize,
    flagged_products: usize,
    matches: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} products ({} with ingredients, {} rows), skipped {} pages. \
             {} products flagged ({} matches).",
            self.products,
            self.extracted,
            self.ingredients,
            self.skipped,
            self.flagged_products,
            self.matches,
        );
    }
}

fn process_pages(
    conn: &rusqlite::Connection,
    settings: &Settings,
    pages: &[db::FetchedPage],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let Some((build_id, taxonomy)) = db::load_latest_taxonomy(conn)? else {
        bail!("No taxonomy built yet. Run 'taxonomy build' first.");
    };
    if taxonomy.is_empty() {
        warn!("Taxonomy build {} has no tokens; nothing will be flagged", build_id);
    }
    info!(build_id, tokens = taxonomy.len(), "matching against latest taxonomy");

    let pipeline = Pipeline::from_settings(settings);
    let selectors = CompiledSelectors::compile(&settings.selectors)?;

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts::default();

    for chunk in pages.chunks(500) {
        let results: Vec<_> = chunk
            .par_iter()
            .map(|page| process_page(&pipeline, &selectors, &page.url, &page.html))
            .collect();

        let ids: Vec<i64> = chunk.iter().map(|p| p.page_data_id).collect();
        let mut products = Vec::new();

        for record in results {
            let Some(record) = record else {
                counts.skipped += 1;
                continue;
            };
            let found = match_rows(&record, &match_ingredients(&record.ingredients, &taxonomy));
            if record.status.is_extracted() {
                counts.extracted += 1;
            }
            if !found.is_empty() {
                counts.flagged_products += 1;
            }
            counts.ingredients += record.ingredients.len();
            counts.matches += found.len();
            products.push(record);
        }

        counts.products += products.len();
        db::save_products(conn, &ids, &products, &settings.selectors_version)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

/// Cut to `max` characters, marking the cut with "...".
fn ellipsize(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

fn elapsed_label(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{}m {:02}s", m, s),
        _ => format!("{}h {:02}m {:02}s", h, m, s),
    }
}
