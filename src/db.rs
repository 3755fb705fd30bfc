use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use itertools::Itertools;
use rusqlite::Connection;
use serde::Serialize;

use crate::inci::{InciCategory, InciFunctionRow};
use crate::matcher::{match_ingredients, RankedMatch};
use crate::model::{IngredientList, IngredientToken, ProductRecord};
use crate::taxonomy::{ReferenceTaxonomy, TaxonomyEntry};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);

        CREATE TABLE IF NOT EXISTS page_data (
            id           INTEGER PRIMARY KEY,
            page_id      INTEGER NOT NULL REFERENCES pages(id),
            url          TEXT NOT NULL,
            html         TEXT,
            status       INTEGER,
            error        TEXT,
            latency_ms   INTEGER,
            fetched_at   TEXT NOT NULL DEFAULT (datetime('now')),
            processed_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_url ON page_data(url);

        CREATE TABLE IF NOT EXISTS products (
            url               TEXT PRIMARY KEY,
            name              TEXT NOT NULL,
            brand             TEXT,
            price             TEXT,
            raw_ingredients   TEXT,
            ingredient_status TEXT NOT NULL
                CHECK(ingredient_status IN ('extracted','block_not_found','segmentation_miss')),
            locator           TEXT,
            segmenter         TEXT,
            ingredient_count  INTEGER NOT NULL DEFAULT 0,
            selectors_version TEXT NOT NULL,
            processed_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Long format: one row per (product, ingredient, rank)
        CREATE TABLE IF NOT EXISTS product_ingredients (
            product_url  TEXT NOT NULL REFERENCES products(url),
            product_name TEXT NOT NULL,
            ingredient   TEXT NOT NULL,
            rank         INTEGER NOT NULL,
            UNIQUE(product_url, rank)
        );
        CREATE INDEX IF NOT EXISTS idx_pi_ingredient ON product_ingredients(ingredient);

        CREATE TABLE IF NOT EXISTS taxonomy_builds (
            id                INTEGER PRIMARY KEY,
            built_at          TEXT NOT NULL,
            selectors_version TEXT NOT NULL,
            raw_entries       INTEGER NOT NULL,
            tokens            INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS taxonomy_entries (
            build_id  INTEGER NOT NULL REFERENCES taxonomy_builds(id),
            position  INTEGER NOT NULL,
            source    TEXT NOT NULL,
            raw_name  TEXT NOT NULL,
            token     TEXT,
            UNIQUE(build_id, position)
        );

        -- Matches are computed against the latest taxonomy on read.
        DROP TABLE IF EXISTS comedogenic_matches;

        CREATE TABLE IF NOT EXISTS inci_functions (
            name            TEXT NOT NULL,
            description     TEXT,
            function_number INTEGER NOT NULL,
            function        TEXT NOT NULL,
            UNIQUE(name, function_number)
        );

        CREATE TABLE IF NOT EXISTS inci_categories (
            category    TEXT PRIMARY KEY,
            description TEXT NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Fetching ──

pub fn insert_pages(conn: &Connection, urls: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO pages (url) VALUES (?1)")?;
        for url in urls {
            count += stmt.execute(rusqlite::params![url])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

pub fn fetch_unvisited(conn: &Connection, limit: Option<usize>) -> Result<Vec<(i64, String)>> {
    let sql = format!(
        "SELECT id, url FROM pages WHERE visited = 0 ORDER BY id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct FetchRow {
    pub page_id: i64,
    pub url: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub fn save_fetched(conn: &Connection, row: &FetchRow) -> Result<()> {
    conn.execute(
        "INSERT INTO page_data (page_id, url, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![row.page_id, row.url, row.html, row.status, row.error, row.latency_ms],
    )?;
    conn.execute(
        "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
        rusqlite::params![row.page_id],
    )?;
    Ok(())
}

// ── Processing ──

pub struct FetchedPage {
    pub page_data_id: i64,
    pub url: String,
    pub html: String,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<FetchedPage>> {
    let sql = format!(
        "SELECT id, url, html FROM page_data
         WHERE html IS NOT NULL AND processed_at IS NULL
         ORDER BY id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FetchedPage {
                page_data_id: row.get(0)?,
                url: row.get(1)?,
                html: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Save products with their ingredient rows, and mark every page in
/// `page_data_ids` processed (including skipped ones).
pub fn save_products(
    conn: &Connection,
    page_data_ids: &[i64],
    products: &[ProductRecord],
    selectors_version: &str,
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut p_stmt = tx.prepare(
            "INSERT OR REPLACE INTO products
             (url, name, brand, price, raw_ingredients, ingredient_status, locator, segmenter,
              ingredient_count, selectors_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        let mut clear_stmt = tx.prepare("DELETE FROM product_ingredients WHERE product_url = ?1")?;
        let mut i_stmt = tx.prepare(
            "INSERT INTO product_ingredients (product_url, product_name, ingredient, rank)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for p in products {
            let (locator, segmenter) = match &p.status {
                crate::model::ExtractionStatus::Extracted { locator, segmenter } => {
                    (Some(*locator), Some(*segmenter))
                }
                _ => (None, None),
            };
            p_stmt.execute(rusqlite::params![
                p.link,
                p.name,
                p.brand,
                p.price,
                p.raw_ingredients,
                p.status.label(),
                locator,
                segmenter,
                p.ingredients.len() as i64,
                selectors_version,
            ])?;
            clear_stmt.execute(rusqlite::params![p.link])?;
            for (rank, token) in p.ingredients.ranked() {
                i_stmt.execute(rusqlite::params![p.link, p.name, token.as_str(), rank as i64])?;
            }
        }

        let mut done_stmt =
            tx.prepare("UPDATE page_data SET processed_at = datetime('now') WHERE id = ?1")?;
        for id in page_data_ids {
            done_stmt.execute(rusqlite::params![id])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Taxonomy ──

pub fn save_taxonomy(
    conn: &Connection,
    taxonomy: &ReferenceTaxonomy,
    selectors_version: &str,
) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    let built_at = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO taxonomy_builds (built_at, selectors_version, raw_entries, tokens)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            built_at,
            selectors_version,
            taxonomy.entries().len() as i64,
            taxonomy.len() as i64,
        ],
    )?;
    let build_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO taxonomy_entries (build_id, position, source, raw_name, token)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for e in taxonomy.entries() {
            stmt.execute(rusqlite::params![
                build_id,
                e.position as i64,
                e.source,
                e.raw,
                e.token.as_ref().map(|t| t.as_str()),
            ])?;
        }
    }
    tx.commit()?;
    Ok(build_id)
}

/// Most recent taxonomy build, if any.
pub fn load_latest_taxonomy(conn: &Connection) -> Result<Option<(i64, ReferenceTaxonomy)>> {
    let build_id: Option<i64> =
        conn.query_row("SELECT MAX(id) FROM taxonomy_builds", [], |row| row.get(0))?;
    let Some(build_id) = build_id else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT position, source, raw_name FROM taxonomy_entries
         WHERE build_id = ?1 ORDER BY position",
    )?;
    let entries = stmt
        .query_map(rusqlite::params![build_id], |row| {
            let position: i64 = row.get(0)?;
            let raw: String = row.get(2)?;
            Ok(TaxonomyEntry {
                position: position as usize,
                source: row.get(1)?,
                token: IngredientToken::new(&raw),
                raw,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some((build_id, ReferenceTaxonomy::from_entries(entries))))
}

// ── INCI ──

pub fn save_inci(
    conn: &Connection,
    functions: &[InciFunctionRow],
    categories: &[InciCategory],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut f_stmt = tx.prepare(
            "INSERT OR REPLACE INTO inci_functions (name, description, function_number, function)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for f in functions {
            f_stmt.execute(rusqlite::params![
                f.name,
                f.description,
                f.function_number as i64,
                f.function,
            ])?;
        }
        let mut c_stmt = tx.prepare(
            "INSERT OR REPLACE INTO inci_categories (category, description) VALUES (?1, ?2)",
        )?;
        for c in categories {
            c_stmt.execute(rusqlite::params![c.category, c.description])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Reporting ──

struct StoredProduct {
    url: String,
    name: String,
    brand: Option<String>,
    status: String,
    ingredient_count: i64,
}

fn load_products(conn: &Connection) -> Result<Vec<StoredProduct>> {
    let mut stmt = conn.prepare(
        "SELECT url, name, brand, ingredient_status, ingredient_count
         FROM products ORDER BY name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredProduct {
                url: row.get(0)?,
                name: row.get(1)?,
                brand: row.get(2)?,
                status: row.get(3)?,
                ingredient_count: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Stored ingredient lists keyed by product URL, in rank order.
pub fn load_ingredient_lists(conn: &Connection) -> Result<HashMap<String, IngredientList>> {
    let mut stmt = conn.prepare(
        "SELECT product_url, ingredient FROM product_ingredients ORDER BY product_url, rank",
    )?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows
        .into_iter()
        .filter_map(|(url, raw)| Some((url, IngredientToken::new(&raw)?)))
        .into_group_map()
        .into_iter()
        .map(|(url, tokens)| (url, IngredientList::new(tokens)))
        .collect())
}

#[derive(Debug, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub brand: Option<String>,
    pub status: String,
    pub ingredient_count: i64,
    pub flagged: Vec<RankedMatch>,
}

/// Every stored product matched against `taxonomy`, flagged first, then by
/// name.
pub fn fetch_report(
    conn: &Connection,
    taxonomy: &ReferenceTaxonomy,
    flagged_only: bool,
    limit: usize,
) -> Result<Vec<ReportRow>> {
    let mut lists = load_ingredient_lists(conn)?;
    let mut rows: Vec<ReportRow> = load_products(conn)?
        .into_iter()
        .map(|p| {
            let list = lists.remove(&p.url).unwrap_or_default();
            ReportRow {
                flagged: match_ingredients(&list, taxonomy).matches().to_vec(),
                name: p.name,
                brand: p.brand,
                status: p.status,
                ingredient_count: p.ingredient_count,
            }
        })
        .filter(|r| !flagged_only || !r.flagged.is_empty())
        .collect();

    rows.sort_by(|a, b| {
        b.flagged
            .len()
            .cmp(&a.flagged.len())
            .then_with(|| a.name.cmp(&b.name))
    });
    rows.truncate(limit);
    Ok(rows)
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub pages: i64,
    pub visited: i64,
    pub fetch_errors: i64,
    pub products: i64,
    pub extracted: i64,
    pub block_not_found: i64,
    pub segmentation_miss: i64,
    pub taxonomy_tokens: i64,
    pub flagged_products: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };

    let (taxonomy_tokens, flagged_products) = match load_latest_taxonomy(conn)? {
        Some((_, taxonomy)) => {
            let flagged = load_ingredient_lists(conn)?
                .values()
                .filter(|list| !match_ingredients(list, &taxonomy).is_clean())
                .count();
            (taxonomy.len() as i64, flagged as i64)
        }
        None => (0, 0),
    };

    Ok(Stats {
        pages: count("SELECT COUNT(*) FROM pages")?,
        visited: count("SELECT COUNT(*) FROM pages WHERE visited = 1")?,
        fetch_errors: count("SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL")?,
        products: count("SELECT COUNT(*) FROM products")?,
        extracted: count("SELECT COUNT(*) FROM products WHERE ingredient_status = 'extracted'")?,
        block_not_found: count(
            "SELECT COUNT(*) FROM products WHERE ingredient_status = 'block_not_found'",
        )?,
        segmentation_miss: count(
            "SELECT COUNT(*) FROM products WHERE ingredient_status = 'segmentation_miss'",
        )?,
        taxonomy_tokens,
        flagged_products,
    })
}

fn limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExtractionStatus;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn product(name: &str, items: &[&str]) -> ProductRecord {
        ProductRecord {
            name: name.to_string(),
            brand: Some("Acme".to_string()),
            price: Some("$10.00".to_string()),
            link: format!("https://example.com/product/{}", name.replace(' ', "-")),
            raw_ingredients: Some(items.join(", ")),
            ingredients: IngredientList::from_raw(items),
            status: if items.is_empty() {
                ExtractionStatus::BlockNotFound
            } else {
                ExtractionStatus::Extracted {
                    locator: "positional_block",
                    segmenter: "comma_split",
                }
            },
        }
    }

    #[test]
    fn taxonomy_round_trips_through_db() {
        let conn = memory();
        assert!(load_latest_taxonomy(&conn).unwrap().is_none());

        let taxonomy = ReferenceTaxonomy::from_names(&["Mineral Oil", "isopropyl-myristate", "..."]);
        let id = save_taxonomy(&conn, &taxonomy, "test").unwrap();
        let (loaded_id, loaded) = load_latest_taxonomy(&conn).unwrap().unwrap();
        assert_eq!(loaded_id, id);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.entries().len(), 3);
        assert!(loaded.contains(&IngredientToken::new("isopropyl myristate").unwrap()));
    }

    fn flagged_names(row: &ReportRow) -> Vec<(&str, usize)> {
        row.flagged
            .iter()
            .map(|m| (m.ingredient.as_str(), m.rank))
            .collect()
    }

    #[test]
    fn products_and_report() {
        let conn = memory();
        insert_pages(&conn, &["https://example.com/product/a".to_string()]).unwrap();
        let (page_id, url) = fetch_unvisited(&conn, None).unwrap().remove(0);
        save_fetched(
            &conn,
            &FetchRow {
                page_id,
                url,
                html: Some("<html></html>".to_string()),
                status: Some(200),
                error: None,
                latency_ms: Some(12),
            },
        )
        .unwrap();
        let pending = fetch_unprocessed(&conn, None).unwrap();
        assert_eq!(pending.len(), 1);

        let taxonomy = ReferenceTaxonomy::from_names(&["mineral oil"]);
        save_taxonomy(&conn, &taxonomy, "test").unwrap();
        let products = vec![
            product("Rich Cream", &["Water", "Mineral Oil"]),
            product("Mystery Balm", &[]),
        ];
        save_products(&conn, &[pending[0].page_data_id], &products, "test").unwrap();

        assert!(fetch_unprocessed(&conn, None).unwrap().is_empty());

        let report = fetch_report(&conn, &taxonomy, false, 10).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].name, "Rich Cream");
        assert_eq!(flagged_names(&report[0]), vec![("mineral oil", 2)]);
        assert_eq!(report[1].status, "block_not_found");

        let flagged = fetch_report(&conn, &taxonomy, true, 10).unwrap();
        assert_eq!(flagged.len(), 1);

        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.products, 2);
        assert_eq!(stats.block_not_found, 1);
        assert_eq!(stats.flagged_products, 1);
        assert_eq!(stats.taxonomy_tokens, 1);
    }

    #[test]
    fn flags_survive_taxonomy_rebuild() {
        let conn = memory();
        let first = ReferenceTaxonomy::from_names(&["mineral oil"]);
        save_taxonomy(&conn, &first, "test").unwrap();
        save_products(&conn, &[], &[product("Rich Cream", &["Water", "Mineral Oil"])], "test")
            .unwrap();

        // Rebuild with the same list, then with a wider one.
        save_taxonomy(&conn, &first, "test").unwrap();
        let (_, latest) = load_latest_taxonomy(&conn).unwrap().unwrap();
        let report = fetch_report(&conn, &latest, true, 10).unwrap();
        assert_eq!(flagged_names(&report[0]), vec![("mineral oil", 2)]);
        assert_eq!(get_stats(&conn).unwrap().flagged_products, 1);

        let wider = ReferenceTaxonomy::from_names(&["water", "mineral oil"]);
        save_taxonomy(&conn, &wider, "test").unwrap();
        let (_, latest) = load_latest_taxonomy(&conn).unwrap().unwrap();
        let report = fetch_report(&conn, &latest, true, 10).unwrap();
        assert_eq!(flagged_names(&report[0]), vec![("water", 1), ("mineral oil", 2)]);
    }

    #[test]
    fn stored_lists_keep_rank_order() {
        let conn = memory();
        let record = product("Serum", &["Water", "Squalane", "Glycerin", "Squalane"]);
        save_products(&conn, &[], std::slice::from_ref(&record), "test").unwrap();
        let lists = load_ingredient_lists(&conn).unwrap();
        assert_eq!(lists.get(&record.link), Some(&record.ingredients));
    }
}
