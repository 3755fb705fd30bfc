use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::db::{self, FetchRow};

const USER_AGENT: &str = concat!("comedo_scan/", env!("CARGO_PKG_VERSION"));
const TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

pub fn client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

/// Fetch pages concurrently, saving each result to DB as it arrives.
///
/// Failed fetches are stored with their error and still mark the page
/// visited; there is no retry.
pub async fn fetch_pages_streaming(
    conn: &Connection,
    pages: Vec<(i64, String)>,
    concurrency: usize,
) -> Result<FetchStats> {
    let client = client()?;
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchRow>(concurrency * 2);

    for (page_id, url) in pages {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            // Closed semaphore means we are shutting down.
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = fetch_one(&client, page_id, url).await;
            let _ = tx.send(row).await;
        });
    }

    // rx closes once every task has dropped its sender
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    while let Some(row) = rx.recv().await {
        if let Some(e) = &row.error {
            warn!("Fetch failed for {}: {}", row.url, e);
            errors += 1;
        } else {
            ok += 1;
        }
        db::save_fetched(conn, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}

async fn fetch_one(client: &reqwest::Client, page_id: i64, url: String) -> FetchRow {
    let start = Instant::now();
    let response = client.get(&url).send().await;

    let (html, status, error) = match response {
        Ok(resp) => {
            let status = resp.status();
            if status.is_success() {
                match resp.text().await {
                    Ok(body) => (Some(body), Some(status.as_u16() as i32), None),
                    Err(e) => (None, Some(status.as_u16() as i32), Some(e.to_string())),
                }
            } else {
                (None, Some(status.as_u16() as i32), Some(format!("HTTP {}", status)))
            }
        }
        Err(e) => (None, None, Some(e.to_string())),
    };

    FetchRow {
        page_id,
        url,
        html,
        status,
        error,
        latency_ms: Some(start.elapsed().as_millis() as i64),
    }
}

/// Fetch one document as text, failing on non-2xx.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {}", url))?
        .error_for_status()?;
    Ok(resp.text().await?)
}
