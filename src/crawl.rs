use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::browser::Chromium;
use crate::config::Config;
use crate::db;
use crate::session::{self, Outcome, SessionConfig, SessionReport};
use crate::store::{self, StoreConfig};

pub struct CrawlSummary {
    pub reports: Vec<SessionReport>,
    /// Snapshot size after the run.
    pub snapshot_total: usize,
}

/// Fan one crawl session per search term out over a single shared browser.
/// Sessions run concurrently (capped), each owning its page context; any
/// subset of them may fail without taking down the rest. Only a browser
/// launch failure aborts the whole run.
pub async fn run(cfg: &Config) -> Result<CrawlSummary> {
    let conn = db::connect(&cfg.db_path)?;
    db::init_schema(&conn)?;

    let (store, store_task) = store::spawn(
        StoreConfig {
            snapshot_path: cfg.snapshot_path.clone(),
            website_id: cfg.website_id,
            posted_flag: cfg.posted_flag.clone(),
        },
        conn,
    )?;

    let chromium = Arc::new(
        Chromium::launch(cfg.headless)
            .await
            .context("failed to launch browser")?,
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, letting sessions finish their current page");
                cancel.cancel();
            }
        });
    }

    let semaphore = Arc::new(Semaphore::new(cfg.max_concurrent_sessions.max(1)));
    let session_cfg = SessionConfig::from_config(cfg);

    let pb = ProgressBar::new(cfg.search_terms.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} sessions")?
            .progress_chars("=> "),
    );

    let mut handles = Vec::with_capacity(cfg.search_terms.len());
    for term in cfg.search_terms.clone() {
        let chromium = Arc::clone(&chromium);
        let semaphore = Arc::clone(&semaphore);
        let store = store.clone();
        let session_cfg = session_cfg.clone();
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            let Ok(_permit) = semaphore.acquire().await else {
                return unstarted(term, Outcome::Failed("session semaphore closed".into()));
            };
            if cancel.is_cancelled() {
                return unstarted(term, Outcome::Cancelled);
            }
            let page = match chromium.new_page().await {
                Ok(page) => page,
                Err(e) => {
                    return unstarted(term, Outcome::Failed(format!("could not open page: {e}")))
                }
            };
            session::run(term, page, store, session_cfg, cancel).await
        }));
    }

    // Our handle must go away for the store task to drain and exit.
    drop(store);

    let mut reports = Vec::with_capacity(handles.len());
    for handle in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(e) => warn!("Session task panicked: {}", e),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let snapshot_total = store_task
        .await
        .context("store task failed before flushing")?;

    if let Ok(chromium) = Arc::try_unwrap(chromium) {
        chromium.close().await;
    }

    Ok(CrawlSummary {
        reports,
        snapshot_total,
    })
}

fn unstarted(term: String, outcome: Outcome) -> SessionReport {
    SessionReport {
        term,
        pages: 0,
        found: 0,
        fresh: 0,
        inserted: 0,
        insert_failures: 0,
        outcome,
    }
}
