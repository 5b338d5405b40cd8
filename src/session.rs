use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::browser::PageDriver;
use crate::config::Config;
use crate::error::ScrapeError;
use crate::extract::{self, CONSENT_SELECTOR, LISTING_SELECTOR, SEARCH_INPUT_SELECTOR};
use crate::store::StoreHandle;

/// How a session ended. Failures are contained here; they never propagate
/// past the coordinator boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    Cancelled,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub term: String,
    pub pages: usize,
    pub found: usize,
    pub fresh: usize,
    pub inserted: usize,
    pub insert_failures: usize,
    pub outcome: Outcome,
}

impl SessionReport {
    fn new(term: String) -> Self {
        Self {
            term,
            pages: 0,
            found: 0,
            fresh: 0,
            inserted: 0,
            insert_failures: 0,
            outcome: Outcome::Done,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: String,
    pub navigation_timeout: Duration,
    pub consent_timeout: Duration,
    pub container_timeout: Duration,
    pub max_pages: usize,
}

impl SessionConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            navigation_timeout: Duration::from_secs(cfg.navigation_timeout_secs),
            consent_timeout: Duration::from_secs(cfg.consent_timeout_secs),
            container_timeout: Duration::from_secs(cfg.container_timeout_secs),
            max_pages: cfg.max_pages,
        }
    }
}

/// Drive one search term to completion: navigate to the site root, clear
/// the cookie dialog if one shows up, submit the term, then walk the result
/// pages extracting and persisting until the pager runs out. The page
/// context is released on every exit path.
pub async fn run<P: PageDriver>(
    term: String,
    mut page: P,
    store: StoreHandle,
    cfg: SessionConfig,
    cancel: CancellationToken,
) -> SessionReport {
    let mut report = SessionReport::new(term.clone());

    if let Err(e) = drive(&term, &mut page, &store, &cfg, &cancel, &mut report).await {
        error!("Session for {:?} failed: {}", term, e);
        report.outcome = Outcome::Failed(e.to_string());
    }

    page.close().await;
    report
}

async fn drive<P: PageDriver>(
    term: &str,
    page: &mut P,
    store: &StoreHandle,
    cfg: &SessionConfig,
    cancel: &CancellationToken,
    report: &mut SessionReport,
) -> Result<(), ScrapeError> {
    info!("Navigating to {} for {:?}", cfg.base_url, term);
    page.navigate(&cfg.base_url, cfg.navigation_timeout).await?;

    accept_consent(term, page, cfg).await;

    info!("Searching for {:?}", term);
    page.type_text(SEARCH_INPUT_SELECTOR, term).await?;
    page.press_key(SEARCH_INPUT_SELECTOR, "Enter").await?;
    page.wait_for_navigation(cfg.navigation_timeout).await?;

    let mut page_no = 1usize;
    loop {
        page.wait_for_selector(LISTING_SELECTOR, cfg.container_timeout)
            .await?;

        let records = extract::extract_page(page, term).await?;
        info!("Page {} for {:?}: {} listings", page_no, term, records.len());
        report.found += records.len();

        let receipt = store.persist(term, records).await?;
        report.fresh += receipt.fresh;
        report.inserted += receipt.inserted;
        report.insert_failures += receipt.insert_failures;
        report.pages = page_no;

        // The current page is fully persisted; stopping here leaves no
        // half-written state.
        if cancel.is_cancelled() {
            info!("Session for {:?} stopping after page {}", term, page_no);
            report.outcome = Outcome::Cancelled;
            return Ok(());
        }

        match extract::next_page_url(page, &cfg.base_url).await? {
            None => break,
            Some(next) => {
                if page_no >= cfg.max_pages {
                    warn!(
                        "Page cap ({}) reached for {:?}, stopping early",
                        cfg.max_pages, term
                    );
                    break;
                }
                info!("Going to next page for {:?}: {}", term, next);
                page.navigate(&next, cfg.navigation_timeout).await?;
                page_no += 1;
            }
        }
    }

    info!(
        "Finished {:?}: {} pages, {} found, {} new",
        term, report.pages, report.found, report.fresh
    );
    report.outcome = Outcome::Done;
    Ok(())
}

/// Best effort: click the cookie banner if it appears within its short
/// timeout, otherwise move on. Never fatal.
async fn accept_consent<P: PageDriver>(term: &str, page: &mut P, cfg: &SessionConfig) {
    match page
        .wait_for_selector(CONSENT_SELECTOR, cfg.consent_timeout)
        .await
    {
        Ok(()) => match page.click(CONSENT_SELECTOR).await {
            Ok(()) => info!("Accepted cookies for {:?}", term),
            Err(e) => warn!("Cookie click failed for {:?} ({}), proceeding", term, e),
        },
        Err(_) => info!("No cookie dialog for {:?}, proceeding", term),
    }
}
