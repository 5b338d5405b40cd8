use std::time::Duration;

use thiserror::Error;

/// Errors raised while driving the browser or persisting records.
///
/// Navigation and element-wait failures are fatal to the session that hit
/// them; store errors are fatal only for the snapshot file (a half-persisted
/// page must abort its session), while relational per-row failures are
/// reported and skipped by the caller.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("element {selector:?} not found within {timeout:?}")]
    ElementNotFound { selector: String, timeout: Duration },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("store error: {0}")]
    Store(String),
}

impl ScrapeError {
    pub fn navigation(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn store(reason: impl ToString) -> Self {
        Self::Store(reason.to_string())
    }
}

impl From<rusqlite::Error> for ScrapeError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<std::io::Error> for ScrapeError {
    fn from(e: std::io::Error) -> Self {
        Self::Store(e.to_string())
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Store(e.to_string())
    }
}
