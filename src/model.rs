use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One scraped job listing.
///
/// `link` is the identity key: two posts with equal links are the same
/// logical listing no matter how the site re-renders the other fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobPost {
    pub title: String,
    pub location: String,
    pub salary: String,
    pub recruiter: String,
    pub description: String,
    pub link: String,
    pub posted_date: String,
    /// Search term that first discovered this post.
    #[serde(default)]
    pub search_term: String,
    /// When this post first entered the snapshot. Older snapshot files
    /// predate the field, hence the default.
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
}
