use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::browser::PageDriver;
use crate::error::ScrapeError;
use crate::model::JobPost;

// Site selectors, from the target's listing markup.
pub const CONSENT_SELECTOR: &str =
    "#CybotCookiebotDialogBodyLevelButtonLevelOptinAllowAll";
pub const SEARCH_INPUT_SELECTOR: &str = "#keywords";
pub const LISTING_SELECTOR: &str = ".lister__item";

/// Pulls every listing card on the current page, in document order.
const CARDS_JS: &str = r#"
Array.from(document.querySelectorAll('.lister__item')).map((card) => ({
    title: card.querySelector('.lister__header a span')?.innerText ?? null,
    location: card.querySelector('.lister__meta-item--location')?.innerText ?? null,
    salary: card.querySelector('.lister__meta-item--salary')?.innerText ?? null,
    recruiter: card.querySelector('.lister__meta-item--recruiter')?.innerText ?? null,
    description: card.querySelector('.lister__description')?.innerText ?? null,
    link: card.querySelector('.lister__header a')?.href ?? null,
    posted: card.querySelector('.job-actions__action')?.innerText ?? null,
}))
"#;

/// Reads the single next-page affordance; null when on the last page.
const NEXT_PAGE_JS: &str =
    r#"document.querySelector('.paginator__item a[rel="next"]')?.href ?? null"#;

#[derive(Debug, Deserialize)]
struct RawCard {
    title: Option<String>,
    location: Option<String>,
    salary: Option<String>,
    recruiter: Option<String>,
    description: Option<String>,
    link: Option<String>,
    posted: Option<String>,
}

/// Extract all listing cards from the loaded page. Pure read; assumes the
/// caller already waited for the listing container.
pub async fn extract_page<P: PageDriver>(
    page: &mut P,
    search_term: &str,
) -> Result<Vec<JobPost>, ScrapeError> {
    let value = page.evaluate_json(CARDS_JS).await?;
    parse_cards(value, search_term)
}

/// Map raw cards to posts, substituting the sentinel strings for missing
/// fields. Cards without a link are dropped: a sentinel link would make
/// every link-less card the same logical record.
fn parse_cards(value: serde_json::Value, search_term: &str) -> Result<Vec<JobPost>, ScrapeError> {
    let raw: Vec<RawCard> = serde_json::from_value(value)?;
    let mut posts = Vec::with_capacity(raw.len());

    for card in raw {
        let Some(link) = card.link.filter(|l| !l.trim().is_empty()) else {
            warn!("Dropping listing card with no link (term {:?})", search_term);
            continue;
        };
        posts.push(JobPost {
            title: field(card.title, "No Title"),
            location: field(card.location, "No Location"),
            salary: field(card.salary, "No Salary"),
            recruiter: field(card.recruiter, "No Recruiter"),
            description: field(card.description, "No Description"),
            link: link.trim().to_string(),
            posted_date: field(card.posted, "No Date Posted"),
            search_term: search_term.to_string(),
            first_seen: Some(Utc::now()),
        });
    }
    Ok(posts)
}

/// Absolute URL of the next results page, or None on the last page. None is
/// the pagination terminator.
pub async fn next_page_url<P: PageDriver>(
    page: &mut P,
    base_url: &str,
) -> Result<Option<String>, ScrapeError> {
    let value = page.evaluate_json(NEXT_PAGE_JS).await?;
    let Some(href) = value.as_str().filter(|h| !h.is_empty()) else {
        return Ok(None);
    };
    Ok(Some(absolutize(href, base_url)))
}

fn absolutize(href: &str, base_url: &str) -> String {
    if Url::parse(href).is_ok() {
        return href.to_string();
    }
    match Url::parse(base_url).and_then(|base| base.join(href)) {
        Ok(url) => url.to_string(),
        Err(_) => href.to_string(),
    }
}

fn field(value: Option<String>, sentinel: &str) -> String {
    match value.map(|v| clean(&v)).filter(|v| !v.is_empty()) {
        Some(v) => v,
        None => sentinel.to_string(),
    }
}

/// Collapse runs of whitespace; the site pads innerText with newlines.
fn clean(s: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let ws = WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    ws.replace_all(s.trim(), " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_card_maps_all_fields() {
        let value = json!([{
            "title": "  QA \n Engineer ",
            "location": "Leeds",
            "salary": "£45k",
            "recruiter": "Acme",
            "description": "Own the test suite",
            "link": "https://jobs.example/1234",
            "posted": "2 days ago",
        }]);
        let posts = parse_cards(value, "Tester").unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "QA Engineer");
        assert_eq!(posts[0].link, "https://jobs.example/1234");
        assert_eq!(posts[0].posted_date, "2 days ago");
        assert_eq!(posts[0].search_term, "Tester");
        assert!(posts[0].first_seen.is_some());
    }

    #[test]
    fn missing_fields_get_sentinels() {
        let value = json!([{
            "title": null,
            "location": null,
            "salary": "",
            "recruiter": null,
            "description": null,
            "link": "https://jobs.example/1",
            "posted": null,
        }]);
        let posts = parse_cards(value, "Tester").unwrap();
        assert_eq!(posts[0].title, "No Title");
        assert_eq!(posts[0].location, "No Location");
        assert_eq!(posts[0].salary, "No Salary");
        assert_eq!(posts[0].recruiter, "No Recruiter");
        assert_eq!(posts[0].description, "No Description");
        assert_eq!(posts[0].posted_date, "No Date Posted");
    }

    #[test]
    fn card_without_link_is_dropped() {
        let value = json!([
            { "title": "A", "link": null },
            { "title": "B", "link": "https://jobs.example/2" },
        ]);
        let posts = parse_cards(value, "Tester").unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].link, "https://jobs.example/2");
    }

    #[test]
    fn document_order_is_preserved() {
        let value = json!([
            { "link": "https://jobs.example/3" },
            { "link": "https://jobs.example/1" },
            { "link": "https://jobs.example/2" },
        ]);
        let posts = parse_cards(value, "Tester").unwrap();
        let links: Vec<&str> = posts.iter().map(|p| p.link.as_str()).collect();
        assert_eq!(
            links,
            [
                "https://jobs.example/3",
                "https://jobs.example/1",
                "https://jobs.example/2"
            ]
        );
    }

    #[test]
    fn relative_pager_href_is_absolutized() {
        assert_eq!(
            absolutize("/jobs?page=2", "https://www.fish4.co.uk/"),
            "https://www.fish4.co.uk/jobs?page=2"
        );
        assert_eq!(
            absolutize("https://other.example/p2", "https://www.fish4.co.uk/"),
            "https://other.example/p2"
        );
    }
}
