use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::error::ScrapeError;
use crate::model::JobPost;

pub fn connect(path: &Path) -> Result<Connection, ScrapeError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<(), ScrapeError> {
    // No unique constraint on the link: dedup is the advisory existence
    // check in insert(), matching the upstream table.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS job_posts (
            id            INTEGER PRIMARY KEY,
            website_id    INTEGER NOT NULL,
            title         TEXT NOT NULL,
            location      TEXT,
            salary        TEXT,
            recruiter     TEXT,
            description   TEXT,
            category      TEXT NOT NULL,
            original_link TEXT NOT NULL,
            posted        TEXT NOT NULL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_job_posts_link ON job_posts(original_link);
        CREATE INDEX IF NOT EXISTS idx_job_posts_category ON job_posts(category);
        ",
    )?;
    Ok(())
}

/// Whether any row already carries this link for this site.
pub fn exists(conn: &Connection, website_id: i64, link: &str) -> Result<bool, ScrapeError> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM job_posts WHERE website_id = ?1 AND original_link = ?2 LIMIT 1",
    )?;
    Ok(stmt.exists(rusqlite::params![website_id, link])?)
}

/// Insert one post unless its link is already present. Returns true when a
/// row was written, false when the existence check short-circuited.
/// Never updates an existing row.
pub fn insert(
    conn: &Connection,
    post: &JobPost,
    website_id: i64,
    category: &str,
    posted_flag: &str,
) -> Result<bool, ScrapeError> {
    if exists(conn, website_id, &post.link)? {
        debug!("Already in database, skipping: {}", post.title);
        return Ok(false);
    }

    let mut stmt = conn.prepare_cached(
        "INSERT INTO job_posts
         (website_id, title, location, salary, recruiter, description, category, original_link, posted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    stmt.execute(rusqlite::params![
        website_id,
        post.title,
        post.location,
        post.salary,
        post.recruiter,
        post.description,
        category,
        post.link,
        posted_flag,
    ])?;
    Ok(true)
}

pub struct DbStats {
    pub total: usize,
    pub distinct_links: usize,
    pub by_category: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<DbStats, ScrapeError> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM job_posts", [], |r| r.get(0))?;
    let distinct_links: usize = conn.query_row(
        "SELECT COUNT(DISTINCT original_link) FROM job_posts",
        [],
        |r| r.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) FROM job_posts GROUP BY category ORDER BY COUNT(*) DESC",
    )?;
    let by_category = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DbStats {
        total,
        distinct_links,
        by_category,
    })
}
