use std::path::PathBuf;

use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::db;
use crate::error::ScrapeError;
use crate::model::JobPost;
use crate::snapshot::{self, partition, Snapshot};

/// What happened to one page batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct PersistReceipt {
    pub fresh: usize,
    pub duplicates: usize,
    pub inserted: usize,
    pub insert_failures: usize,
}

struct PersistRequest {
    term: String,
    records: Vec<JobPost>,
    reply: oneshot::Sender<Result<PersistReceipt, ScrapeError>>,
}

/// Handle sessions use to persist a page batch. Cloneable; all requests
/// funnel into the single writer task.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<PersistRequest>,
}

impl StoreHandle {
    /// Dedup `records` against the snapshot, append the unseen ones, rewrite
    /// the snapshot file, then insert them into the relational sink. Returns
    /// once the page batch is durably persisted; a snapshot write failure is
    /// the caller's error, per-row insert failures only count.
    pub async fn persist(
        &self,
        term: &str,
        records: Vec<JobPost>,
    ) -> Result<PersistReceipt, ScrapeError> {
        let (reply, rx) = oneshot::channel();
        let request = PersistRequest {
            term: term.to_string(),
            records,
            reply,
        };
        self.tx
            .send(request)
            .await
            .map_err(|_| ScrapeError::store("store task is gone"))?;
        rx.await
            .map_err(|_| ScrapeError::store("store task dropped the request"))?
    }
}

pub struct StoreConfig {
    pub snapshot_path: PathBuf,
    pub website_id: i64,
    pub posted_flag: String,
}

/// Spawn the single-writer store task. It alone owns the snapshot and the
/// database connection, so saves never race and page batches from different
/// sessions are applied one at a time. The task exits when every handle
/// has been dropped; join it to flush.
pub fn spawn(config: StoreConfig, conn: Connection) -> Result<(StoreHandle, JoinHandle<usize>), ScrapeError> {
    let mut snap = snapshot::load(&config.snapshot_path)?;
    info!("Loaded snapshot with {} known posts", snap.len());

    // Small buffer: senders block while a batch is being written, which is
    // the backpressure we want.
    let (tx, mut rx) = mpsc::channel::<PersistRequest>(8);

    let task = tokio::spawn(async move {
        while let Some(req) = rx.recv().await {
            let result = apply(&config, &conn, &mut snap, &req.term, req.records);
            let _ = req.reply.send(result);
        }
        snap.len()
    });

    Ok((StoreHandle { tx }, task))
}

fn apply(
    config: &StoreConfig,
    conn: &Connection,
    snap: &mut Snapshot,
    term: &str,
    records: Vec<JobPost>,
) -> Result<PersistReceipt, ScrapeError> {
    let (fresh, duplicates) = partition(records, snap);
    let mut receipt = PersistReceipt {
        fresh: fresh.len(),
        duplicates: duplicates.len(),
        ..Default::default()
    };

    if fresh.is_empty() {
        return Ok(receipt);
    }

    for post in &fresh {
        snap.push(post.clone());
    }
    // Full rewrite after every page; a crash mid-crawl keeps everything
    // committed so far.
    snapshot::save(&config.snapshot_path, snap)?;

    for post in &fresh {
        match db::insert(conn, post, config.website_id, term, &config.posted_flag) {
            Ok(true) => receipt.inserted += 1,
            Ok(false) => {}
            Err(e) => {
                // One bad row must not sink the crawl.
                warn!("Insert failed for {} ({}): {}", post.link, term, e);
                receipt.insert_failures += 1;
            }
        }
    }

    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(link: &str) -> JobPost {
        JobPost {
            title: "T".into(),
            location: "L".into(),
            salary: "S".into(),
            recruiter: "R".into(),
            description: "D".into(),
            link: link.into(),
            posted_date: "today".into(),
            search_term: "Tester".into(),
            first_seen: None,
        }
    }

    fn spawn_test_store(dir: &tempfile::TempDir) -> (StoreHandle, JoinHandle<usize>) {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let config = StoreConfig {
            snapshot_path: dir.path().join("snap.json"),
            website_id: 12,
            posted_flag: "Yes".into(),
        };
        spawn(config, conn).unwrap()
    }

    #[tokio::test]
    async fn first_page_is_all_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let (store, task) = spawn_test_store(&dir);

        let receipt = store
            .persist(
                "Tester",
                vec![post("https://x/1"), post("https://x/2"), post("https://x/3")],
            )
            .await
            .unwrap();
        assert_eq!(receipt.fresh, 3);
        assert_eq!(receipt.duplicates, 0);
        assert_eq!(receipt.inserted, 3);
        assert_eq!(receipt.insert_failures, 0);

        drop(store);
        assert_eq!(task.await.unwrap(), 3);

        let snap = snapshot::load(&dir.path().join("snap.json")).unwrap();
        assert_eq!(snap.len(), 3);
        assert!(snap.contains("https://x/2"));
    }

    #[tokio::test]
    async fn second_run_only_persists_the_new_link() {
        let dir = tempfile::tempdir().unwrap();
        let (store, task) = spawn_test_store(&dir);

        store
            .persist(
                "Tester",
                vec![post("https://x/1"), post("https://x/2"), post("https://x/3")],
            )
            .await
            .unwrap();

        let receipt = store
            .persist("Tester", vec![post("https://x/1"), post("https://x/4")])
            .await
            .unwrap();
        assert_eq!(receipt.fresh, 1);
        assert_eq!(receipt.duplicates, 1);
        assert_eq!(receipt.inserted, 1);

        drop(store);
        assert_eq!(task.await.unwrap(), 4);
    }

    #[tokio::test]
    async fn snapshot_survives_across_store_restarts() {
        let dir = tempfile::tempdir().unwrap();

        let (store, task) = spawn_test_store(&dir);
        store.persist("Tester", vec![post("https://x/1")]).await.unwrap();
        drop(store);
        task.await.unwrap();

        // Fresh actor, same snapshot file: the old link is a duplicate now.
        let (store, task) = spawn_test_store(&dir);
        let receipt = store
            .persist("Tester", vec![post("https://x/1")])
            .await
            .unwrap();
        assert_eq!(receipt.fresh, 0);
        assert_eq!(receipt.duplicates, 1);
        drop(store);
        assert_eq!(task.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_sessions_never_double_persist_a_link() {
        let dir = tempfile::tempdir().unwrap();
        let (store, task) = spawn_test_store(&dir);

        let a = store.clone();
        let b = store.clone();
        let (ra, rb) = tokio::join!(
            a.persist("Tester", vec![post("https://x/shared"), post("https://x/a")]),
            b.persist("Developer", vec![post("https://x/shared"), post("https://x/b")]),
        );
        let (ra, rb) = (ra.unwrap(), rb.unwrap());

        // Whichever batch lands second sees the shared link as a duplicate.
        assert_eq!(ra.fresh + rb.fresh, 3);
        assert_eq!(ra.duplicates + rb.duplicates, 1);

        drop(store);
        drop(a);
        drop(b);
        assert_eq!(task.await.unwrap(), 3);
    }
}
