use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use crate::error::ScrapeError;
use crate::model::JobPost;

/// Every post ever persisted, in discovery order, with a link index for
/// O(1) dedup lookups.
#[derive(Debug, Default)]
pub struct Snapshot {
    records: Vec<JobPost>,
    links: HashSet<String>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    pub fn records(&self) -> &[JobPost] {
        &self.records
    }

    pub fn push(&mut self, post: JobPost) {
        self.links.insert(post.link.clone());
        self.records.push(post);
    }
}

impl FromIterator<JobPost> for Snapshot {
    fn from_iter<I: IntoIterator<Item = JobPost>>(iter: I) -> Self {
        let mut snap = Snapshot::default();
        for post in iter {
            snap.push(post);
        }
        snap
    }
}

/// Load the snapshot file. Absent or unparsable files yield an empty
/// snapshot; any other I/O failure is a hard store error.
pub fn load(path: &Path) -> Result<Snapshot, ScrapeError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Snapshot::default());
        }
        Err(e) => {
            return Err(ScrapeError::store(format!(
                "reading snapshot {}: {}",
                path.display(),
                e
            )));
        }
    };

    match serde_json::from_str::<Vec<JobPost>>(&raw) {
        Ok(records) => Ok(records.into_iter().collect()),
        Err(e) => {
            warn!("Snapshot {} is unparsable ({}), starting fresh", path.display(), e);
            Ok(Snapshot::default())
        }
    }
}

/// Rewrite the whole snapshot. Writes a sibling temp file and renames it
/// over the target, so a reader sees either the old content or the new,
/// never a truncated file.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), ScrapeError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let json = serde_json::to_vec_pretty(snapshot.records())?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Partition freshly extracted posts into unseen and already-known by exact
/// link equality, preserving candidate order. Pure; the snapshot is not
/// modified.
pub fn partition(candidates: Vec<JobPost>, known: &Snapshot) -> (Vec<JobPost>, Vec<JobPost>) {
    let mut fresh = Vec::new();
    let mut duplicates = Vec::new();
    // A page can render the same listing twice; count the second copy as a
    // duplicate even before it reaches the snapshot.
    let mut seen_this_batch: HashSet<String> = HashSet::new();

    for post in candidates {
        if known.contains(&post.link) || !seen_this_batch.insert(post.link.clone()) {
            duplicates.push(post);
        } else {
            fresh.push(post);
        }
    }
    (fresh, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(link: &str) -> JobPost {
        JobPost {
            title: format!("Job at {}", link),
            location: "Leeds".into(),
            salary: "Competitive".into(),
            recruiter: "Acme".into(),
            description: "desc".into(),
            link: link.into(),
            posted_date: "3 days ago".into(),
            search_term: "Tester".into(),
            first_seen: None,
        }
    }

    #[test]
    fn partition_splits_on_link() {
        let known: Snapshot = vec![post("https://x/1"), post("https://x/2")].into_iter().collect();
        let candidates = vec![post("https://x/2"), post("https://x/3")];
        let (fresh, dups) = partition(candidates, &known);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].link, "https://x/3");
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].link, "https://x/2");
    }

    #[test]
    fn partition_preserves_candidate_order() {
        let known = Snapshot::default();
        let candidates = vec![post("https://x/3"), post("https://x/1"), post("https://x/2")];
        let (fresh, dups) = partition(candidates, &known);
        let links: Vec<&str> = fresh.iter().map(|p| p.link.as_str()).collect();
        assert_eq!(links, ["https://x/3", "https://x/1", "https://x/2"]);
        assert!(dups.is_empty());
    }

    #[test]
    fn partition_is_case_sensitive() {
        let known: Snapshot = vec![post("https://x/Job")].into_iter().collect();
        let (fresh, dups) = partition(vec![post("https://x/job")], &known);
        assert_eq!(fresh.len(), 1);
        assert!(dups.is_empty());
    }

    #[test]
    fn partition_catches_repeats_within_one_batch() {
        let known = Snapshot::default();
        let (fresh, dups) = partition(vec![post("https://x/1"), post("https://x/1")], &known);
        assert_eq!(fresh.len(), 1);
        assert_eq!(dups.len(), 1);
    }

    #[test]
    fn second_run_classifies_everything_as_duplicate() {
        // Idempotence: an unchanged listing set adds nothing on re-run.
        let mut snap = Snapshot::default();
        let page = vec![post("https://x/1"), post("https://x/2"), post("https://x/3")];

        let (fresh, _) = partition(page.clone(), &snap);
        assert_eq!(fresh.len(), 3);
        for p in fresh {
            snap.push(p);
        }

        let (fresh, dups) = partition(page, &snap);
        assert!(fresh.is_empty());
        assert_eq!(dups.len(), 3);
        assert_eq!(snap.len(), 3);
    }

    #[test]
    fn load_absent_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snap = load(&dir.path().join("missing.json")).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(&path, "[{ truncated").unwrap();
        let snap = load(&path).unwrap();
        assert!(snap.is_empty());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");

        let snap: Snapshot = vec![post("https://x/1"), post("https://x/2")].into_iter().collect();
        save(&path, &snap).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains("https://x/1"));
        assert!(loaded.contains("https://x/2"));
        assert_eq!(loaded.records(), snap.records());
    }

    #[test]
    fn save_leaves_no_temp_file_and_replaces_whole_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");

        save(&path, &vec![post("https://x/old")].into_iter().collect()).unwrap();
        save(&path, &vec![post("https://x/new")].into_iter().collect()).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains("https://x/new"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/snap.json");
        save(&path, &Snapshot::default()).unwrap();
        assert!(path.exists());
    }
}
