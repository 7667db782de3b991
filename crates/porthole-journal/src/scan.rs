use std::path::Path;

use crate::ingest::SyncJob;
use crate::layout;

/// One sync job per journal file already on disk, for the startup catch-up
/// pass. Whatever was appended while the server was down gets ingested before
/// the watcher takes over.
pub fn initial_jobs(root: &Path) -> Vec<SyncJob> {
    layout::discover(root)
        .into_iter()
        .map(|journal| SyncJob {
            project_id: journal.project_id,
            session_id: journal.session_id,
            path: journal.path,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_one_job_per_journal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("p1")).unwrap();
        std::fs::write(root.join("p1/s1.jsonl"), "{}\n").unwrap();
        std::fs::write(root.join("p1/s2.jsonl"), "{}\n").unwrap();

        let jobs = initial_jobs(root);
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.project_id == "p1"));
    }
}
