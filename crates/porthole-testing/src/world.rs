use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

/// An isolated journal root for integration tests: a temp directory with the
/// `<root>/<project-id>/<session-id>.jsonl` layout the service watches.
pub struct JournalWorld {
    _temp_dir: TempDir,
    root: PathBuf,
}

impl JournalWorld {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context("create temp journal root")?;
        let root = temp_dir.path().join("journals");
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            _temp_dir: temp_dir,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn journal_path(&self, project_id: &str, session_id: &str) -> PathBuf {
        self.root.join(project_id).join(format!("{session_id}.jsonl"))
    }

    /// Append lines to a session journal, creating it on first use.
    pub fn append(&self, project_id: &str, session_id: &str, lines: &[String]) -> Result<PathBuf> {
        let path = self.journal_path(project_id, session_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open journal {}", path.display()))?;
        for line in lines {
            writeln!(file, "{line}")?;
        }

        Ok(path)
    }

    /// Backdate the journal's mtime so a follow-up append registers as a
    /// fresh modification even on coarse-grained filesystems.
    pub fn backdate(&self, project_id: &str, session_id: &str, seconds: u64) -> Result<()> {
        let path = self.journal_path(project_id, session_id);
        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(seconds);
        let file = std::fs::OpenOptions::new().append(true).open(&path)?;
        file.set_modified(past)?;
        Ok(())
    }
}
