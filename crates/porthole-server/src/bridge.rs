use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use porthole_journal::{append_custom_title, journal_path};
use porthole_types::ProcessState;
use tracing::info;

#[derive(Debug, Clone)]
struct StagedTitle {
    project_id: String,
    title: String,
}

/// Routes rename requests into the journal file without ever writing while
/// the subprocess might be appending to it.
///
/// Unsafe states stage the title instead; every transition into `user_turn`
/// or `dead` flushes whatever is staged. Staged titles are lost on restart,
/// which is fine: the store row already carries the new title.
pub struct TitleBridge {
    journal_root: PathBuf,
    pending: Mutex<HashMap<String, StagedTitle>>,
}

impl TitleBridge {
    pub fn new(journal_root: PathBuf) -> Self {
        Self {
            journal_root,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Write the custom-title line now if the process state allows it, or
    /// stage it for the next safe transition. Returns whether it was written.
    pub fn write_or_stage(
        &self,
        process_state: Option<ProcessState>,
        project_id: &str,
        session_id: &str,
        title: &str,
    ) -> Result<bool> {
        let unsafe_now = process_state.is_some_and(|state| state.journal_write_unsafe());

        if unsafe_now {
            self.pending.lock().unwrap().insert(
                session_id.to_string(),
                StagedTitle {
                    project_id: project_id.to_string(),
                    title: title.to_string(),
                },
            );
            info!(session_id, "custom title staged until the agent yields");
            return Ok(false);
        }

        let path = journal_path(&self.journal_root, project_id, session_id);
        append_custom_title(&path, title)?;
        Ok(true)
    }

    /// Flush a staged title for a session that just became safe to write.
    /// Returns the path written, if anything was staged.
    pub fn flush_for_session(&self, session_id: &str) -> Result<Option<PathBuf>> {
        let staged = self.pending.lock().unwrap().remove(session_id);

        let Some(staged) = staged else {
            return Ok(None);
        };

        let path = journal_path(&self.journal_root, &staged.project_id, session_id);
        append_custom_title(&path, &staged.title)?;
        info!(session_id, "staged custom title flushed");
        Ok(Some(path))
    }

    pub fn has_staged(&self, session_id: &str) -> bool {
        self.pending.lock().unwrap().contains_key(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_lines(path: &std::path::Path) -> usize {
        match std::fs::read_to_string(path) {
            Ok(contents) => contents
                .lines()
                .filter(|l| l.contains("custom-title"))
                .count(),
            Err(_) => 0,
        }
    }

    #[test]
    fn safe_states_write_immediately() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bridge = TitleBridge::new(tmp.path().to_path_buf());
        std::fs::create_dir_all(tmp.path().join("p1")).unwrap();
        let journal = tmp.path().join("p1/s1.jsonl");

        // No process at all.
        assert!(bridge.write_or_stage(None, "p1", "s1", "first").unwrap());
        // User turn and dead are both safe.
        assert!(bridge
            .write_or_stage(Some(ProcessState::UserTurn), "p1", "s1", "second")
            .unwrap());
        assert!(bridge
            .write_or_stage(Some(ProcessState::Dead), "p1", "s1", "third")
            .unwrap());

        assert_eq!(title_lines(&journal), 3);
        assert!(!bridge.has_staged("s1"));
    }

    #[test]
    fn unsafe_states_stage_and_flush_on_transition() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bridge = TitleBridge::new(tmp.path().to_path_buf());
        std::fs::create_dir_all(tmp.path().join("p1")).unwrap();
        let journal = tmp.path().join("p1/s1.jsonl");

        for state in [ProcessState::Starting, ProcessState::AssistantTurn] {
            assert!(!bridge
                .write_or_stage(Some(state), "p1", "s1", "renamed")
                .unwrap());
        }
        assert_eq!(title_lines(&journal), 0);
        assert!(bridge.has_staged("s1"));

        let flushed = bridge.flush_for_session("s1").unwrap();
        assert_eq!(flushed.as_deref(), Some(journal.as_path()));
        assert_eq!(title_lines(&journal), 1);

        // Flushing again is a no-op.
        assert!(bridge.flush_for_session("s1").unwrap().is_none());
        assert_eq!(title_lines(&journal), 1);
    }

    #[test]
    fn later_rename_replaces_earlier_staged_title() {
        let tmp = tempfile::TempDir::new().unwrap();
        let bridge = TitleBridge::new(tmp.path().to_path_buf());
        std::fs::create_dir_all(tmp.path().join("p1")).unwrap();
        let journal = tmp.path().join("p1/s1.jsonl");

        bridge
            .write_or_stage(Some(ProcessState::AssistantTurn), "p1", "s1", "draft one")
            .unwrap();
        bridge
            .write_or_stage(Some(ProcessState::AssistantTurn), "p1", "s1", "draft two")
            .unwrap();

        bridge.flush_for_session("s1").unwrap();
        let contents = std::fs::read_to_string(&journal).unwrap();
        assert!(contents.contains("draft two"));
        assert!(!contents.contains("draft one"));
    }
}
