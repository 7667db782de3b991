use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Location of one journal file under the root:
/// `<root>/<project-id>/<session-id>.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRef {
    pub project_id: String,
    pub session_id: String,
    pub path: PathBuf,
}

/// Map a filesystem path back to its journal identity. Returns None for
/// anything that is not a `.jsonl` directly inside a project directory.
pub fn journal_ref(root: &Path, path: &Path) -> Option<JournalRef> {
    let relative = path.strip_prefix(root).ok()?;

    if path.extension().is_none_or(|e| e != "jsonl") {
        return None;
    }

    let mut components = relative.components();
    let project = components.next()?.as_os_str().to_str()?.to_string();
    let file = components.next()?.as_os_str().to_str()?;
    if components.next().is_some() {
        return None;
    }

    let session = Path::new(file).file_stem()?.to_str()?.to_string();
    if session.is_empty() || project.is_empty() {
        return None;
    }

    Some(JournalRef {
        project_id: project,
        session_id: session,
        path: path.to_path_buf(),
    })
}

pub fn journal_path(root: &Path, project_id: &str, session_id: &str) -> PathBuf {
    root.join(project_id).join(format!("{session_id}.jsonl"))
}

/// All journal files currently under the root.
pub fn discover(root: &Path) -> Vec<JournalRef> {
    let mut refs = Vec::new();

    for entry in WalkDir::new(root)
        .max_depth(2)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(journal) = journal_ref(root, path) {
            refs.push(journal);
        }
    }

    refs.sort_by(|a, b| a.path.cmp(&b.path));
    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_paths_to_journal_identity() {
        let root = Path::new("/data/journals");

        let journal = journal_ref(root, Path::new("/data/journals/proj-a/sess-1.jsonl")).unwrap();
        assert_eq!(journal.project_id, "proj-a");
        assert_eq!(journal.session_id, "sess-1");

        // Wrong extension, wrong depth, outside root.
        assert!(journal_ref(root, Path::new("/data/journals/proj-a/notes.txt")).is_none());
        assert!(journal_ref(root, Path::new("/data/journals/deep/nested/s.jsonl")).is_none());
        assert!(journal_ref(root, Path::new("/data/journals/s.jsonl")).is_none());
        assert!(journal_ref(root, Path::new("/elsewhere/proj/s.jsonl")).is_none());
    }

    #[test]
    fn path_construction_round_trips() {
        let root = Path::new("/data/journals");
        let path = journal_path(root, "proj-a", "sess-1");
        let journal = journal_ref(root, &path).unwrap();
        assert_eq!(journal.project_id, "proj-a");
        assert_eq!(journal.session_id, "sess-1");
    }

    #[test]
    fn discover_finds_only_journals() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("p1")).unwrap();
        std::fs::create_dir_all(root.join("p2")).unwrap();
        std::fs::write(root.join("p1/s1.jsonl"), "{}\n").unwrap();
        std::fs::write(root.join("p2/s2.jsonl"), "{}\n").unwrap();
        std::fs::write(root.join("p1/readme.md"), "x").unwrap();
        std::fs::write(root.join("stray.jsonl"), "{}\n").unwrap();

        let refs = discover(root);
        let ids: Vec<_> = refs.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }
}
