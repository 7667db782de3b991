use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::classify::ToolUseBlock;

/// A resolved repository root and its checked-out branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    pub directory: PathBuf,
    pub branch: Option<String>,
}

/// Directory -> resolution result, shared across one compute run so sibling
/// paths don't re-walk the same ancestors.
pub type GitCache = HashMap<PathBuf, Option<GitInfo>>;

/// Absolute filesystem paths referenced by the tool_use blocks of one line.
pub fn extract_tool_paths(tool_uses: &[ToolUseBlock]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for block in tool_uses {
        let key = match block.name.as_str() {
            "Read" | "Edit" | "Write" => "file_path",
            "Grep" | "Glob" => "path",
            _ => continue,
        };
        if let Some(Value::String(raw)) = block.input.get(key) {
            let path = PathBuf::from(raw);
            if path.is_absolute() {
                paths.push(path);
            }
        }
    }
    paths
}

/// Resolve the git root for a set of paths: each path walks up to its root;
/// the most common root wins, ties going to the first encountered.
pub fn resolve_for_paths(paths: &[PathBuf], cache: &mut GitCache) -> Option<GitInfo> {
    let mut counts: Vec<(GitInfo, usize)> = Vec::new();

    for path in paths {
        let Some(info) = resolve_one(path, cache) else {
            continue;
        };
        match counts.iter_mut().find(|(known, _)| known.directory == info.directory) {
            Some((_, n)) => *n += 1,
            None => counts.push((info, 1)),
        }
    }

    // Ties go to the first root encountered, so only a strictly greater
    // count displaces the current best.
    let mut best: Option<(GitInfo, usize)> = None;
    for (info, n) in counts {
        if best.as_ref().is_none_or(|(_, best_n)| n > *best_n) {
            best = Some((info, n));
        }
    }
    best.map(|(info, _)| info)
}

fn resolve_one(path: &Path, cache: &mut GitCache) -> Option<GitInfo> {
    // The path may name a file that no longer exists; ancestors() still gives
    // the candidate directories to probe.
    let mut visited = Vec::new();
    let mut found = None;

    for dir in path.ancestors() {
        if let Some(cached) = cache.get(dir) {
            found = cached.clone();
            break;
        }
        visited.push(dir.to_path_buf());

        if let Some(info) = probe_git_dir(dir) {
            found = Some(info);
            break;
        }
    }

    for dir in visited {
        cache.insert(dir, found.clone());
    }
    found
}

fn probe_git_dir(dir: &Path) -> Option<GitInfo> {
    let dot_git = dir.join(".git");
    let meta = std::fs::symlink_metadata(&dot_git).ok()?;

    if meta.is_dir() {
        return Some(GitInfo {
            directory: dir.to_path_buf(),
            branch: branch_from_head(&dot_git.join("HEAD")),
        });
    }

    // Worktree: .git is a file containing "gitdir: <actual-git-dir>".
    let contents = std::fs::read_to_string(&dot_git).ok()?;
    let gitdir_raw = contents.strip_prefix("gitdir:")?.trim();
    let gitdir = if Path::new(gitdir_raw).is_absolute() {
        PathBuf::from(gitdir_raw)
    } else {
        dir.join(gitdir_raw)
    };

    Some(GitInfo {
        directory: dir.to_path_buf(),
        branch: branch_from_head(&gitdir.join("HEAD")),
    })
}

fn branch_from_head(head_path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(head_path).ok()?;
    let trimmed = contents.trim();

    match trimmed.strip_prefix("ref: refs/heads/") {
        Some(branch) => Some(branch.to_string()),
        // Detached HEAD: the file holds a raw commit hash.
        None => Some(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_repo(root: &Path, branch: &str) {
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(
            root.join(".git/HEAD"),
            format!("ref: refs/heads/{branch}\n"),
        )
        .unwrap();
    }

    fn fake_worktree(worktree: &Path, gitdir: &Path, branch: &str) {
        std::fs::create_dir_all(worktree).unwrap();
        std::fs::create_dir_all(gitdir).unwrap();
        std::fs::write(gitdir.join("HEAD"), format!("ref: refs/heads/{branch}\n")).unwrap();
        std::fs::write(
            worktree.join(".git"),
            format!("gitdir: {}\n", gitdir.display()),
        )
        .unwrap();
    }

    #[test]
    fn resolves_plain_repository_and_branch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        fake_repo(&repo, "main");
        std::fs::create_dir_all(repo.join("src")).unwrap();

        let mut cache = GitCache::new();
        let info = resolve_for_paths(&[repo.join("src/lib.rs")], &mut cache).unwrap();
        assert_eq!(info.directory, repo);
        assert_eq!(info.branch.as_deref(), Some("main"));
    }

    #[test]
    fn resolves_worktree_through_gitdir_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let worktree = tmp.path().join("repo-wt");
        let gitdir = tmp.path().join("repo/.git/worktrees/wt");
        fake_worktree(&worktree, &gitdir, "feature/x");

        let mut cache = GitCache::new();
        let info = resolve_for_paths(&[worktree.join("x.py")], &mut cache).unwrap();
        assert_eq!(info.directory, worktree);
        assert_eq!(info.branch.as_deref(), Some("feature/x"));
    }

    #[test]
    fn detached_head_reports_raw_hash() {
        let tmp = tempfile::TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).unwrap();
        std::fs::write(repo.join(".git/HEAD"), "abc123def456\n").unwrap();

        let mut cache = GitCache::new();
        let info = resolve_for_paths(&[repo.join("file.rs")], &mut cache).unwrap();
        assert_eq!(info.branch.as_deref(), Some("abc123def456"));
    }

    #[test]
    fn most_common_root_wins_with_first_encounter_tiebreak() {
        let tmp = tempfile::TempDir::new().unwrap();
        let a = tmp.path().join("a");
        let b = tmp.path().join("b");
        fake_repo(&a, "main");
        fake_repo(&b, "dev");

        let mut cache = GitCache::new();

        // Two paths in b, one in a: b wins.
        let info = resolve_for_paths(
            &[a.join("x.rs"), b.join("y.rs"), b.join("z.rs")],
            &mut cache,
        )
        .unwrap();
        assert_eq!(info.directory, b);

        // Tie: first encountered wins.
        let info = resolve_for_paths(&[a.join("x.rs"), b.join("y.rs")], &mut cache).unwrap();
        assert_eq!(info.directory, a);
    }

    #[test]
    fn extract_paths_only_from_path_carrying_tools() {
        let blocks = vec![
            ToolUseBlock {
                id: "1".into(),
                name: "Read".into(),
                input: serde_json::json!({"file_path": "/repo/a.rs"}),
            },
            ToolUseBlock {
                id: "2".into(),
                name: "Grep".into(),
                input: serde_json::json!({"pattern": "x", "path": "/repo/src"}),
            },
            ToolUseBlock {
                id: "3".into(),
                name: "Bash".into(),
                input: serde_json::json!({"command": "ls /repo"}),
            },
            ToolUseBlock {
                id: "4".into(),
                name: "Read".into(),
                input: serde_json::json!({"file_path": "relative/p.rs"}),
            },
        ];

        let paths = extract_tool_paths(&blocks);
        assert_eq!(
            paths,
            vec![PathBuf::from("/repo/a.rs"), PathBuf::from("/repo/src")]
        );
    }

    #[test]
    fn cache_prevents_rewalk_and_is_seeded_for_intermediates() {
        let tmp = tempfile::TempDir::new().unwrap();
        let repo = tmp.path().join("repo");
        fake_repo(&repo, "main");
        std::fs::create_dir_all(repo.join("deep/nested")).unwrap();

        let mut cache = GitCache::new();
        resolve_for_paths(&[repo.join("deep/nested/f.rs")], &mut cache);

        assert!(cache.contains_key(&repo.join("deep/nested")));
        assert!(cache.contains_key(&repo.join("deep")));
        assert_eq!(
            cache.get(repo.as_path()).and_then(|i| i.clone()).map(|i| i.directory),
            Some(repo.clone())
        );
    }
}
