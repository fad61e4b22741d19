use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::debug;

/// Transcript file extension.
pub const TRANSCRIPT_EXT: &str = "jsonl";

/// Prefix of agent sidechain transcripts.
pub const SIDECHAIN_PREFIX: &str = "agent-";

/// Whether `path` names a transcript file.
pub fn is_transcript(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(TRANSCRIPT_EXT)
}

/// Whether `path` names an agent sidechain transcript.
pub fn is_sidechain(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(SIDECHAIN_PREFIX))
}

/// List every `.jsonl` file one level below `projects_dir` that was modified
/// within `max_age`, newest first.
///
/// Claude Code keeps one subdirectory per project under
/// `~/.claude/projects/`. Unreadable directories and files are skipped.
pub fn find_recent_sessions(projects_dir: &Path, max_age: Duration) -> Vec<PathBuf> {
    let now = SystemTime::now();
    let mut found: Vec<(SystemTime, PathBuf)> = Vec::new();

    let Ok(entries) = std::fs::read_dir(projects_dir) else {
        debug!("cannot read projects directory {}", projects_dir.display());
        return Vec::new();
    };

    for entry in entries.flatten() {
        let project_path = entry.path();
        if !project_path.is_dir() {
            continue;
        }

        let Ok(files) = std::fs::read_dir(&project_path) else {
            debug!("skipping unreadable project {}", project_path.display());
            continue;
        };

        for file in files.flatten() {
            let path = file.path();
            if !is_transcript(&path) {
                continue;
            }
            let Ok(meta) = file.metadata() else {
                continue;
            };
            let Ok(modified) = meta.modified() else {
                continue;
            };
            // Future mtimes count as age zero.
            let age = now.duration_since(modified).unwrap_or_default();
            if age < max_age {
                found.push((modified, path));
            }
        }
    }

    found.sort_by(|a, b| b.0.cmp(&a.0));
    found.into_iter().map(|(_, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(path: &Path, age: Duration) {
        let file = File::create(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn recent_sessions_sorted_newest_first() {
        let root = tempfile::tempdir().unwrap();
        let a = root.path().join("-home-a");
        let b = root.path().join("-home-b");
        std::fs::create_dir(&a).unwrap();
        std::fs::create_dir(&b).unwrap();

        touch(&a.join("old.jsonl"), Duration::from_secs(3 * 3600));
        touch(&b.join("new.jsonl"), Duration::from_secs(60));
        touch(&a.join("mid.jsonl"), Duration::from_secs(3600));
        touch(&a.join("notes.txt"), Duration::from_secs(10));
        touch(&b.join("stale.jsonl"), Duration::from_secs(10 * 24 * 3600));
        // Files directly under the root are not project sessions.
        touch(&root.path().join("loose.jsonl"), Duration::from_secs(10));

        let found = find_recent_sessions(root.path(), Duration::from_secs(24 * 3600));
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["new.jsonl", "mid.jsonl", "old.jsonl"]);
    }

    #[test]
    fn missing_root_yields_empty() {
        let root = tempfile::tempdir().unwrap();
        assert!(find_recent_sessions(&root.path().join("nope"), Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn sidechain_and_extension_checks() {
        assert!(is_transcript(Path::new("/p/x.jsonl")));
        assert!(!is_transcript(Path::new("/p/x.json")));
        assert!(is_sidechain(Path::new("/p/agent-1234.jsonl")));
        assert!(!is_sidechain(Path::new("/p/1234-agent.jsonl")));
    }
}
