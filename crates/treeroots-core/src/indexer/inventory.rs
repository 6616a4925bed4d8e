//! Tracked-file inventory and fingerprint diffing.
//!
//! The inventory is the set of files `git` tracks under the project root that
//! still exist in the work tree and carry a supported source extension. Each
//! is fingerprinted by the SHA-256 of its current bytes, so unstaged edits
//! are picked up as modifications.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::{TreeRootsError, TreeRootsResult};
use crate::models::Language;

const DEFAULT_SENSITIVE_EXCLUDE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*.p12",
    "*secret*",
    "*secrets*",
    "*credential*",
    "id_rsa",
    "id_dsa",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    /// Project-relative path to content fingerprint.
    pub files: BTreeMap<String, String>,
    /// Tracked files that could not be fingerprinted, with the reason.
    pub unreadable: BTreeMap<String, String>,
    /// Tracked files left out for language or exclude rules.
    pub skipped: usize,
}

/// Classification of every path against the stored fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub new: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
    pub deleted: Vec<String>,
}

impl ChangeSet {
    /// Paths that must be parsed and synced, in path order.
    pub fn changed(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.new.iter().chain(&self.modified).cloned().collect();
        paths.sort();
        paths
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn compute_content_hash(path: &Path) -> std::io::Result<String> {
    let data = std::fs::read(path)?;
    Ok(hash_bytes(&data))
}

fn build_excludes(root: &Path, config: &Config) -> TreeRootsResult<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    let sensitive: &[&str] = if config.exclude_sensitive {
        DEFAULT_SENSITIVE_EXCLUDE_PATTERNS
    } else {
        &[]
    };
    for pattern in sensitive
        .iter()
        .copied()
        .chain(config.exclude.iter().map(String::as_str))
    {
        builder
            .add_line(None, pattern)
            .map_err(|e| TreeRootsError::InvalidInput(format!("bad exclude glob {pattern}: {e}")))?;
    }
    builder
        .build()
        .map_err(|e| TreeRootsError::InvalidInput(format!("bad exclude globs: {e}")))
}

fn run_git(root: &Path, args: &[&str]) -> TreeRootsResult<std::process::Output> {
    Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .map_err(|e| TreeRootsError::Git(format!("failed to run git: {e}")))
}

/// List the tracked paths under `root`, relative to it.
pub fn tracked_paths(root: &Path) -> TreeRootsResult<Vec<String>> {
    if !root.is_dir() {
        return Err(TreeRootsError::NotARepository(root.to_path_buf()));
    }
    let probe = run_git(root, &["rev-parse", "--is-inside-work-tree"])?;
    if !probe.status.success() || String::from_utf8_lossy(&probe.stdout).trim() != "true" {
        return Err(TreeRootsError::NotARepository(root.to_path_buf()));
    }

    let listing = run_git(root, &["ls-files", "-z", "--cached"])?;
    if !listing.status.success() {
        return Err(TreeRootsError::Git(format!(
            "git ls-files failed: {}",
            String::from_utf8_lossy(&listing.stderr).trim()
        )));
    }
    let mut paths: Vec<String> = listing
        .stdout
        .split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .map(|entry| String::from_utf8_lossy(entry).replace('\\', "/"))
        .collect();
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Enumerate the fingerprinted source files of the project at `root`.
pub fn enumerate(root: &Path, config: &Config) -> TreeRootsResult<Inventory> {
    let paths = tracked_paths(root)?;
    let excludes = build_excludes(root, config)?;
    let mut inventory = Inventory::default();

    for rel in paths {
        if Language::from_path(&rel).is_none()
            || excludes
                .matched_path_or_any_parents(Path::new(&rel), false)
                .is_ignore()
        {
            inventory.skipped += 1;
            continue;
        }
        let absolute = root.join(&rel);
        let metadata = match std::fs::metadata(&absolute) {
            Ok(m) if m.is_file() => m,
            // Tracked but removed from the work tree: treated as absent.
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => {
                warn!(path = %rel, error = %e, "unreadable tracked file");
                inventory.unreadable.insert(rel, e.to_string());
                continue;
            }
        };
        if metadata.len() > config.max_file_bytes {
            let reason = format!(
                "file is {} bytes, above the {} byte limit",
                metadata.len(),
                config.max_file_bytes
            );
            warn!(path = %rel, "{reason}");
            inventory.unreadable.insert(rel, reason);
            continue;
        }
        match compute_content_hash(&absolute) {
            Ok(hash) => {
                inventory.files.insert(rel, hash);
            }
            Err(e) => {
                warn!(path = %rel, error = %e, "unreadable tracked file");
                inventory.unreadable.insert(rel, e.to_string());
            }
        }
    }

    debug!(
        files = inventory.files.len(),
        unreadable = inventory.unreadable.len(),
        skipped = inventory.skipped,
        "inventory enumerated"
    );
    Ok(inventory)
}

/// Compare the inventory against stored `{path: fingerprint}` pairs.
///
/// Unreadable paths are neither deleted nor changed: their stored state is
/// kept until they can be read again.
pub fn diff(inventory: &Inventory, stored: &BTreeMap<String, String>) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for (path, fingerprint) in &inventory.files {
        match stored.get(path) {
            None => changes.new.push(path.clone()),
            Some(previous) if previous != fingerprint => changes.modified.push(path.clone()),
            Some(_) => changes.unchanged.push(path.clone()),
        }
    }
    for path in stored.keys() {
        if !inventory.files.contains_key(path) && !inventory.unreadable.contains_key(path) {
            changes.deleted.push(path.clone());
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{git_available, init_repo, remove_file, track_all, write_file};

    fn inventory_of(pairs: &[(&str, &str)]) -> Inventory {
        Inventory {
            files: pairs
                .iter()
                .map(|(p, h)| (p.to_string(), h.to_string()))
                .collect(),
            ..Inventory::default()
        }
    }

    #[test]
    fn test_diff_classifies_every_path_once() {
        let inventory = inventory_of(&[("a.ts", "1"), ("b.ts", "2"), ("c.ts", "3")]);
        let stored: BTreeMap<String, String> = [("a.ts", "1"), ("b.ts", "old"), ("gone.ts", "9")]
            .iter()
            .map(|(p, h)| (p.to_string(), h.to_string()))
            .collect();
        let changes = diff(&inventory, &stored);
        assert_eq!(changes.unchanged, vec!["a.ts"]);
        assert_eq!(changes.modified, vec!["b.ts"]);
        assert_eq!(changes.new, vec!["c.ts"]);
        assert_eq!(changes.deleted, vec!["gone.ts"]);
        assert_eq!(changes.changed(), vec!["b.ts", "c.ts"]);
    }

    #[test]
    fn test_unreadable_files_are_not_deleted() {
        let mut inventory = inventory_of(&[]);
        inventory
            .unreadable
            .insert("locked.ts".to_string(), "permission denied".to_string());
        let stored: BTreeMap<String, String> =
            [("locked.ts".to_string(), "1".to_string())].into_iter().collect();
        let changes = diff(&inventory, &stored);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_content_hash_is_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(
            compute_content_hash(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_non_repository_is_rejected() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let err = enumerate(dir.path(), &Config::default()).unwrap_err();
        assert!(matches!(err, TreeRootsError::NotARepository(_)));

        let missing = dir.path().join("does-not-exist");
        let err = enumerate(&missing, &Config::default()).unwrap_err();
        assert!(matches!(err, TreeRootsError::NotARepository(_)));
    }

    #[test]
    fn test_enumerate_lists_tracked_sources_only() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        init_repo(root);
        write_file(root, "src/a.ts", "export function a() {}\n");
        write_file(root, "src/b.py", "def b():\n    pass\n");
        write_file(root, "README.md", "# readme\n");
        write_file(root, "config/secrets.ts", "export const k = 1;\n");
        write_file(root, "vendor/lib.js", "function v() {}\n");
        track_all(root);
        write_file(root, "untracked.ts", "export const u = 1;\n");

        let config = Config {
            exclude: vec!["vendor/".to_string()],
            ..Config::default()
        };
        let first = enumerate(root, &config).unwrap();
        let paths: Vec<&str> = first.files.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["src/a.ts", "src/b.py"]);
        assert_eq!(first.skipped, 3);

        let second = enumerate(root, &config).unwrap();
        assert_eq!(first, second);

        write_file(root, "src/a.ts", "export function a() { return 1; }\n");
        remove_file(root, "src/b.py");
        let third = enumerate(root, &config).unwrap();
        assert_ne!(third.files["src/a.ts"], first.files["src/a.ts"]);
        assert!(!third.files.contains_key("src/b.py"));
    }

    #[test]
    fn test_oversized_files_are_unreadable() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        init_repo(root);
        write_file(root, "big.ts", &"x".repeat(64));
        track_all(root);
        let config = Config {
            max_file_bytes: 16,
            ..Config::default()
        };
        let inventory = enumerate(root, &config).unwrap();
        assert!(inventory.files.is_empty());
        assert!(inventory.unreadable.contains_key("big.ts"));
    }
}
