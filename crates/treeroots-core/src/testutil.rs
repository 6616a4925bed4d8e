//! Scratch git work trees for unit tests.

use std::path::Path;
use std::process::Command;

/// Whether a usable `git` binary is on the PATH. Tests that need a work
/// tree return early without one.
pub(crate) fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .expect("spawn git");
    assert!(
        status.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&status.stderr)
    );
}

pub(crate) fn init_repo(root: &Path) {
    git(root, &["init", "-q"]);
}

pub(crate) fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, content).expect("write file");
}

pub(crate) fn remove_file(root: &Path, rel: &str) {
    std::fs::remove_file(root.join(rel)).expect("remove file");
}

/// Stage every file so `git ls-files` reports it as tracked.
pub(crate) fn track_all(root: &Path) {
    git(root, &["add", "-A"]);
}
