//! Import resolution from raw specifiers to project-relative file paths.
//!
//! Only relative specifiers are resolved. Bare specifiers (`react`,
//! `os.path`, `com.example.Foo`) name packages outside the project and are
//! left unresolved without error.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

/// Extensions tried after the exact path, in priority order.
pub const SOURCE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".py", ".java", ".go"];

/// Directory index file stems tried when the specifier names a directory.
const INDEX_STEMS: &[&str] = &["index"];

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

pub(crate) fn normalize_posix_path(path: &str) -> String {
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            _ => stack.push(part),
        }
    }
    stack.join("/")
}

fn candidates(base: &str) -> Vec<String> {
    let mut out = Vec::with_capacity(2 + SOURCE_EXTENSIONS.len() * (1 + INDEX_STEMS.len()));
    if !base.is_empty() {
        out.push(base.to_string());
        for ext in SOURCE_EXTENSIONS {
            out.push(format!("{base}{ext}"));
        }
    }
    let dir_prefix = if base.is_empty() {
        String::new()
    } else {
        format!("{base}/")
    };
    for stem in INDEX_STEMS {
        for ext in SOURCE_EXTENSIONS {
            out.push(format!("{dir_prefix}{stem}{ext}"));
        }
    }
    out.push(format!("{dir_prefix}__init__.py"));
    out
}

/// Resolve `specifier`, written in `importing_path`, to a known project file.
///
/// Returns `None` for bare package specifiers and for relative specifiers
/// that match no known file.
pub fn resolve(specifier: &str, importing_path: &str, known: &BTreeSet<String>) -> Option<String> {
    if !is_relative(specifier) {
        return None;
    }
    let importer_dir = Path::new(importing_path)
        .parent()
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_default();
    let base = normalize_posix_path(&format!("{importer_dir}/{specifier}"));

    if let Some(hit) = candidates(&base).into_iter().find(|c| known.contains(c)) {
        return Some(hit);
    }

    // A relative Go import names a package directory: take its first file.
    if importing_path.ends_with(".go") && !base.is_empty() {
        let prefix = format!("{base}/");
        let hit = known
            .range(prefix.clone()..)
            .take_while(|p| p.starts_with(&prefix))
            .find(|p| p.ends_with(".go") && !p[prefix.len()..].contains('/'))
            .cloned();
        if hit.is_some() {
            return hit;
        }
    }

    debug!(specifier, importing_path, "relative import did not resolve");
    None
}

/// Resolve every specifier of one file; the result is a sorted set with the
/// importing file itself excluded.
pub fn resolve_all(
    specifiers: &[String],
    importing_path: &str,
    known: &BTreeSet<String>,
) -> Vec<String> {
    let targets: BTreeSet<String> = specifiers
        .iter()
        .filter_map(|s| resolve(s, importing_path, known))
        .filter(|target| target != importing_path)
        .collect();
    targets.into_iter().collect()
}
