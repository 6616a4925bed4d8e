//! Name-based call resolution.
//!
//! Call sites carry only the callee's name text. A call resolves to a
//! definition when exactly one candidate wins under this policy:
//!
//! 1. a single definition with that name in the caller's own file;
//! 2. otherwise, a single definition with that name anywhere in the project.
//!
//! Several same-file matches, or several project-wide matches with none in
//! the caller's file, are ambiguous and produce no edge.

use std::collections::{BTreeMap, HashSet};

use crate::models::StoredCallSite;

/// A definition that shares the callee's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameMatch {
    pub id: String,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallResolution<'m> {
    SameFile(&'m str),
    ProjectUnique(&'m str),
    Ambiguous(usize),
    Unresolved,
}

impl<'m> CallResolution<'m> {
    pub fn target(&self) -> Option<&'m str> {
        match self {
            CallResolution::SameFile(id) | CallResolution::ProjectUnique(id) => Some(id),
            CallResolution::Ambiguous(_) | CallResolution::Unresolved => None,
        }
    }
}

pub fn resolve_callee<'m>(caller_file: &str, matches: &'m [NameMatch]) -> CallResolution<'m> {
    let mut same_file = matches.iter().filter(|m| m.file_path == caller_file);
    match (same_file.next(), same_file.next()) {
        (Some(only), None) => return CallResolution::SameFile(&only.id),
        (Some(_), Some(_)) => {
            let count = matches.iter().filter(|m| m.file_path == caller_file).count();
            return CallResolution::Ambiguous(count);
        }
        _ => {}
    }
    match matches {
        [] => CallResolution::Unresolved,
        [only] => CallResolution::ProjectUnique(&only.id),
        many => CallResolution::Ambiguous(many.len()),
    }
}

/// A resolved `caller -> callee` edge with the line of its first call site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResolvedCall {
    pub caller_id: String,
    pub callee_id: String,
    pub line: usize,
    pub arg_count: usize,
}

/// Resolve every call site of one file. `candidates` maps callee names to
/// the definitions carrying that name. Edges are deduplicated per
/// `(caller, callee)` and returned sorted.
pub fn build_call_edges(
    caller_file: &str,
    call_sites: &[StoredCallSite],
    candidates: &BTreeMap<String, Vec<NameMatch>>,
) -> Vec<ResolvedCall> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut edges = Vec::new();

    for site in call_sites {
        let Some(matches) = candidates.get(&site.callee) else {
            continue;
        };
        let Some(target) = resolve_callee(caller_file, matches).target() else {
            continue;
        };
        if !seen.insert((site.caller_id.as_str(), target)) {
            continue;
        }
        edges.push(ResolvedCall {
            caller_id: site.caller_id.clone(),
            callee_id: target.to_string(),
            line: site.line,
            arg_count: site.arg_count,
        });
    }

    edges.sort();
    edges
}
