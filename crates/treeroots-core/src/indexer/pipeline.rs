//! Incremental scan orchestration with Rayon-based parallel parsing.
//!
//! A scan diffs the tracked files against stored fingerprints, parses only
//! what changed, syncs the graph in two phases (files first, then calls),
//! and finally reconciles the embedding index with the graph.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embedding::Embedder;
use crate::errors::{TreeRootsError, TreeRootsResult};
use crate::indexer::imports::resolve_all;
use crate::indexer::inventory::{diff, enumerate, hash_bytes, Inventory};
use crate::indexer::parser::{parse_file, ParsedFile};
use crate::models::{
    definition_key, DefinitionRecord, EmbeddingPayload, EmbeddingRecord, FileSync, Language,
    StoredCallSite,
};
use crate::store::{EmbeddingIndex, GraphStore};

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Checked between per-file units; once set the scan winds down and
    /// reports `cancelled`.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ScanOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Read,
    Parse,
    Sync,
    Link,
    Embed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub path: String,
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub files_seen: usize,
    pub new: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Files synced into the graph, including ones that failed to parse.
    pub indexed: usize,
    pub definitions: usize,
    pub import_edges: usize,
    /// Unchanged importers whose IMPORTS edges moved because files appeared
    /// or disappeared.
    pub imports_relinked: usize,
    pub call_edges: usize,
    pub embedded: usize,
    pub index_recreated: bool,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub failures: Vec<FileFailure>,
}

impl ScanReport {
    pub fn summary(&self) -> String {
        format!(
            "{} files scanned, {} failed",
            self.files_seen,
            self.failures.len()
        )
    }

    fn fail(&mut self, path: &str, stage: FailureStage, message: impl Into<String>) {
        self.failures.push(FileFailure {
            path: path.to_string(),
            stage,
            message: message.into(),
        });
    }
}

// ---------------------------------------------------------------------------
// Parse phase
// ---------------------------------------------------------------------------

enum ParseOutcome {
    Parsed {
        fingerprint: String,
        parsed: ParsedFile,
    },
    Broken {
        fingerprint: String,
        message: String,
    },
    Unreadable(String),
}

struct ParseJob {
    path: String,
    outcome: ParseOutcome,
}

fn parse_worker(root: &Path, path: &str) -> ParseJob {
    let outcome = match std::fs::read(root.join(path)) {
        Err(e) => ParseOutcome::Unreadable(e.to_string()),
        Ok(bytes) => {
            // Fingerprint what was parsed, not what the inventory hashed.
            let fingerprint = hash_bytes(&bytes);
            let source = String::from_utf8_lossy(&bytes);
            match parse_file(path, &source) {
                Ok(parsed) => ParseOutcome::Parsed {
                    fingerprint,
                    parsed,
                },
                Err(e) => ParseOutcome::Broken {
                    fingerprint,
                    message: e.to_string(),
                },
            }
        }
    };
    ParseJob {
        path: path.to_string(),
        outcome,
    }
}

fn parallel_parse(root: &Path, paths: &[String], workers: usize) -> Vec<ParseJob> {
    if paths.is_empty() {
        return vec![];
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();
    match pool {
        Ok(pool) => pool.install(|| {
            paths
                .par_iter()
                .map(|path| parse_worker(root, path))
                .collect()
        }),
        Err(e) => {
            warn!(error = %e, "thread pool unavailable, parsing sequentially");
            paths.iter().map(|path| parse_worker(root, path)).collect()
        }
    }
}

/// Paths an import may resolve to in this scan. A new file that could not be
/// read at parse time is never stored, so nothing may import it.
fn resolvable_paths(
    inventory: &Inventory,
    jobs: &[ParseJob],
    stored: &BTreeMap<String, String>,
) -> BTreeSet<String> {
    let mut known: BTreeSet<String> = inventory.files.keys().cloned().collect();
    for job in jobs {
        if matches!(job.outcome, ParseOutcome::Unreadable(_)) && !stored.contains_key(&job.path) {
            known.remove(&job.path);
        }
    }
    known
}

/// Turn a parse result into the graph's sync unit for `path`.
pub fn build_file_sync(
    path: &str,
    fingerprint: String,
    parsed: ParsedFile,
    known_paths: &BTreeSet<String>,
) -> FileSync {
    let ids: Vec<String> = parsed
        .definitions
        .iter()
        .map(|d| definition_key(path, &d.local_key))
        .collect();
    let calls = parsed
        .calls
        .iter()
        .filter_map(|call| {
            ids.get(call.caller).map(|caller_id| StoredCallSite {
                caller_id: caller_id.clone(),
                callee: call.callee.clone(),
                arg_count: call.arg_count,
                line: call.line,
            })
        })
        .collect();
    let import_targets = resolve_all(&parsed.imports, path, known_paths);
    let import_specifiers = parsed.imports.clone();
    let definitions = parsed
        .definitions
        .into_iter()
        .zip(ids)
        .map(|(def, id)| DefinitionRecord {
            id,
            file_path: path.to_string(),
            kind: def.kind,
            name: def.name,
            qualified_name: def.qualified_name,
            signature: def.signature,
            source: def.source,
            start_line: def.start_line,
            end_line: def.end_line,
        })
        .collect();
    FileSync {
        path: path.to_string(),
        fingerprint,
        language: Language::from_path(path),
        definitions,
        import_specifiers,
        import_targets,
        calls,
        parse_error: None,
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct Scanner<'a> {
    root: &'a Path,
    config: &'a Config,
    graph: &'a dyn GraphStore,
    index: &'a dyn EmbeddingIndex,
    embedder: &'a dyn Embedder,
}

impl<'a> Scanner<'a> {
    pub fn new(
        root: &'a Path,
        config: &'a Config,
        graph: &'a dyn GraphStore,
        index: &'a dyn EmbeddingIndex,
        embedder: &'a dyn Embedder,
    ) -> Self {
        Self {
            root,
            config,
            graph,
            index,
            embedder,
        }
    }

    /// Run one incremental scan. Only inventory and store failures abort;
    /// per-file problems are collected in the report.
    pub fn run(&self, options: &ScanOptions) -> TreeRootsResult<ScanReport> {
        let started = Instant::now();
        info!(root = %self.root.display(), "scan started");

        let inventory = enumerate(self.root, self.config)?;
        let stored = self.graph.file_fingerprints()?;
        let changes = diff(&inventory, &stored);

        let mut report = ScanReport {
            files_seen: inventory.files.len() + inventory.unreadable.len(),
            new: changes.new.len(),
            modified: changes.modified.len(),
            unchanged: changes.unchanged.len(),
            deleted: changes.deleted.len(),
            ..ScanReport::default()
        };
        for (path, reason) in &inventory.unreadable {
            report.fail(path, FailureStage::Read, reason.clone());
        }

        let changed = changes.changed();
        let jobs = parallel_parse(self.root, &changed, self.config.workers);
        let known_paths = resolvable_paths(&inventory, &jobs, &stored);

        // Phase 1: file records, definitions, imports, call sites.
        let mut touched: BTreeSet<String> = BTreeSet::new();
        let mut synced: Vec<String> = Vec::new();
        for path in &changes.deleted {
            if options.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if let Some(outcome) = self.graph.prune_file(path)? {
                touched.extend(outcome.touched_names);
            }
            self.index.delete_file(path)?;
            debug!(path = %path, "pruned deleted file");
        }
        for job in jobs {
            if report.cancelled || options.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let update = match job.outcome {
                ParseOutcome::Unreadable(reason) => {
                    warn!(path = %job.path, error = %reason, "changed file could not be read");
                    report.fail(&job.path, FailureStage::Read, reason);
                    continue;
                }
                ParseOutcome::Broken {
                    fingerprint,
                    message,
                } => {
                    warn!(path = %job.path, error = %message, "parse failed, indexing as empty");
                    report.fail(&job.path, FailureStage::Parse, message.clone());
                    FileSync {
                        path: job.path.clone(),
                        fingerprint,
                        language: Language::from_path(&job.path),
                        parse_error: Some(message),
                        ..FileSync::default()
                    }
                }
                ParseOutcome::Parsed {
                    fingerprint,
                    parsed,
                } => build_file_sync(&job.path, fingerprint, parsed, &known_paths),
            };
            match self.graph.sync_file(&update) {
                Ok(outcome) => {
                    touched.extend(outcome.touched_names);
                    report.indexed += 1;
                    report.definitions += outcome.definitions;
                    report.import_edges += outcome.imports;
                    synced.push(job.path);
                }
                Err(e) => {
                    warn!(path = %job.path, error = %e, "graph sync failed");
                    report.fail(&job.path, FailureStage::Sync, e.to_string());
                }
            }
        }

        // Imports written against the expected file set are checked against
        // what is actually stored; a changed set can also move the imports of
        // files that were not re-parsed.
        let stored_paths: BTreeSet<String> = self.graph.file_fingerprints()?.into_keys().collect();
        if stored_paths != known_paths || !stored.keys().eq(stored_paths.iter()) {
            self.relink_imports(&stored_paths, &mut report)?;
        }

        // Phase 2: re-link calls of synced files and of every file naming a
        // definition that appeared or disappeared. Runs even when cancelled,
        // since synced files have already lost their outgoing CALLS edges.
        let mut relink: BTreeSet<String> = synced.iter().cloned().collect();
        relink.extend(self.graph.files_calling(&touched)?);
        for path in &relink {
            match self.graph.link_calls(path) {
                Ok(n) => report.call_edges += n,
                Err(e) => {
                    warn!(path = %path, error = %e, "call linking failed");
                    report.fail(path, FailureStage::Link, e.to_string());
                }
            }
        }

        self.reconcile_embeddings(&synced, options, &mut report)?;

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            files_seen = report.files_seen,
            new = report.new,
            modified = report.modified,
            unchanged = report.unchanged,
            deleted = report.deleted,
            definitions = report.definitions,
            imports_relinked = report.imports_relinked,
            call_edges = report.call_edges,
            embedded = report.embedded,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms,
            "scan finished"
        );
        Ok(report)
    }

    /// Re-resolve every stored file's import specifiers against `known`.
    fn relink_imports(
        &self,
        known: &BTreeSet<String>,
        report: &mut ScanReport,
    ) -> TreeRootsResult<()> {
        for (path, specifiers) in self.graph.import_specifiers()? {
            let targets = resolve_all(&specifiers, &path, known);
            match self.graph.replace_imports(&path, &targets) {
                Ok(true) => report.imports_relinked += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %path, error = %e, "import relinking failed");
                    report.fail(&path, FailureStage::Link, e.to_string());
                }
            }
        }
        debug!(relinked = report.imports_relinked, "imports re-resolved");
        Ok(())
    }

    /// Bring the index in line with the graph: drop vectors of vanished
    /// definitions, invalidate re-synced files, then embed whatever is
    /// missing one file at a time.
    fn reconcile_embeddings(
        &self,
        synced: &[String],
        options: &ScanOptions,
        report: &mut ScanReport,
    ) -> TreeRootsResult<()> {
        let graph_ids = self.graph.definition_ids()?;
        let stale: Vec<String> = self
            .index
            .ids()?
            .into_iter()
            .filter(|id| !graph_ids.contains(id))
            .collect();
        if !stale.is_empty() {
            self.index.delete_ids(&stale)?;
        }
        // Invalidated vectors count as missing, so an interrupted scan is
        // finished by the next one.
        for path in synced {
            self.index.delete_file(path)?;
        }
        if report.cancelled || options.is_cancelled() {
            report.cancelled = true;
            return Ok(());
        }

        let model_changed = self
            .index
            .dimension()?
            .is_some_and(|(_, model)| model != self.embedder.model_id());
        let indexed = if model_changed {
            BTreeSet::new()
        } else {
            self.index.ids()?
        };
        let mut pending: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for id in graph_ids.difference(&indexed) {
            if let Some(def) = self.graph.definition(id)? {
                pending.entry(def.file_path).or_default().insert(def.id);
            }
        }

        let mut stopped: Option<String> = None;
        for (path, ids) in &pending {
            if let Some(reason) = &stopped {
                report.fail(path, FailureStage::Embed, format!("not embedded: {reason}"));
                continue;
            }
            if options.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let defs: Vec<DefinitionRecord> = self
                .graph
                .definitions_in_file(path)?
                .into_iter()
                .filter(|d| ids.contains(&d.id))
                .collect();
            match self.embed_definitions(&defs) {
                Ok(records) => {
                    let outcome = self.index.upsert(self.embedder.model_id(), &records)?;
                    report.embedded += outcome.written;
                    report.index_recreated |= outcome.recreated;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "embedding failed");
                    let retryable = e.is_retryable();
                    report.fail(path, FailureStage::Embed, e.to_string());
                    if !retryable {
                        stopped = Some(format!("embedding stopped after fatal error: {e}"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Embed every definition of one file, or none of them.
    fn embed_definitions(&self, defs: &[DefinitionRecord]) -> TreeRootsResult<Vec<EmbeddingRecord>> {
        let mut records = Vec::with_capacity(defs.len());
        for chunk in defs.chunks(self.config.embed_batch.max(1)) {
            let documents: Vec<String> = chunk.iter().map(|d| d.embedding_document()).collect();
            let vectors = self.embedder.embed_batch(&documents)?;
            if vectors.len() != chunk.len() {
                return Err(TreeRootsError::EmbeddingGenerationFailed {
                    retryable: false,
                    message: format!(
                        "embedder returned {} vectors for {} documents",
                        vectors.len(),
                        chunk.len()
                    ),
                });
            }
            records.extend(chunk.iter().zip(vectors).map(|(def, vector)| EmbeddingRecord {
                id: def.id.clone(),
                vector,
                payload: EmbeddingPayload::from(def),
            }));
        }
        Ok(records)
    }
}
