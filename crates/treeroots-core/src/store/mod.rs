//! Persistent stores behind repository traits.
//!
//! The scan pipeline and the context expander only see [`GraphStore`] and
//! [`EmbeddingIndex`]; the SQLite implementations live in [`database`] and
//! [`vectors`].

pub mod database;
pub mod lock;
pub mod schema;
pub mod vectors;

use std::collections::{BTreeMap, BTreeSet};

use crate::errors::TreeRootsResult;
use crate::models::{
    DefinitionRecord, Direction, EdgeRecord, EmbeddingRecord, FileRecord, FileSync, GraphStats,
    NodeSummary, Relation, SearchHit, UpsertOutcome,
};

/// What a sync or prune changed, for deciding which other files need their
/// calls re-linked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Names whose set of definitions changed.
    pub touched_names: BTreeSet<String>,
    pub definitions: usize,
    pub imports: usize,
}

/// Structural graph of files, definitions, and their edges for one project.
pub trait GraphStore: Send + Sync {
    /// Stored `{path: fingerprint}` for every file record.
    fn file_fingerprints(&self) -> TreeRootsResult<BTreeMap<String, String>>;

    fn file(&self, path: &str) -> TreeRootsResult<Option<FileRecord>>;

    /// Atomically replace everything `update.path` owns: its record,
    /// definitions, DEFINES and IMPORTS edges, and stored call sites. Its
    /// outgoing CALLS edges are retracted; [`GraphStore::link_calls`]
    /// re-creates them.
    fn sync_file(&self, update: &FileSync) -> TreeRootsResult<SyncOutcome>;

    /// Re-resolve the stored call sites of `path` against the current
    /// definitions and replace its outgoing CALLS edges. Returns the number
    /// of edges written.
    fn link_calls(&self, path: &str) -> TreeRootsResult<usize>;

    /// Single-file sync including call resolution.
    fn sync_file_with_calls(&self, update: &FileSync) -> TreeRootsResult<SyncOutcome> {
        let outcome = self.sync_file(update)?;
        self.link_calls(&update.path)?;
        Ok(outcome)
    }

    /// Stored raw import specifiers of every file, in source order.
    fn import_specifiers(&self) -> TreeRootsResult<BTreeMap<String, Vec<String>>>;

    /// Replace the outgoing IMPORTS edges of `path` with `targets`. Returns
    /// whether anything changed.
    fn replace_imports(&self, path: &str, targets: &[String]) -> TreeRootsResult<bool>;

    /// Delete a file record with all definitions and edges touching it.
    /// Returns `None` when no such file was stored.
    fn prune_file(&self, path: &str) -> TreeRootsResult<Option<SyncOutcome>>;

    /// Files whose stored call sites name any of `names`.
    fn files_calling(&self, names: &BTreeSet<String>) -> TreeRootsResult<Vec<String>>;

    fn definition(&self, id: &str) -> TreeRootsResult<Option<DefinitionRecord>>;

    fn definitions_in_file(&self, path: &str) -> TreeRootsResult<Vec<DefinitionRecord>>;

    fn definitions_by_ids(&self, ids: &[String]) -> TreeRootsResult<Vec<DefinitionRecord>>;

    fn definition_ids(&self) -> TreeRootsResult<BTreeSet<String>>;

    /// Single-hop definition neighbours over a definition-to-definition
    /// relation, ordered by id.
    fn neighbors(
        &self,
        id: &str,
        relation: &Relation,
        direction: Direction,
    ) -> TreeRootsResult<Vec<DefinitionRecord>>;

    /// Single-hop file neighbours over a file-to-file relation, ordered by
    /// path.
    fn file_neighbors(
        &self,
        path: &str,
        relation: &Relation,
        direction: Direction,
    ) -> TreeRootsResult<Vec<String>>;

    /// Every edge with `node_id` at either end.
    fn edges_of(&self, node_id: &str) -> TreeRootsResult<Vec<EdgeRecord>>;

    /// Every edge of one relationship type, ordered by endpoints.
    fn edges_by_relation(&self, relation: &Relation) -> TreeRootsResult<Vec<EdgeRecord>>;

    /// Create (or update the properties of) a curated edge between two
    /// existing nodes.
    fn create_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relationship: &str,
        properties: Option<serde_json::Value>,
    ) -> TreeRootsResult<EdgeRecord>;

    /// Case-insensitive substring search over file paths and definition
    /// names.
    fn search_nodes(&self, text: &str, limit: usize) -> TreeRootsResult<Vec<NodeSummary>>;

    fn stats(&self) -> TreeRootsResult<GraphStats>;
}

/// Vector store of definition embeddings for one project.
pub trait EmbeddingIndex: Send + Sync {
    /// Write a batch. All vectors must share one dimension; a batch whose
    /// dimension or model differs from the established one recreates the
    /// index first.
    fn upsert(&self, model_id: &str, records: &[EmbeddingRecord]) -> TreeRootsResult<UpsertOutcome>;

    /// Exact cosine ranking, highest first, ties broken by id.
    fn search(&self, query: &[f32], top_k: usize) -> TreeRootsResult<Vec<SearchHit>>;

    fn delete_ids(&self, ids: &[String]) -> TreeRootsResult<usize>;

    fn delete_file(&self, path: &str) -> TreeRootsResult<usize>;

    fn ids(&self) -> TreeRootsResult<BTreeSet<String>>;

    fn len(&self) -> TreeRootsResult<usize>;

    fn is_empty(&self) -> TreeRootsResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Established `(dimension, model id)`, if anything was written.
    fn dimension(&self) -> TreeRootsResult<Option<(usize, String)>>;

    fn clear(&self) -> TreeRootsResult<()>;
}
