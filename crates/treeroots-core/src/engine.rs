//! The external surface: scan, query, analysis, and graph curation over
//! any number of project roots.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::{
    build_analysis_prompt, extract_structured, load_plan_template, render_plan_prompt,
    strip_code_fence, LanguageModel, TaskAnalysis,
};
use crate::config::Config;
use crate::embedding::{Embedder, HashingEmbedder, HttpEmbedder};
use crate::errors::{TreeRootsError, TreeRootsResult};
use crate::indexer::pipeline::{ScanOptions, ScanReport, Scanner};
use crate::models::{
    DefinitionRecord, Direction, EdgeRecord, FileRecord, GraphStats, NodeSummary, Relation,
};
use crate::query::expand::{ContextExpander, ExpandOptions};
use crate::query::guards::{
    clamp_limit, truncate_query, DEFAULT_BLAST_DEPTH, MAX_SEARCH_LIMIT, MAX_TOP_K,
};
use crate::query::packet::{ContextPacket, DefinitionRef, GraphContext, PacketFormat};
use crate::store::database::SqliteGraphStore;
use crate::store::lock::{ScanLock, SCAN_LOCK_FILE};
use crate::store::vectors::SqliteEmbeddingIndex;
use crate::store::{EmbeddingIndex, GraphStore};

pub const GRAPH_DB_FILE: &str = "graph.sqlite";
pub const VECTOR_DB_FILE: &str = "vectors.sqlite";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub top_k: usize,
    pub include_graph: bool,
    pub max_hops: usize,
    pub include_siblings: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            include_graph: true,
            max_hops: 1,
            include_siblings: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub query: String,
    pub packet: ContextPacket,
}

impl QueryResult {
    pub fn render(&self, format: PacketFormat) -> TreeRootsResult<String> {
        self.packet.render(format)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type", rename_all = "lowercase")]
pub enum NodeDetails {
    Definition {
        definition: DefinitionRecord,
        context: GraphContext,
        /// Curated edges touching the definition.
        links: Vec<EdgeRecord>,
    },
    File {
        file: FileRecord,
        definitions: Vec<DefinitionRef>,
        dependents: Vec<String>,
        dependencies: Vec<String>,
        links: Vec<EdgeRecord>,
    },
}

/// Stores and scan locks of one project root.
pub struct Project {
    root: PathBuf,
    graph: Arc<dyn GraphStore>,
    index: Arc<dyn EmbeddingIndex>,
    scan_lock: Mutex<()>,
    lock_path: PathBuf,
}

impl Project {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn graph(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    pub fn index(&self) -> &dyn EmbeddingIndex {
        self.index.as_ref()
    }
}

pub struct Engine {
    config: Config,
    embedder: Arc<dyn Embedder>,
    language_model: Option<Arc<dyn LanguageModel>>,
    projects: Mutex<HashMap<PathBuf, Arc<Project>>>,
}

impl Engine {
    /// Build an engine whose embedder follows `config`: the HTTP endpoint
    /// when one is configured, the offline hashing embedder otherwise.
    pub fn new(config: Config) -> TreeRootsResult<Self> {
        let embedder: Arc<dyn Embedder> = match &config.embedding_endpoint {
            Some(endpoint) => Arc::new(HttpEmbedder::new(endpoint)?),
            None => Arc::new(HashingEmbedder::new(config.embedding_dim)),
        };
        Ok(Self {
            config,
            embedder,
            language_model: None,
            projects: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_env() -> TreeRootsResult<Self> {
        Self::new(Config::from_env())
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_language_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.language_model = Some(model);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open (or reuse) the stores of the project at `root`.
    pub fn project(&self, root: &Path) -> TreeRootsResult<Arc<Project>> {
        let canonical = root
            .canonicalize()
            .map_err(|_| TreeRootsError::NotARepository(root.to_path_buf()))?;
        let mut projects = self.projects.lock();
        if let Some(project) = projects.get(&canonical) {
            return Ok(Arc::clone(project));
        }

        let key = canonical.to_string_lossy().into_owned();
        let data_dir = self.config.data_dir_for(&canonical);
        let graph = SqliteGraphStore::open(data_dir.join(GRAPH_DB_FILE), key.clone())?;
        let index = SqliteEmbeddingIndex::open(data_dir.join(VECTOR_DB_FILE), key)?;
        debug!(root = %canonical.display(), data_dir = %data_dir.display(), "project opened");

        let project = Arc::new(Project {
            root: canonical.clone(),
            graph: Arc::new(graph),
            index: Arc::new(index),
            scan_lock: Mutex::new(()),
            lock_path: data_dir.join(SCAN_LOCK_FILE),
        });
        projects.insert(canonical, Arc::clone(&project));
        Ok(project)
    }

    // -----------------------------------------------------------------------
    // Scan
    // -----------------------------------------------------------------------

    pub fn scan(&self, root: &Path) -> TreeRootsResult<ScanReport> {
        self.scan_with(root, &ScanOptions::default())
    }

    /// Scan under the project's exclusive locks. A concurrent scan of the
    /// same root waits for this one to finish, whether it comes from this
    /// engine or from another process sharing the data directory.
    pub fn scan_with(&self, root: &Path, options: &ScanOptions) -> TreeRootsResult<ScanReport> {
        let project = self.project(root)?;
        let _guard = project.scan_lock.lock();
        let _file_guard = ScanLock::acquire(&project.lock_path)?;
        Scanner::new(
            &project.root,
            &self.config,
            project.graph(),
            project.index(),
            self.embedder.as_ref(),
        )
        .run(options)
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    pub fn query(
        &self,
        text: &str,
        root: &Path,
        top_k: usize,
        include_graph: bool,
    ) -> TreeRootsResult<QueryResult> {
        let max_hops = if self.config.blast_radius {
            DEFAULT_BLAST_DEPTH
        } else {
            1
        };
        self.query_with(
            text,
            root,
            &QueryOptions {
                top_k,
                include_graph,
                max_hops,
                ..QueryOptions::default()
            },
        )
    }

    pub fn query_with(
        &self,
        text: &str,
        root: &Path,
        options: &QueryOptions,
    ) -> TreeRootsResult<QueryResult> {
        let text = truncate_query(text);
        if text.is_empty() {
            return Err(TreeRootsError::InvalidInput("query text is empty".to_string()));
        }
        let project = self.project(root)?;
        if let Some((_, model)) = project.index().dimension()? {
            if model != self.embedder.model_id() {
                return Err(TreeRootsError::Query(format!(
                    "index was built with embedding model {model}, not {}; rescan first",
                    self.embedder.model_id()
                )));
            }
        }

        let vector = self.embedder.embed(text)?;
        let hits = project
            .index()
            .search(&vector, clamp_limit(options.top_k, MAX_TOP_K))?;
        let packet = ContextExpander::new(project.graph()).expand(
            &hits,
            &ExpandOptions {
                include_graph: options.include_graph,
                max_hops: options.max_hops,
                include_siblings: options.include_siblings,
            },
        )?;
        info!(
            query = text,
            matches = packet.semantic_matches(),
            related_files = packet.related_files.len(),
            "query answered"
        );
        Ok(QueryResult {
            query: text.to_string(),
            packet,
        })
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    fn language_model(&self) -> TreeRootsResult<&dyn LanguageModel> {
        self.language_model
            .as_deref()
            .ok_or_else(|| TreeRootsError::InvalidInput("no language model configured".to_string()))
    }

    pub fn analyze(&self, task: &str, root: &Path, top_k: usize) -> TreeRootsResult<TaskAnalysis> {
        let model = self.language_model()?;
        let result = self.query(task, root, top_k, true)?;
        let xml_context = result.render(PacketFormat::Tagged)?;
        let analysis = model.generate(&build_analysis_prompt(&result.query, &xml_context))?;
        Ok(TaskAnalysis {
            task: result.query.clone(),
            semantic_matches: result.packet.semantic_matches(),
            related_files: result.packet.related_files.iter().cloned().collect(),
            structured: extract_structured(&analysis),
            analysis,
        })
    }

    pub fn plan(&self, task: &str, root: &Path, top_k: usize) -> TreeRootsResult<String> {
        let model = self.language_model()?;
        let result = self.query(task, root, top_k, true)?;
        let xml_context = result.render(PacketFormat::Tagged)?;
        let template = load_plan_template(self.config.plan_template.as_deref());
        let prompt = render_plan_prompt(
            &template,
            &result.query,
            &xml_context,
            result.packet.semantic_matches(),
            result.packet.related_files.len(),
        );
        let output = model.generate(&prompt)?;
        Ok(strip_code_fence(&output).to_string())
    }

    // -----------------------------------------------------------------------
    // Graph primitives
    // -----------------------------------------------------------------------

    /// A definition id yields its one-hop neighbourhood; a file path yields
    /// its definitions and import neighbours. Both carry curated links.
    pub fn node_details(&self, node_id: &str, root: &Path) -> TreeRootsResult<NodeDetails> {
        let project = self.project(root)?;
        let graph = project.graph();
        let custom_links = |id: &str| -> TreeRootsResult<Vec<EdgeRecord>> {
            Ok(graph
                .edges_of(id)?
                .into_iter()
                .filter(|e| !Relation::from_name(&e.relationship).is_structural())
                .collect())
        };

        if let Some(definition) = graph.definition(node_id)? {
            let context = ContextExpander::new(graph).one_hop(&definition, true)?;
            return Ok(NodeDetails::Definition {
                links: custom_links(&definition.id)?,
                definition,
                context,
            });
        }
        if let Some(file) = graph.file(node_id)? {
            let definitions = graph
                .definitions_in_file(&file.path)?
                .iter()
                .map(DefinitionRef::from)
                .collect();
            return Ok(NodeDetails::File {
                definitions,
                dependents: graph.file_neighbors(&file.path, &Relation::Imports, Direction::Incoming)?,
                dependencies: graph.file_neighbors(&file.path, &Relation::Imports, Direction::Outgoing)?,
                links: custom_links(&file.path)?,
                file,
            });
        }
        Err(TreeRootsError::NodeNotFound(node_id.to_string()))
    }

    pub fn create_edge(
        &self,
        root: &Path,
        source_id: &str,
        target_id: &str,
        relationship: &str,
        properties: Option<serde_json::Value>,
    ) -> TreeRootsResult<EdgeRecord> {
        let project = self.project(root)?;
        let edge = project
            .graph()
            .create_edge(source_id, target_id, relationship, properties)?;
        info!(source = source_id, target = target_id, relationship, "edge created");
        Ok(edge)
    }

    pub fn search_nodes(
        &self,
        root: &Path,
        text: &str,
        limit: usize,
    ) -> TreeRootsResult<Vec<NodeSummary>> {
        let project = self.project(root)?;
        project
            .graph()
            .search_nodes(truncate_query(text), clamp_limit(limit, MAX_SEARCH_LIMIT))
    }

    pub fn stats(&self, root: &Path) -> TreeRootsResult<GraphStats> {
        self.project(root)?.graph().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{git_available, init_repo, remove_file, track_all, write_file};

    struct ScriptedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    impl LanguageModel for ScriptedModel {
        fn generate(&self, prompt: &str) -> TreeRootsResult<String> {
            self.prompts.lock().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn engine(data: &tempfile::TempDir) -> Engine {
        let config = Config {
            data_dir: Some(data.path().to_path_buf()),
            workers: 2,
            embedding_dim: 64,
            ..Config::default()
        };
        Engine::new(config).unwrap()
    }

    /// Scenario A: a.ts defines foo and imports b.ts; foo calls bar in b.ts.
    fn scenario_a(root: &Path) {
        init_repo(root);
        write_file(
            root,
            "a.ts",
            "import { bar } from './b';\n\nexport function foo() {\n  return bar();\n}\n",
        );
        write_file(root, "b.ts", "export function bar() {\n  return 1;\n}\n");
        track_all(root);
    }

    #[test]
    fn test_scenario_a_initial_scan() {
        if !git_available() {
            return;
        }
        let repo = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        scenario_a(repo.path());
        let engine = engine(&data);

        let report = engine.scan(repo.path()).unwrap();
        assert!(report.failures.is_empty(), "{:?}", report.failures);
        let stats = engine.stats(repo.path()).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.definitions, 2);
        assert_eq!(stats.import_edges, 1);
        assert_eq!(stats.call_edges, 1);

        let project = engine.project(repo.path()).unwrap();
        assert_eq!(
            project.index().ids().unwrap(),
            project.graph().definition_ids().unwrap()
        );
        let callees = project
            .graph()
            .neighbors("a.ts::foo", &Relation::Calls, Direction::Outgoing)
            .unwrap();
        assert_eq!(callees[0].id, "b.ts::bar");
    }

    #[test]
    fn test_scenarios_b_and_c_delete_then_query() {
        if !git_available() {
            return;
        }
        let repo = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        scenario_a(repo.path());
        let engine = engine(&data);
        engine.scan(repo.path()).unwrap();

        // Scenario B.
        remove_file(repo.path(), "b.ts");
        write_file(repo.path(), "a.ts", "export function foo() {\n  return 1;\n}\n");
        let report = engine.scan(repo.path()).unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.modified, 1);
        let stats = engine.stats(repo.path()).unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.definitions, 1);
        assert_eq!(stats.import_edges, 0);
        assert_eq!(stats.call_edges, 0);
        let project = engine.project(repo.path()).unwrap();
        assert_eq!(
            project.index().ids().unwrap().into_iter().collect::<Vec<_>>(),
            vec!["a.ts::foo"]
        );

        // Scenario C.
        let result = engine.query("foo", repo.path(), 1, true).unwrap();
        assert_eq!(result.packet.entries.len(), 1);
        let entry = &result.packet.entries[0];
        assert_eq!(entry.seed.id, "a.ts::foo");
        let graph = entry.graph.as_ref().unwrap();
        assert!(graph.dependencies.is_empty());
        assert!(graph.callees.is_empty());
    }

    #[test]
    fn test_scenario_d_ambiguous_handler() {
        if !git_available() {
            return;
        }
        let repo = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let root = repo.path();
        init_repo(root);
        write_file(root, "x.ts", "export function handler() {\n  return 'x';\n}\n");
        write_file(root, "y.ts", "export function handler() {\n  return 'y';\n}\n");
        write_file(root, "z.ts", "export function main() {\n  return handler();\n}\n");
        track_all(root);
        let engine = engine(&data);
        engine.scan(root).unwrap();

        let project = engine.project(root).unwrap();
        assert!(project.graph().definition("x.ts::handler").unwrap().is_some());
        assert!(project.graph().definition("y.ts::handler").unwrap().is_some());
        assert_eq!(engine.stats(root).unwrap().call_edges, 0);

        // Removing one of the two makes the call resolvable.
        remove_file(root, "y.ts");
        let report = engine.scan(root).unwrap();
        assert_eq!(report.deleted, 1);
        let callees = project
            .graph()
            .neighbors("z.ts::main", &Relation::Calls, Direction::Outgoing)
            .unwrap();
        assert_eq!(callees.len(), 1);
        assert_eq!(callees[0].id, "x.ts::handler");
    }

    fn import_pairs(engine: &Engine, root: &Path) -> Vec<(String, String)> {
        engine
            .project(root)
            .unwrap()
            .graph()
            .edges_by_relation(&Relation::Imports)
            .unwrap()
            .into_iter()
            .map(|e| (e.source_id, e.target_id))
            .collect()
    }

    /// The incrementally maintained graph must match one built from scratch.
    fn assert_matches_fresh_scan(incremental: &Engine, root: &Path) {
        let data = tempfile::tempdir().unwrap();
        let fresh = engine(&data);
        fresh.scan(root).unwrap();
        assert_eq!(incremental.stats(root).unwrap(), fresh.stats(root).unwrap());
        assert_eq!(import_pairs(incremental, root), import_pairs(&fresh, root));
    }

    #[test]
    fn test_incremental_imports_match_fresh_scan() {
        if !git_available() {
            return;
        }
        let repo = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let root = repo.path();
        init_repo(root);
        write_file(
            root,
            "a.ts",
            "import { bar } from './b';\n\nexport function foo() {\n  return bar();\n}\n",
        );
        track_all(root);
        let engine = engine(&data);
        engine.scan(root).unwrap();
        assert!(import_pairs(&engine, root).is_empty());

        // Import target added after its importer.
        write_file(root, "b.ts", "export function bar() {\n  return 1;\n}\n");
        track_all(root);
        engine.scan(root).unwrap();
        assert_eq!(
            import_pairs(&engine, root),
            vec![("a.ts".to_string(), "b.ts".to_string())]
        );
        assert_matches_fresh_scan(&engine, root);

        // Target deleted while a directory index can stand in for it.
        write_file(root, "b/index.ts", "export function baz() {\n  return 2;\n}\n");
        track_all(root);
        remove_file(root, "b.ts");
        engine.scan(root).unwrap();
        assert_eq!(
            import_pairs(&engine, root),
            vec![("a.ts".to_string(), "b/index.ts".to_string())]
        );
        assert_matches_fresh_scan(&engine, root);

        // Target re-added.
        write_file(root, "b.ts", "export function bar() {\n  return 3;\n}\n");
        engine.scan(root).unwrap();
        assert_eq!(
            import_pairs(&engine, root),
            vec![("a.ts".to_string(), "b.ts".to_string())]
        );
        assert_matches_fresh_scan(&engine, root);

        let project = engine.project(root).unwrap();
        let callees = project
            .graph()
            .neighbors("a.ts::foo", &Relation::Calls, Direction::Outgoing)
            .unwrap();
        assert_eq!(callees[0].id, "b.ts::bar");
    }

    #[test]
    fn test_engines_sharing_a_data_dir_scan_one_at_a_time() {
        if !git_available() {
            return;
        }
        let repo = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        scenario_a(repo.path());

        // Separate engines stand in for separate processes on one data dir.
        let engines = [engine(&data), engine(&data)];
        for engine in &engines {
            engine.project(repo.path()).unwrap();
        }
        let root = repo.path();
        let reports: Vec<ScanReport> = std::thread::scope(|scope| {
            let handles: Vec<_> = engines
                .iter()
                .map(|engine| scope.spawn(move || engine.scan(root)))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap().unwrap())
                .collect()
        });
        assert!(reports.iter().all(|r| r.failures.is_empty()));
        // Whichever scan ran second found nothing left to do.
        assert!(reports.iter().any(|r| r.unchanged == 2));

        let engine = engine(&data);
        let stats = engine.stats(repo.path()).unwrap();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.import_edges, 1);
        assert_eq!(stats.call_edges, 1);
        assert!(data.path().join(SCAN_LOCK_FILE).exists());
        assert_matches_fresh_scan(&engine, repo.path());
    }

    #[test]
    fn test_not_a_repository() {
        if !git_available() {
            return;
        }
        let plain = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        let engine = engine(&data);
        assert!(matches!(
            engine.scan(plain.path()),
            Err(TreeRootsError::NotARepository(_))
        ));
        assert!(matches!(
            engine.scan(&plain.path().join("missing")),
            Err(TreeRootsError::NotARepository(_))
        ));
        assert_eq!(engine.stats(plain.path()).unwrap(), GraphStats::default());
    }

    #[test]
    fn test_analyze_and_plan_use_language_model() {
        if !git_available() {
            return;
        }
        let repo = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        scenario_a(repo.path());
        let model = ScriptedModel::new("## Files to Modify\n- a.ts\n## Risks\n1. bar callers\n");
        let engine = engine(&data).with_language_model(model.clone());
        engine.scan(repo.path()).unwrap();

        let analysis = engine.analyze("change bar", repo.path(), 2).unwrap();
        assert_eq!(analysis.semantic_matches, 2);
        assert_eq!(analysis.structured.files_to_modify, vec!["a.ts"]);
        assert_eq!(analysis.structured.risks, vec!["bar callers"]);
        assert!(model.prompts.lock()[0].contains("<context_packet matches=\"2\""));

        let fenced = ScriptedModel::new("```xml\n<execution_plan/>\n```");
        let engine = engine.with_language_model(fenced.clone());
        let plan = engine.plan("change bar", repo.path(), 1).unwrap();
        assert_eq!(plan, "<execution_plan/>");
        let prompt = fenced.prompts.lock()[0].clone();
        assert!(prompt.contains("TASK:\nchange bar"));
        assert!(prompt.contains("Found 1 semantically relevant code definitions"));
    }

    #[test]
    fn test_analysis_requires_language_model() {
        let data = tempfile::tempdir().unwrap();
        let engine = engine(&data);
        let repo = tempfile::tempdir().unwrap();
        assert!(matches!(
            engine.analyze("x", repo.path(), 1),
            Err(TreeRootsError::InvalidInput(_))
        ));
        assert!(matches!(
            engine.plan("x", repo.path(), 1),
            Err(TreeRootsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_node_details_and_custom_edges() {
        if !git_available() {
            return;
        }
        let repo = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        scenario_a(repo.path());
        let engine = engine(&data);
        engine.scan(repo.path()).unwrap();

        engine
            .create_edge(repo.path(), "a.ts::foo", "b.ts", "DOCUMENTED_IN", None)
            .unwrap();

        match engine.node_details("a.ts::foo", repo.path()).unwrap() {
            NodeDetails::Definition { context, links, .. } => {
                assert_eq!(context.callees[0].id, "b.ts::bar");
                assert_eq!(context.dependencies, vec!["b.ts"]);
                assert_eq!(links.len(), 1);
                assert_eq!(links[0].relationship, "DOCUMENTED_IN");
            }
            other => panic!("expected definition details, got {other:?}"),
        }
        match engine.node_details("b.ts", repo.path()).unwrap() {
            NodeDetails::File {
                definitions,
                dependents,
                links,
                ..
            } => {
                assert_eq!(definitions[0].id, "b.ts::bar");
                assert_eq!(dependents, vec!["a.ts"]);
                assert_eq!(links.len(), 1);
            }
            other => panic!("expected file details, got {other:?}"),
        }
        assert!(matches!(
            engine.node_details("nope.ts", repo.path()),
            Err(TreeRootsError::NodeNotFound(_))
        ));

        let hits = engine.search_nodes(repo.path(), "bar", 5).unwrap();
        assert_eq!(hits[0].id, "b.ts::bar");

        // Rescanning leaves curated edges alone while both ends exist.
        write_file(repo.path(), "b.ts", "export function bar() {\n  return 2;\n}\n");
        engine.scan(repo.path()).unwrap();
        assert_eq!(engine.stats(repo.path()).unwrap().custom_edges, 1);
    }

    #[test]
    fn test_query_rejects_empty_text_and_other_models() {
        if !git_available() {
            return;
        }
        let repo = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        scenario_a(repo.path());
        let engine = engine(&data);
        engine.scan(repo.path()).unwrap();
        assert!(matches!(
            engine.query("   ", repo.path(), 3, true),
            Err(TreeRootsError::InvalidInput(_))
        ));

        let other = engine.with_embedder(Arc::new(HashingEmbedder::new(16)));
        assert!(matches!(
            other.query("foo", repo.path(), 3, true),
            Err(TreeRootsError::Query(_))
        ));
    }
}
