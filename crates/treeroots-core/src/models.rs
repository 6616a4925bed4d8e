//! Shared typed models used across indexing, storage, and query layers.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity helpers
// ---------------------------------------------------------------------------

/// Separator between the file path and the definition name in a composite key.
pub const KEY_SEPARATOR: &str = "::";

/// Build the composite key `path::qualified_name[#n]` for a definition.
pub fn definition_key(file_path: &str, local_key: &str) -> String {
    format!("{file_path}{KEY_SEPARATOR}{local_key}")
}

/// Split a composite key back into `(file_path, local_key)`.
pub fn split_definition_key(id: &str) -> Option<(&str, &str)> {
    id.rsplit_once(KEY_SEPARATOR)
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Java,
    Go,
}

const LANGUAGE_BY_EXTENSION: &[(&str, Language)] = &[
    ("ts", Language::TypeScript),
    ("mts", Language::TypeScript),
    ("cts", Language::TypeScript),
    ("tsx", Language::Tsx),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("py", Language::Python),
    ("java", Language::Java),
    ("go", Language::Go),
];

impl Language {
    /// Detect the language of a path from its extension.
    pub fn from_path(path: &str) -> Option<Language> {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        // TypeScript declaration files carry no definitions worth indexing.
        if ext == "ts" && stem.ends_with(".d") {
            return None;
        }
        let ext = ext.to_ascii_lowercase();
        LANGUAGE_BY_EXTENSION
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, lang)| *lang)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Go => "go",
        }
    }

    pub fn parse(value: &str) -> Option<Language> {
        match value {
            "typescript" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "javascript" => Some(Language::JavaScript),
            "python" => Some(Language::Python),
            "java" => Some(Language::Java),
            "go" => Some(Language::Go),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Function,
    Class,
    Method,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Function => "function",
            DefinitionKind::Class => "class",
            DefinitionKind::Method => "method",
        }
    }

    pub fn parse(value: &str) -> Option<DefinitionKind> {
        match value {
            "function" => Some(DefinitionKind::Function),
            "class" => Some(DefinitionKind::Class),
            "method" => Some(DefinitionKind::Method),
            _ => None,
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A definition as stored in the graph, keyed by its composite key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRecord {
    pub id: String,
    pub file_path: String,
    pub kind: DefinitionKind,
    pub name: String,
    pub qualified_name: String,
    pub signature: String,
    pub source: String,
    pub start_line: usize,
    pub end_line: usize,
}

impl DefinitionRecord {
    /// Text handed to the embedding model for this definition.
    pub fn embedding_document(&self) -> String {
        format!("{} {}\n{}", self.kind, self.name, self.source)
    }
}

/// A call recorded against its caller definition, not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCallSite {
    pub caller_id: String,
    pub callee: String,
    pub arg_count: usize,
    pub line: usize,
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub fingerprint: String,
    pub language: Option<Language>,
    pub definition_count: usize,
    pub parse_error: Option<String>,
    pub last_indexed_at: String,
}

/// Everything one file contributes to the graph in a single sync unit.
#[derive(Debug, Clone, Default)]
pub struct FileSync {
    pub path: String,
    pub fingerprint: String,
    pub language: Option<Language>,
    pub definitions: Vec<DefinitionRecord>,
    /// Raw import specifiers, kept so imports can be re-resolved when the
    /// set of project files changes.
    pub import_specifiers: Vec<String>,
    /// Resolved project-relative import targets.
    pub import_targets: Vec<String>,
    pub calls: Vec<StoredCallSite>,
    pub parse_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Edges & traversal
// ---------------------------------------------------------------------------

pub const REL_DEFINES: &str = "DEFINES";
pub const REL_IMPORTS: &str = "IMPORTS";
pub const REL_CALLS: &str = "CALLS";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Relation {
    Defines,
    Imports,
    Calls,
    /// A curated relationship type created through `create_edge`.
    Custom(String),
}

impl Relation {
    pub fn as_str(&self) -> &str {
        match self {
            Relation::Defines => REL_DEFINES,
            Relation::Imports => REL_IMPORTS,
            Relation::Calls => REL_CALLS,
            Relation::Custom(name) => name.as_str(),
        }
    }

    pub fn from_name(name: &str) -> Relation {
        match name {
            REL_DEFINES => Relation::Defines,
            REL_IMPORTS => Relation::Imports,
            REL_CALLS => Relation::Calls,
            other => Relation::Custom(other.to_string()),
        }
    }

    pub fn is_structural(&self) -> bool {
        !matches!(self, Relation::Custom(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    File,
    Definition,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Definition => "definition",
        }
    }

    pub fn parse(value: &str) -> Option<NodeType> {
        match value {
            "file" => Some(NodeType::File),
            "definition" => Some(NodeType::Definition),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source_id: String,
    pub source_type: NodeType,
    pub target_id: String,
    pub target_type: NodeType,
    pub relationship: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Value>,
}

/// A node hit from free-text search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub node_type: NodeType,
    pub name: String,
    pub file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<DefinitionKind>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub files: usize,
    pub definitions: usize,
    pub defines_edges: usize,
    pub import_edges: usize,
    pub call_edges: usize,
    pub custom_edges: usize,
}

// ---------------------------------------------------------------------------
// Embeddings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingPayload {
    pub name: String,
    pub kind: DefinitionKind,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub document: String,
}

impl From<&DefinitionRecord> for EmbeddingPayload {
    fn from(def: &DefinitionRecord) -> Self {
        Self {
            name: def.name.clone(),
            kind: def.kind,
            file_path: def.file_path.clone(),
            start_line: def.start_line,
            end_line: def.end_line,
            document: def.embedding_document(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: EmbeddingPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub payload: EmbeddingPayload,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub written: usize,
    /// The project's index was dropped because the dimension or model changed.
    pub recreated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_key_round_trip() {
        let key = definition_key("src/a.ts", "Widget.render#1");
        assert_eq!(key, "src/a.ts::Widget.render#1");
        assert_eq!(
            split_definition_key(&key),
            Some(("src/a.ts", "Widget.render#1"))
        );
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(Language::from_path("src/a.ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_path("ui/App.tsx"), Some(Language::Tsx));
        assert_eq!(Language::from_path("lib/x.MJS"), Some(Language::JavaScript));
        assert_eq!(Language::from_path("pkg/mod.py"), Some(Language::Python));
        assert_eq!(Language::from_path("types/index.d.ts"), None);
        assert_eq!(Language::from_path("README.md"), None);
        assert_eq!(Language::from_path(".gitignore"), None);
    }

    #[test]
    fn test_relation_names() {
        assert_eq!(Relation::from_name("CALLS"), Relation::Calls);
        assert_eq!(
            Relation::from_name("EXPLAINS"),
            Relation::Custom("EXPLAINS".to_string())
        );
        assert!(!Relation::Custom("X".to_string()).is_structural());
        assert!(Relation::Imports.is_structural());
    }

    #[test]
    fn test_embedding_document_format() {
        let def = DefinitionRecord {
            id: "a.py::run".to_string(),
            file_path: "a.py".to_string(),
            kind: DefinitionKind::Function,
            name: "run".to_string(),
            qualified_name: "run".to_string(),
            signature: "def run()".to_string(),
            source: "def run():\n    pass".to_string(),
            start_line: 1,
            end_line: 2,
        };
        assert_eq!(def.embedding_document(), "function run\ndef run():\n    pass");
        let payload = EmbeddingPayload::from(&def);
        assert_eq!(payload.file_path, "a.py");
        assert_eq!(payload.end_line, 2);
    }
}
