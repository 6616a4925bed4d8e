//! Context packet types and their two serializations.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::errors::TreeRootsResult;
use crate::models::{DefinitionKind, DefinitionRecord, NodeType, SearchHit};

/// A definition referenced from a packet entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRef {
    pub id: String,
    pub name: String,
    pub kind: DefinitionKind,
    pub file_path: String,
    pub start_line: usize,
}

impl From<&DefinitionRecord> for DefinitionRef {
    fn from(def: &DefinitionRecord) -> Self {
        Self {
            id: def.id.clone(),
            name: def.name.clone(),
            kind: def.kind,
            file_path: def.file_path.clone(),
            start_line: def.start_line,
        }
    }
}

/// A node reached by the blast-radius walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlastNode {
    pub id: String,
    pub node_type: NodeType,
    pub name: String,
    pub file_path: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphContext {
    pub callers: Vec<DefinitionRef>,
    pub callees: Vec<DefinitionRef>,
    /// Files importing the seed's file.
    pub dependents: Vec<String>,
    /// Files the seed's file imports.
    pub dependencies: Vec<String>,
    pub siblings: Vec<DefinitionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blast_radius: Option<Vec<BlastNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedMatch {
    pub id: String,
    pub score: f64,
    pub name: String,
    pub kind: DefinitionKind,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub document: String,
}

impl From<&SearchHit> for SeedMatch {
    fn from(hit: &SearchHit) -> Self {
        Self {
            id: hit.id.clone(),
            score: hit.score,
            name: hit.payload.name.clone(),
            kind: hit.payload.kind,
            file_path: hit.payload.file_path.clone(),
            start_line: hit.payload.start_line,
            end_line: hit.payload.end_line,
            document: hit.payload.document.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketEntry {
    pub seed: SeedMatch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphContext>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextPacket {
    pub entries: Vec<PacketEntry>,
    /// Every file touched by any entry, first occurrence first.
    pub related_files: IndexSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketFormat {
    /// Pretty-printed JSON tree.
    Nested,
    /// Flat XML elements, one `<match>` per seed.
    Tagged,
}

impl ContextPacket {
    pub fn semantic_matches(&self) -> usize {
        self.entries.len()
    }

    pub fn render(&self, format: PacketFormat) -> TreeRootsResult<String> {
        match format {
            PacketFormat::Nested => Ok(serde_json::to_string_pretty(self)?),
            PacketFormat::Tagged => Ok(self.to_tagged()),
        }
    }

    fn to_tagged(&self) -> String {
        let mut out = format!(
            "<context_packet matches=\"{}\" related_files=\"{}\">\n",
            self.entries.len(),
            self.related_files.len()
        );
        for (index, entry) in self.entries.iter().enumerate() {
            let seed = &entry.seed;
            out.push_str(&format!(
                "  <match index=\"{index}\" id=\"{}\" score=\"{}\">\n",
                escape_xml(&seed.id),
                seed.score
            ));
            out.push_str(&format!(
                "    <definition name=\"{}\" kind=\"{}\" file=\"{}\" start_line=\"{}\" end_line=\"{}\"/>\n",
                escape_xml(&seed.name),
                seed.kind,
                escape_xml(&seed.file_path),
                seed.start_line,
                seed.end_line
            ));
            out.push_str(&format!(
                "    <document>{}</document>\n",
                escape_xml(&seed.document)
            ));
            if let Some(graph) = &entry.graph {
                push_definitions(&mut out, "callers", &graph.callers);
                push_definitions(&mut out, "callees", &graph.callees);
                push_files(&mut out, "dependents", &graph.dependents, "    ");
                push_files(&mut out, "dependencies", &graph.dependencies, "    ");
                push_definitions(&mut out, "siblings", &graph.siblings);
                if let Some(blast) = &graph.blast_radius {
                    push_blast(&mut out, blast);
                }
            }
            out.push_str("  </match>\n");
        }
        let related: Vec<String> = self.related_files.iter().cloned().collect();
        push_files(&mut out, "related_files", &related, "  ");
        out.push_str("</context_packet>\n");
        out
    }
}

fn push_definitions(out: &mut String, tag: &str, defs: &[DefinitionRef]) {
    if defs.is_empty() {
        out.push_str(&format!("    <{tag}/>\n"));
        return;
    }
    out.push_str(&format!("    <{tag}>\n"));
    for def in defs {
        out.push_str(&format!(
            "      <node id=\"{}\" name=\"{}\" kind=\"{}\" file=\"{}\" line=\"{}\"/>\n",
            escape_xml(&def.id),
            escape_xml(&def.name),
            def.kind,
            escape_xml(&def.file_path),
            def.start_line
        ));
    }
    out.push_str(&format!("    </{tag}>\n"));
}

fn push_files(out: &mut String, tag: &str, files: &[String], indent: &str) {
    if files.is_empty() {
        out.push_str(&format!("{indent}<{tag}/>\n"));
        return;
    }
    out.push_str(&format!("{indent}<{tag}>\n"));
    for path in files {
        out.push_str(&format!("{indent}  <file path=\"{}\"/>\n", escape_xml(path)));
    }
    out.push_str(&format!("{indent}</{tag}>\n"));
}

fn push_blast(out: &mut String, nodes: &[BlastNode]) {
    if nodes.is_empty() {
        out.push_str("    <blast_radius/>\n");
        return;
    }
    out.push_str("    <blast_radius>\n");
    for node in nodes {
        out.push_str(&format!(
            "      <node id=\"{}\" type=\"{}\" name=\"{}\" file=\"{}\" depth=\"{}\"/>\n",
            escape_xml(&node.id),
            node.node_type.as_str(),
            escape_xml(&node.name),
            escape_xml(&node.file_path),
            node.depth
        ));
    }
    out.push_str("    </blast_radius>\n");
}

pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
