//! Graph expansion of semantic seed matches into a context packet.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexSet;
use tracing::debug;

use crate::errors::TreeRootsResult;
use crate::models::{DefinitionRecord, Direction, NodeType, Relation, SearchHit};
use crate::query::guards::{clamp_depth, MAX_BLAST_DEPTH, MAX_GRAPH_VISITED};
use crate::query::packet::{BlastNode, ContextPacket, DefinitionRef, GraphContext, PacketEntry, SeedMatch};
use crate::store::GraphStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandOptions {
    /// Attach graph context to each seed. Without it the packet only lists
    /// the seeds and their files.
    pub include_graph: bool,
    /// Values above 1 add a blast-radius walk of up to this many hops.
    pub max_hops: usize,
    pub include_siblings: bool,
}

impl Default for ExpandOptions {
    fn default() -> Self {
        Self {
            include_graph: true,
            max_hops: 1,
            include_siblings: true,
        }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub struct ContextExpander<'a> {
    graph: &'a dyn GraphStore,
}

impl<'a> ContextExpander<'a> {
    pub fn new(graph: &'a dyn GraphStore) -> Self {
        Self { graph }
    }

    pub fn expand(
        &self,
        hits: &[SearchHit],
        options: &ExpandOptions,
    ) -> TreeRootsResult<ContextPacket> {
        let mut packet = ContextPacket::default();
        for hit in hits {
            packet.related_files.insert(hit.payload.file_path.clone());
            let graph = if options.include_graph {
                Some(self.context_for(&hit.id, options, &mut packet.related_files)?)
            } else {
                None
            };
            packet.entries.push(PacketEntry {
                seed: SeedMatch::from(hit),
                graph,
            });
        }
        debug!(
            seeds = packet.entries.len(),
            related_files = packet.related_files.len(),
            "context expanded"
        );
        Ok(packet)
    }

    fn context_for(
        &self,
        id: &str,
        options: &ExpandOptions,
        related: &mut IndexSet<String>,
    ) -> TreeRootsResult<GraphContext> {
        // The vector index can briefly trail the graph; a seed without a
        // definition gets no neighbourhood.
        let Some(def) = self.graph.definition(id)? else {
            return Ok(GraphContext::default());
        };
        let mut context = self.one_hop(&def, options.include_siblings)?;
        related.extend(context.dependencies.iter().cloned());
        related.extend(context.dependents.iter().cloned());
        for d in context.callers.iter().chain(&context.callees) {
            related.insert(d.file_path.clone());
        }
        if options.max_hops > 1 {
            context.blast_radius = Some(self.blast_radius(&def, options.max_hops)?);
        }
        Ok(context)
    }

    /// Immediate neighbourhood of one definition.
    pub fn one_hop(
        &self,
        def: &DefinitionRecord,
        include_siblings: bool,
    ) -> TreeRootsResult<GraphContext> {
        let refs = |defs: Vec<DefinitionRecord>| -> Vec<DefinitionRef> {
            defs.iter().map(DefinitionRef::from).collect()
        };
        let callers = refs(self.graph.neighbors(&def.id, &Relation::Calls, Direction::Incoming)?);
        let callees = refs(self.graph.neighbors(&def.id, &Relation::Calls, Direction::Outgoing)?);
        let dependents =
            self.graph
                .file_neighbors(&def.file_path, &Relation::Imports, Direction::Incoming)?;
        let dependencies =
            self.graph
                .file_neighbors(&def.file_path, &Relation::Imports, Direction::Outgoing)?;
        let siblings = if include_siblings {
            self.graph
                .definitions_in_file(&def.file_path)?
                .iter()
                .filter(|d| d.id != def.id)
                .map(DefinitionRef::from)
                .collect()
        } else {
            Vec::new()
        };
        Ok(GraphContext {
            callers,
            callees,
            dependents,
            dependencies,
            siblings,
            blast_radius: None,
        })
    }

    /// Breadth-first walk over incoming CALLS and incoming IMPORTS.
    ///
    /// A definition leads to its callers and to the files importing its
    /// file; a file leads to the files importing it. Every node is visited
    /// at most once and the walk stops at [`MAX_GRAPH_VISITED`] nodes.
    pub fn blast_radius(
        &self,
        seed: &DefinitionRecord,
        max_hops: usize,
    ) -> TreeRootsResult<Vec<BlastNode>> {
        let max_hops = clamp_depth(max_hops, MAX_BLAST_DEPTH);
        let mut queue: VecDeque<(NodeType, String, String, usize)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(seed.id.clone());
        visited.insert(seed.file_path.clone());
        queue.push_back((NodeType::Definition, seed.id.clone(), seed.file_path.clone(), 0));

        let mut reached = Vec::new();
        'walk: while let Some((node_type, id, file_path, depth)) = queue.pop_front() {
            if depth >= max_hops {
                continue;
            }
            let next_depth = depth + 1;

            if node_type == NodeType::Definition {
                for caller in self.graph.neighbors(&id, &Relation::Calls, Direction::Incoming)? {
                    if visited.len() >= MAX_GRAPH_VISITED {
                        break 'walk;
                    }
                    if !visited.insert(caller.id.clone()) {
                        continue;
                    }
                    reached.push(BlastNode {
                        id: caller.id.clone(),
                        node_type: NodeType::Definition,
                        name: caller.name.clone(),
                        file_path: caller.file_path.clone(),
                        depth: next_depth,
                    });
                    queue.push_back((NodeType::Definition, caller.id, caller.file_path, next_depth));
                }
            }

            for dependent in
                self.graph
                    .file_neighbors(&file_path, &Relation::Imports, Direction::Incoming)?
            {
                if visited.len() >= MAX_GRAPH_VISITED {
                    break 'walk;
                }
                if !visited.insert(dependent.clone()) {
                    continue;
                }
                reached.push(BlastNode {
                    id: dependent.clone(),
                    node_type: NodeType::File,
                    name: file_name(&dependent).to_string(),
                    file_path: dependent.clone(),
                    depth: next_depth,
                });
                queue.push_back((NodeType::File, dependent.clone(), dependent, next_depth));
            }
        }
        Ok(reached)
    }
}
