//! TreeRoots core library: a code-structure graph and a vector index over a
//! git repository, combined into context packets for a coding task.
//!
//! A scan keeps both stores in step with the tracked source files. A query
//! embeds the task text, takes the nearest definitions as seeds, and expands
//! each through the graph (callers, callees, importing and imported files,
//! siblings, and optionally the blast radius). [`engine::Engine`] is the
//! entry point.

pub mod analysis;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod query;
pub mod store;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use engine::{Engine, NodeDetails, QueryOptions, QueryResult};
pub use errors::{TreeRootsError, TreeRootsResult};
