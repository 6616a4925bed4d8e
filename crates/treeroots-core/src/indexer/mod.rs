//! Source ingestion: inventory, parsing, import and call resolution, and the
//! scan pipeline that drives them.

pub mod callgraph;
pub mod imports;
pub mod inventory;
pub mod parser;
pub mod pipeline;
