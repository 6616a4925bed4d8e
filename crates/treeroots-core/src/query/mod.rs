//! Retrieval: seed expansion over the graph and context-packet rendering.

pub mod expand;
pub mod guards;
pub mod packet;
