//! Phone-number relationship graph: in-memory store and seed import.

mod memory;
mod seed;

pub use caller_types::{
    CallDirection, CallFilters, Edge, EdgeMetadata, EdgeType, GraphQuery, GraphStats, GraphStore,
    GraphStoreError, MetadataRegistry, Node,
};
pub use memory::InMemoryGraphStore;
pub use seed::{SeedReport, SkippedRecord};
