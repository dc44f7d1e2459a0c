//! Storage backends for the memory table and vector index.

pub mod surreal;

pub use surreal::{SurrealMemoryTable, SurrealVectorIndex, connect};
