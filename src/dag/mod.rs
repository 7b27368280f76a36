// src/dag/mod.rs

//! Dependency graphs over task names.
//!
//! - [`graph`] holds the insertion-ordered DAG with topological sorting and
//!   subgraph extraction.
//! - [`subtree`] contains the prerequisite-closure walk used for partial
//!   execution.

pub mod graph;
pub mod subtree;

pub use graph::DependencyGraph;
pub use subtree::ancestor_closure;
