// src/engine/mod.rs

//! Pipeline runner.
//!
//! [`Pipeline`] drives the registry protocol end to end for one execution
//! context and summarises the outcome in a [`RunReport`].

pub mod pipeline;
pub mod report;

pub use pipeline::{Pipeline, Plan};
pub use report::RunReport;
