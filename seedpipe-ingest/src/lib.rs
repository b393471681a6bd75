//! Batch ingestion pipeline
//!
//! Drives folder discovery, parallel parsing, schema validation, duplicate
//! collapse and transactional batch writes over the shared store. The
//! orchestrator sequences the phases; everything else is a phase.

pub mod adapters;
pub mod dedup;
pub mod orchestrator;
pub mod parse;
pub mod retry;
pub mod scanner;
pub mod summary;
pub mod validate;
pub mod writer;
