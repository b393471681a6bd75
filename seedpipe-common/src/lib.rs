//! Shared library for the seedpipe workspace
//!
//! Provides the common error type, configuration loading, text
//! normalization, the schema rule set, and the SQLite access layer used by
//! both the ingest CLI and the query API.

pub mod config;
pub mod db;
pub mod error;
pub mod normalize;
pub mod schema;

pub use error::{Error, Result};
