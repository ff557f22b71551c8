//! Data models for database sessions.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{CommitMode, ConnectionParameters, DatabaseType, SessionState};
pub use query::{ColumnMetadata, ParamSet, QueryParam, QueryResult, Statement};
