//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Single backend-specific connections
//! - Named parameter rewriting and binding
//! - Statement execution
//! - Type mappings

pub mod connection;
pub mod executor;
pub mod params;
pub mod types;

pub use connection::DbConnection;
pub use params::rewrite_named;
