//! Blocking database sessions over PostgreSQL, MySQL and SQLite.
//!
//! Open a [`Session`] from explicit [`ConnectionParameters`], execute
//! statements that return every row, and end transactions explicitly with
//! `commit`/`rollback`. Connection failures come back as
//! [`SessionError::Connection`] values instead of panics.
//!
//! ```no_run
//! use db_session::{ConnectionParameters, ParamSet, with_session};
//!
//! let params = ConnectionParameters::postgres("localhost", "dvdrental", "postgres", "secret");
//! let rows = with_session(&params, |session| {
//!     let params = ParamSet::named().with("first", "Bob").with("last", "Smith");
//!     session.execute(
//!         "INSERT INTO actor (first_name, last_name) VALUES (:first, :last)",
//!         Some(&params),
//!     )?;
//!     session.commit()?;
//!     session.query("SELECT first_name, last_name FROM actor")
//! })?;
//! println!("{} actors", rows.row_count());
//! # Ok::<(), db_session::SessionError>(())
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod models;
pub mod session;

pub use config::Config;
pub use error::{SessionError, SessionResult};
pub use models::{
    ColumnMetadata, CommitMode, ConnectionParameters, DatabaseType, ParamSet, QueryParam,
    QueryResult, SessionState, Statement,
};
pub use session::{Session, with_session, with_transaction};
