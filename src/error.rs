//! Error types for database sessions.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Connection-establishment faults are always converted into [`SessionError::Connection`]
//! by [`Session::connect`](crate::Session::connect), so callers never see a raw driver
//! error when opening a session.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Invalid state: cannot {operation} on a closed session")]
    InvalidState { operation: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SessionError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid state error for an operation attempted on a closed session.
    pub fn invalid_state(operation: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// SQLSTATE reported by the database, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// True if the underlying connection is likely unusable after this error.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Convert sqlx errors to SessionError.
impl From<sqlx::Error> for SessionError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => SessionError::connection(
                msg.to_string(),
                "Check the connection parameters and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let suggestion = query_suggestion(code.as_deref());
                SessionError::query(db_err.message(), code, suggestion)
            }
            sqlx::Error::RowNotFound => SessionError::query(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => SessionError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => SessionError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => SessionError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::PoolClosed => {
                SessionError::connection("Connection is closed", "Open a new session")
            }
            sqlx::Error::WorkerCrashed => SessionError::connection(
                "Database worker crashed",
                "Open a new session",
            ),
            sqlx::Error::TypeNotFound { type_name } => SessionError::query(
                format!("Type not found: {}", type_name),
                None,
                "Check the parameter types against the column types",
            ),
            sqlx::Error::ColumnNotFound(col) => SessionError::query(
                format!("Column not found: {}", col),
                None,
                "Check the column names in the statement",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => SessionError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                SessionError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => {
                SessionError::internal(format!("Decode error: {}", source))
            }
            _ => SessionError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Remediation hint keyed on SQLSTATE (PostgreSQL and MySQL share most classes).
fn query_suggestion(sql_state: Option<&str>) -> &'static str {
    let Some(code) = sql_state else {
        return "Check the SQL syntax and referenced objects";
    };
    match code {
        "42P01" | "42S02" => "Check that the table exists",
        "42703" | "42S22" => "Check the column names in the statement",
        "42601" | "42000" => "Check the SQL syntax",
        "25P02" => "The transaction was aborted; roll back before running more statements",
        "40001" | "40P01" => "Roll back and run the transaction again",
        "28000" | "28P01" => "Verify the user name and password",
        c if c.starts_with("23") => "The statement violates an integrity constraint",
        c if c.starts_with("22") => "Check the parameter values against the column types",
        _ => "Check the SQL syntax and referenced objects",
    }
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
