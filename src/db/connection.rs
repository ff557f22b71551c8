//! Single database connections.
//!
//! A session owns exactly one backend-specific connection (MySqlConnection,
//! PgConnection, SqliteConnection) so every statement, and the transaction
//! around it, runs on the same server-side session.

use crate::error::{SessionError, SessionResult};
use crate::models::{ConnectionParameters, DatabaseType};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection, Executor};
use tracing::{debug, warn};

/// Database-specific connection (avoids AnyConnection limitations).
#[derive(Debug)]
pub enum DbConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

impl DbConnection {
    /// Open a connection for the given parameters.
    ///
    /// Every failure is reported as [`SessionError::Connection`].
    pub async fn open(params: &ConnectionParameters) -> SessionResult<Self> {
        let connected = match params.db_type {
            DatabaseType::MySQL => {
                let mut options = MySqlConnectOptions::new()
                    .host(&params.host)
                    .username(&params.user)
                    .password(&params.password)
                    .database(&params.database)
                    .charset("utf8mb4");
                if let Some(port) = params.effective_port() {
                    options = options.port(port);
                }
                options.connect().await.map(DbConnection::MySql)
            }
            DatabaseType::PostgreSQL => {
                let mut options = PgConnectOptions::new()
                    .host(&params.host)
                    .username(&params.user)
                    .password(&params.password)
                    .database(&params.database);
                if let Some(port) = params.effective_port() {
                    options = options.port(port);
                }
                options.connect().await.map(DbConnection::Postgres)
            }
            DatabaseType::SQLite => {
                let options = if params.is_in_memory() {
                    SqliteConnectOptions::new().in_memory(true)
                } else {
                    SqliteConnectOptions::new()
                        .filename(&params.database)
                        .create_if_missing(params.create_if_missing)
                };
                options.connect().await.map(DbConnection::SQLite)
            }
        };

        connected.map_err(|e| {
            SessionError::connection(
                format!("could not connect to {}: {}", params.masked_url(), e),
                connection_suggestion(params.db_type, &e),
            )
        })
    }

    /// Run a statement that returns nothing, such as `BEGIN` or `COMMIT`.
    pub async fn execute_raw(&mut self, sql: &str) -> SessionResult<()> {
        debug!(sql = %sql, "Executing control statement");
        let result = match self {
            DbConnection::MySql(conn) => conn.execute(sql).await.map(|_| ()),
            DbConnection::Postgres(conn) => conn.execute(sql).await.map(|_| ()),
            DbConnection::SQLite(conn) => conn.execute(sql).await.map(|_| ()),
        };
        result.map_err(SessionError::from)
    }

    /// Get the server version from the connected database.
    pub async fn server_version(&mut self) -> Option<String> {
        let result = match self {
            DbConnection::MySql(conn) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(conn)
                    .await
            }
            DbConnection::Postgres(conn) => {
                sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_one(conn)
                    .await
            }
            DbConnection::SQLite(conn) => {
                sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                    .fetch_one(conn)
                    .await
            }
        };

        match result {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }

    /// Close the connection, sending the backend's terminate message.
    pub async fn close(self) -> SessionResult<()> {
        let result = match self {
            DbConnection::MySql(conn) => conn.close().await,
            DbConnection::Postgres(conn) => conn.close().await,
            DbConnection::SQLite(conn) => conn.close().await,
        };
        result.map_err(SessionError::from)
    }
}

/// Generate a helpful suggestion for connection errors.
fn connection_suggestion(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") {
        return format!(
            "Check that the {} server is running and accessible",
            db_type
        );
    }

    if error_str.contains("authentication") || error_str.contains("password") {
        return "Verify the user name and password".to_string();
    }

    if error_str.contains("does not exist")
        || error_str.contains("unknown database")
        || error_str.contains("unable to open database")
    {
        return "Check that the database exists".to_string();
    }

    if error_str.contains("tls") || error_str.contains("ssl") {
        return "Check TLS/SSL configuration or try disabling it".to_string();
    }

    match db_type {
        DatabaseType::PostgreSQL | DatabaseType::MySQL => {
            format!("Verify the host, port and credentials for the {} server", db_type)
        }
        DatabaseType::SQLite => {
            "Verify the file path exists and is accessible, or enable create_if_missing"
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error(msg: &str) -> sqlx::Error {
        sqlx::Error::Io(std::io::Error::other(msg.to_string()))
    }

    #[test]
    fn test_connection_suggestion_refused() {
        let suggestion =
            connection_suggestion(DatabaseType::PostgreSQL, &io_error("Connection refused"));
        assert!(suggestion.contains("PostgreSQL server is running"));
    }

    #[test]
    fn test_connection_suggestion_auth() {
        let suggestion = connection_suggestion(
            DatabaseType::MySQL,
            &io_error("password authentication failed for user"),
        );
        assert!(suggestion.contains("password"));
    }

    #[test]
    fn test_connection_suggestion_fallback() {
        let suggestion = connection_suggestion(DatabaseType::SQLite, &io_error("weird"));
        assert!(suggestion.contains("create_if_missing"));
    }

    #[test]
    fn test_open_sqlite_in_memory() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let mut conn = DbConnection::open(&ConnectionParameters::sqlite(":memory:"))
                .await
                .unwrap();
            assert!(matches!(conn, DbConnection::SQLite(_)));
            assert!(conn.server_version().await.is_some());
            conn.close().await.unwrap();
        });
    }
}
