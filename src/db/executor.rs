//! Query execution engine.
//!
//! One round trip per call: the statement is sent, every row is collected,
//! and the rows-affected counts reported by the driver are summed.
//! Statements without a parameter set take the unprepared path, so DDL and
//! multi-statement scripts work on every backend.
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific execution
//! - `postgres`: PostgreSQL-specific execution
//! - `sqlite`: SQLite-specific execution

use crate::db::connection::DbConnection;
use crate::db::params::PreparedSql;
use crate::db::types::RowToValues;
use crate::error::SessionResult;
use crate::models::QueryResult;
use futures_util::TryStreamExt;
use sqlx::Either;
use std::time::Instant;
use tracing::debug;

/// Execute a prepared statement on a connection and collect the full result.
pub(crate) async fn execute(
    conn: &mut DbConnection,
    prepared: &PreparedSql<'_>,
) -> SessionResult<QueryResult> {
    let start = Instant::now();

    debug!(
        sql = %prepared.sql,
        params = prepared.values.len(),
        "Executing statement"
    );

    match conn {
        DbConnection::MySql(c) => {
            let (rows, affected) = mysql::fetch_all(c, prepared).await?;
            process_rows(rows, affected, start)
        }
        DbConnection::Postgres(c) => {
            let (rows, affected) = postgres::fetch_all(c, prepared).await?;
            process_rows(rows, affected, start)
        }
        DbConnection::SQLite(c) => {
            let (rows, affected) = sqlite::fetch_all(c, prepared).await?;
            process_rows(rows, affected, start)
        }
    }
}

/// Process rows from any database type into a QueryResult.
fn process_rows<R: RowToValues>(
    rows: Vec<R>,
    rows_affected: u64,
    start: Instant,
) -> SessionResult<QueryResult> {
    let columns = rows
        .first()
        .map(|r| r.column_metadata())
        .unwrap_or_default();
    let values = rows.iter().map(|r| r.to_values()).collect();
    let execution_time_ms = start.elapsed().as_millis() as u64;

    debug!(
        rows = rows.len(),
        rows_affected = rows_affected,
        execution_time_ms = execution_time_ms,
        "Statement completed"
    );

    Ok(QueryResult {
        columns,
        rows: values,
        rows_affected,
        execution_time_ms,
    })
}

// =============================================================================
// Common Helper Functions
// =============================================================================

fn split_results<Q, R>(
    results: Vec<Either<Q, R>>,
    rows_affected: impl Fn(&Q) -> u64,
) -> (Vec<R>, u64) {
    let mut rows = Vec::new();
    let mut affected = 0u64;
    for item in results {
        match item {
            Either::Left(done) => affected += rows_affected(&done),
            Either::Right(row) => rows.push(row),
        }
    }
    (rows, affected)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlx::MySqlConnection;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_all(
        conn: &mut MySqlConnection,
        prepared: &PreparedSql<'_>,
    ) -> SessionResult<(Vec<MySqlRow>, u64)> {
        let results = if prepared.parameterized {
            let mut query = sqlx::query(&*prepared.sql);
            for param in prepared.values.iter().copied() {
                query = bind_mysql_param(query, param);
            }
            sqlx::Executor::fetch_many(&mut *conn, query)
                .try_collect::<Vec<_>>()
                .await
        } else {
            sqlx::Executor::fetch_many(&mut *conn, &*prepared.sql)
                .try_collect::<Vec<_>>()
                .await
        }?;

        Ok(split_results(results, |r| r.rows_affected()))
    }
}

mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::PgConnection;
    use sqlx::postgres::PgRow;

    pub async fn fetch_all(
        conn: &mut PgConnection,
        prepared: &PreparedSql<'_>,
    ) -> SessionResult<(Vec<PgRow>, u64)> {
        let results = if prepared.parameterized {
            let mut query = sqlx::query(&*prepared.sql);
            for param in prepared.values.iter().copied() {
                query = bind_postgres_param(query, param);
            }
            sqlx::Executor::fetch_many(&mut *conn, query)
                .try_collect::<Vec<_>>()
                .await
        } else {
            sqlx::Executor::fetch_many(&mut *conn, &*prepared.sql)
                .try_collect::<Vec<_>>()
                .await
        }?;

        Ok(split_results(results, |r| r.rows_affected()))
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlx::SqliteConnection;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_all(
        conn: &mut SqliteConnection,
        prepared: &PreparedSql<'_>,
    ) -> SessionResult<(Vec<SqliteRow>, u64)> {
        let results = if prepared.parameterized {
            let mut query = sqlx::query(&*prepared.sql);
            for param in prepared.values.iter().copied() {
                query = bind_sqlite_param(query, param);
            }
            sqlx::Executor::fetch_many(&mut *conn, query)
                .try_collect::<Vec<_>>()
                .await
        } else {
            sqlx::Executor::fetch_many(&mut *conn, &*prepared.sql)
                .try_collect::<Vec<_>>()
                .await
        }?;

        Ok(split_results(results, |r| r.rows_affected()))
    }
}
