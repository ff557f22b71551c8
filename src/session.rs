//! Blocking database sessions.
//!
//! A [`Session`] owns one database connection plus a private current-thread
//! tokio runtime that drives the async driver, so every call blocks the
//! calling thread until the database answers. Sessions are exclusive: every
//! operation takes `&mut self`, and concurrent callers each open their own.
//!
//! # Lifecycle
//!
//! A session starts `Open` after a successful [`Session::connect`] and becomes
//! `Closed` only through [`Session::close`] (or drop). Closing is terminal and
//! idempotent; any statement on a closed session fails with
//! [`SessionError::InvalidState`].
//!
//! # Transactions
//!
//! In [`CommitMode::Manual`] the session issues `BEGIN` before the first
//! statement after connect, commit or rollback, so changes persist only once
//! [`Session::commit`] is called. Closing with an open transaction rolls it
//! back. In [`CommitMode::AutoCommit`] no transaction is opened and
//! `commit`/`rollback` are no-ops.
//!
//! [`Session::transaction`] (and [`with_transaction`]) runs a closure inside
//! one explicit transaction in either mode, committing when it returns `Ok`
//! and rolling back when it returns `Err`.
//!
//! Calling the blocking API from inside an async runtime returns
//! [`SessionError::Internal`] instead of blocking the runtime.

use crate::db::params::prepare;
use crate::db::{DbConnection, executor};
use crate::error::{SessionError, SessionResult};
use crate::models::{
    CommitMode, ConnectionParameters, DatabaseType, ParamSet, QueryResult, SessionState, Statement,
};
use std::time::Instant;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, error, info, warn};

pub struct Session {
    /// Taken on drop so it can be shut down without blocking.
    runtime: Option<Runtime>,
    /// `None` once the session is closed.
    conn: Option<DbConnection>,
    db_type: DatabaseType,
    commit_mode: CommitMode,
    in_transaction: bool,
    server_version: Option<String>,
    /// Masked connection URL, safe to log.
    url: String,
}

impl Session {
    /// Open a session.
    ///
    /// Any failure, including invalid parameters, is returned as
    /// [`SessionError::Connection`] and logged; no session is produced.
    pub fn connect(params: &ConnectionParameters) -> SessionResult<Self> {
        let url = params.masked_url();

        info!(
            url = %url,
            db_type = %params.db_type,
            commit_mode = ?params.commit_mode,
            "Connecting to database"
        );

        match Self::open(params) {
            Ok(session) => {
                info!(
                    url = %url,
                    server_version = ?session.server_version,
                    "Connected successfully"
                );
                Ok(session)
            }
            Err(e) => {
                let err = match e {
                    SessionError::Connection { .. } => e,
                    other => SessionError::connection(
                        format!("could not connect to {}: {}", url, other),
                        "Check the connection parameters",
                    ),
                };
                error!(url = %url, error = %err, "Connection failed");
                Err(err)
            }
        }
    }

    fn open(params: &ConnectionParameters) -> SessionResult<Self> {
        params.validate()?;
        reject_async_context()?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SessionError::internal(format!("Failed to start runtime: {}", e)))?;

        let mut conn = runtime.block_on(DbConnection::open(params))?;
        let server_version = runtime.block_on(conn.server_version());

        Ok(Self {
            runtime: Some(runtime),
            conn: Some(conn),
            db_type: params.db_type,
            commit_mode: params.commit_mode,
            in_transaction: false,
            server_version,
            url: params.masked_url(),
        })
    }

    /// Execute a statement and return every row it produces.
    ///
    /// `params` binds one parameter set; `None` sends the SQL as-is, which
    /// also allows several `;`-separated statements. A failing statement
    /// leaves the session open.
    pub fn execute(&mut self, sql: &str, params: Option<&ParamSet>) -> SessionResult<QueryResult> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SessionError::invalid_state("execute"));
        };
        let prepared = prepare(sql, params, self.db_type)?;

        if self.commit_mode == CommitMode::Manual && !self.in_transaction {
            block_on(self.runtime.as_ref(), conn.execute_raw("BEGIN"))??;
            self.in_transaction = true;
        }

        block_on(self.runtime.as_ref(), executor::execute(conn, &prepared))?
    }

    /// Execute a statement without parameters.
    pub fn query(&mut self, sql: &str) -> SessionResult<QueryResult> {
        self.execute(sql, None)
    }

    /// Execute a statement with its bundled parameters.
    pub fn execute_statement(&mut self, statement: &Statement) -> SessionResult<QueryResult> {
        self.execute(&statement.sql, statement.params.as_ref())
    }

    /// Execute the same statement once per parameter set.
    ///
    /// Every set is resolved before anything is sent, so a missing named
    /// parameter fails the whole batch up front. The returned result carries
    /// the summed `rows_affected` and any rows the executions produced.
    pub fn execute_many(
        &mut self,
        sql: &str,
        param_sets: &[ParamSet],
    ) -> SessionResult<QueryResult> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SessionError::invalid_state("execute"));
        };
        let start = Instant::now();
        let db_type = self.db_type;
        let prepared = param_sets
            .iter()
            .map(|set| prepare(sql, Some(set), db_type))
            .collect::<SessionResult<Vec<_>>>()?;

        let mut total = QueryResult::empty(0);
        if prepared.is_empty() {
            return Ok(total);
        }

        if self.commit_mode == CommitMode::Manual && !self.in_transaction {
            block_on(self.runtime.as_ref(), conn.execute_raw("BEGIN"))??;
            self.in_transaction = true;
        }

        debug!(sql = %sql, batch = prepared.len(), "Executing batch");

        for statement in &prepared {
            let result = block_on(self.runtime.as_ref(), executor::execute(conn, statement))??;
            total.rows_affected += result.rows_affected;
            if total.columns.is_empty() {
                total.columns = result.columns;
            }
            total.rows.extend(result.rows);
        }

        total.execution_time_ms = start.elapsed().as_millis() as u64;
        Ok(total)
    }

    /// Make the current transaction's changes durable.
    pub fn commit(&mut self) -> SessionResult<()> {
        self.end_transaction("COMMIT", "commit")
    }

    /// Discard the current transaction's changes.
    pub fn rollback(&mut self) -> SessionResult<()> {
        self.end_transaction("ROLLBACK", "rollback")
    }

    fn end_transaction(&mut self, sql: &str, operation: &str) -> SessionResult<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SessionError::invalid_state(operation));
        };
        if !self.in_transaction {
            debug!(operation = operation, "No open transaction");
            return Ok(());
        }

        // The backend ends the transaction even when COMMIT reports an error
        self.in_transaction = false;
        block_on(self.runtime.as_ref(), conn.execute_raw(sql))??;
        info!(url = %self.url, operation = operation, "Transaction ended");
        Ok(())
    }

    /// Run `f` inside one transaction: commit when it returns `Ok`, roll back
    /// when it returns `Err`.
    ///
    /// The transaction is opened explicitly, so statements in `f` share it
    /// even in [`CommitMode::AutoCommit`]; the commit mode is restored
    /// afterwards. Refused with [`SessionError::InvalidInput`] while a manual
    /// transaction is already open. A failed rollback is logged and the
    /// closure's error is returned.
    pub fn transaction<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Session) -> Result<T, E>,
        E: From<SessionError>,
    {
        self.begin()?;
        let commit_mode = std::mem::replace(&mut self.commit_mode, CommitMode::Manual);

        match f(self) {
            Ok(value) => {
                let committed = self.commit();
                self.commit_mode = commit_mode;
                committed?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(error = %rollback_err, "Rollback after failed transaction block failed");
                }
                self.commit_mode = commit_mode;
                Err(e)
            }
        }
    }

    fn begin(&mut self) -> SessionResult<()> {
        let Some(conn) = self.conn.as_mut() else {
            return Err(SessionError::invalid_state("begin transaction"));
        };
        if self.in_transaction {
            return Err(SessionError::invalid_input(
                "A transaction is already open; commit or roll back first",
            ));
        }
        block_on(self.runtime.as_ref(), conn.execute_raw("BEGIN"))??;
        self.in_transaction = true;
        info!(url = %self.url, "Transaction started");
        Ok(())
    }

    /// Close the session. Calling this on a closed session does nothing.
    pub fn close(&mut self) -> SessionResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        if self.in_transaction {
            self.in_transaction = false;
            warn!(url = %self.url, "Rolling back uncommitted transaction on close");
            if let Err(e) = block_on(self.runtime.as_ref(), conn.execute_raw("ROLLBACK"))? {
                warn!(error = %e, "Rollback on close failed");
            }
        }

        block_on(self.runtime.as_ref(), conn.close())??;
        info!(url = %self.url, "Session closed");
        Ok(())
    }

    /// Change the commit mode. Not allowed while a transaction is open.
    pub fn set_commit_mode(&mut self, commit_mode: CommitMode) -> SessionResult<()> {
        if self.conn.is_none() {
            return Err(SessionError::invalid_state("set commit mode"));
        }
        if self.in_transaction && commit_mode != self.commit_mode {
            return Err(SessionError::invalid_input(
                "Cannot change commit mode inside a transaction; commit or roll back first",
            ));
        }
        self.commit_mode = commit_mode;
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        if self.conn.is_some() {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode
    }

    /// True while a manually managed transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("commit_mode", &self.commit_mode)
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.conn.is_none() {
            return;
        }
        if Handle::try_current().is_ok() {
            // Cannot block here; dropping the connection closes its socket
            warn!(url = %self.url, "Session dropped inside an async runtime");
            self.conn.take();
            if let Some(runtime) = self.runtime.take() {
                runtime.shutdown_background();
            }
            return;
        }
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close session on drop");
        }
    }
}

fn reject_async_context() -> SessionResult<()> {
    if Handle::try_current().is_ok() {
        return Err(SessionError::internal(
            "blocking session API called from within an async runtime",
        ));
    }
    Ok(())
}

/// Drive a future to completion on the session's runtime.
fn block_on<F: Future>(runtime: Option<&Runtime>, future: F) -> SessionResult<F::Output> {
    reject_async_context()?;
    let runtime =
        runtime.ok_or_else(|| SessionError::internal("session runtime has shut down"))?;
    Ok(runtime.block_on(future))
}

/// Open a session, run `f`, and close the session on every exit path.
///
/// The closure's error wins over a close error.
pub fn with_session<T, E, F>(params: &ConnectionParameters, f: F) -> Result<T, E>
where
    F: FnOnce(&mut Session) -> Result<T, E>,
    E: From<SessionError>,
{
    let mut session = Session::connect(params)?;
    let result = f(&mut session);
    let closed = session.close();
    let value = result?;
    closed?;
    Ok(value)
}

/// Open a session, run `f` inside one transaction, and close the session.
///
/// Commits when `f` returns `Ok` and rolls back when it returns `Err`, the
/// way a scoped "begin once" block does.
pub fn with_transaction<T, E, F>(params: &ConnectionParameters, f: F) -> Result<T, E>
where
    F: FnOnce(&mut Session) -> Result<T, E>,
    E: From<SessionError>,
{
    with_session(params, |session| session.transaction(f))
}
