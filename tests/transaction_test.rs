//! Integration tests for commit, rollback and scoped sessions.
//!
//! Each test uses a file-backed SQLite database so a second session can
//! observe what the first one made durable.

use db_session::{
    CommitMode, ConnectionParameters, Session, SessionError, with_session, with_transaction,
};
use serde_json::json;
use tempfile::TempDir;

fn setup_db() -> (TempDir, ConnectionParameters) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.db");
    let params = ConnectionParameters::sqlite(path.to_str().unwrap()).create_if_missing(true);

    let mut session = Session::connect(&params).unwrap();
    session
        .query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();
    session.commit().unwrap();
    session.close().unwrap();

    (dir, params)
}

fn count_users(params: &ConnectionParameters) -> serde_json::Value {
    with_session(params, |session| {
        let result = session.query("SELECT count(*) AS n FROM users")?;
        Ok::<_, SessionError>(result.get(0, "n").cloned().unwrap_or_default())
    })
    .unwrap()
}

#[test]
fn test_commit_persists() {
    let (_dir, params) = setup_db();

    let mut session = Session::connect(&params).unwrap();
    session
        .query("INSERT INTO users (name) VALUES ('Alice')")
        .unwrap();
    assert!(session.in_transaction());
    session.commit().unwrap();
    assert!(!session.in_transaction());
    session.close().unwrap();

    assert_eq!(count_users(&params), json!(1));
}

#[test]
fn test_rollback_discards() {
    let (_dir, params) = setup_db();

    let mut session = Session::connect(&params).unwrap();
    session
        .query("INSERT INTO users (name) VALUES ('Alice')")
        .unwrap();
    session.rollback().unwrap();

    let result = session.query("SELECT count(*) AS n FROM users").unwrap();
    assert_eq!(result.get(0, "n"), Some(&json!(0)));
    session.close().unwrap();

    assert_eq!(count_users(&params), json!(0));
}

#[test]
fn test_close_rolls_back_uncommitted() {
    let (_dir, params) = setup_db();

    let mut session = Session::connect(&params).unwrap();
    session
        .query("INSERT INTO users (name) VALUES ('Alice')")
        .unwrap();
    session.close().unwrap();

    assert_eq!(count_users(&params), json!(0));
}

#[test]
fn test_drop_rolls_back_uncommitted() {
    let (_dir, params) = setup_db();

    {
        let mut session = Session::connect(&params).unwrap();
        session
            .query("INSERT INTO users (name) VALUES ('Alice')")
            .unwrap();
    }

    assert_eq!(count_users(&params), json!(0));
}

#[test]
fn test_autocommit_persists_without_commit() {
    let (_dir, params) = setup_db();
    let params = params.with_commit_mode(CommitMode::AutoCommit);

    let mut session = Session::connect(&params).unwrap();
    session
        .query("INSERT INTO users (name) VALUES ('Alice')")
        .unwrap();
    assert!(!session.in_transaction());
    session.rollback().unwrap();
    session.close().unwrap();

    assert_eq!(count_users(&params), json!(1));
}

#[test]
fn test_with_session_returns_closure_value() {
    let (_dir, params) = setup_db();

    let inserted = with_session(&params, |session| {
        let result = session.query("INSERT INTO users (name) VALUES ('Bob')")?;
        session.commit()?;
        Ok::<_, SessionError>(result.rows_affected)
    })
    .unwrap();

    assert_eq!(inserted, 1);
    assert_eq!(count_users(&params), json!(1));
}

#[test]
fn test_with_session_closes_after_error() {
    let (_dir, params) = setup_db();

    let err = with_session(&params, |session| {
        session.query("INSERT INTO users (name) VALUES ('Bob')")?;
        Err::<(), _>(SessionError::invalid_input("boom"))
    })
    .unwrap_err();

    assert!(matches!(err, SessionError::InvalidInput { .. }));
    assert_eq!(count_users(&params), json!(0));
}

#[test]
fn test_with_transaction_commits_on_success() {
    let (_dir, params) = setup_db();

    let inserted = with_transaction(&params, |session| {
        let a = session.query("INSERT INTO users (name) VALUES ('Alice')")?;
        let b = session.query("INSERT INTO users (name) VALUES ('Bob')")?;
        Ok::<_, SessionError>(a.rows_affected + b.rows_affected)
    })
    .unwrap();

    assert_eq!(inserted, 2);
    assert_eq!(count_users(&params), json!(2));
}

#[test]
fn test_with_transaction_rolls_back_on_error() {
    let (_dir, params) = setup_db();

    let err = with_transaction(&params, |session| {
        session.query("INSERT INTO users (name) VALUES ('Alice')")?;
        session.query("INSERT INTO missing_table (name) VALUES ('Bob')")
    })
    .unwrap_err();

    assert!(matches!(err, SessionError::Query { .. }));
    assert_eq!(count_users(&params), json!(0));
}

#[test]
fn test_transaction_block_in_autocommit_session() {
    let (_dir, params) = setup_db();
    let params = params.with_commit_mode(CommitMode::AutoCommit);

    let mut session = Session::connect(&params).unwrap();
    let result: Result<(), AppError> = session.transaction(|s| {
        s.query("INSERT INTO users (name) VALUES ('Alice')")?;
        Err(AppError::NotFound)
    });
    assert!(matches!(result, Err(AppError::NotFound)));
    assert_eq!(count_users(&params), json!(0));

    session
        .transaction(|s| s.query("INSERT INTO users (name) VALUES ('Bob')"))
        .unwrap();
    assert!(!session.in_transaction());
    assert_eq!(count_users(&params), json!(1));

    // Back in autocommit once the block ends
    session
        .query("INSERT INTO users (name) VALUES ('Carol')")
        .unwrap();
    assert!(!session.in_transaction());
    assert_eq!(count_users(&params), json!(2));
    session.close().unwrap();
}

#[derive(Debug)]
enum AppError {
    Session(SessionError),
    NotFound,
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        AppError::Session(e)
    }
}

#[test]
fn test_with_session_caller_error_type() {
    let (_dir, params) = setup_db();

    let result: Result<(), AppError> = with_session(&params, |session| {
        let result = session.query("SELECT name FROM users WHERE id = 1")?;
        if result.is_empty() {
            return Err(AppError::NotFound);
        }
        Ok(())
    });
    assert!(matches!(result, Err(AppError::NotFound)));

    let result: Result<(), AppError> =
        with_session(&params, |session| session.query("SELEKT").map(|_| ()).map_err(Into::into));
    assert!(matches!(
        result,
        Err(AppError::Session(SessionError::Query { .. }))
    ));
}
