//! Parameter binding utilities for database queries.
//!
//! Named `:name` placeholders are rewritten into the backend's native
//! placeholder syntax, then `QueryParam` values are bound to the
//! database-specific query objects in placeholder order.

use crate::error::{SessionError, SessionResult};
use crate::models::{DatabaseType, ParamSet, QueryParam};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// A statement ready to send: native placeholders plus values in bind order.
#[derive(Debug)]
pub(crate) struct PreparedSql<'a> {
    pub sql: Cow<'a, str>,
    pub values: Vec<&'a QueryParam>,
    /// False when the caller passed no parameter set at all.
    pub parameterized: bool,
}

/// Resolve a statement and its optional parameters for the given backend.
pub(crate) fn prepare<'a>(
    sql: &'a str,
    params: Option<&'a ParamSet>,
    db_type: DatabaseType,
) -> SessionResult<PreparedSql<'a>> {
    match params {
        None => Ok(PreparedSql {
            sql: Cow::Borrowed(sql),
            values: Vec::new(),
            parameterized: false,
        }),
        Some(ParamSet::Positional(values)) => Ok(PreparedSql {
            sql: Cow::Borrowed(sql),
            values: values.iter().collect(),
            parameterized: true,
        }),
        Some(ParamSet::Mixed { .. }) => Err(SessionError::invalid_input(
            "Cannot mix positional and named parameters in one statement",
        )),
        Some(ParamSet::Named(map)) => {
            let (rewritten, names) = rewrite_named(sql, db_type);
            let values = resolve_names(&names, map)?;
            Ok(PreparedSql {
                sql: Cow::Owned(rewritten),
                values,
                parameterized: true,
            })
        }
    }
}

fn resolve_names<'a>(
    names: &[String],
    map: &'a BTreeMap<String, QueryParam>,
) -> SessionResult<Vec<&'a QueryParam>> {
    names
        .iter()
        .map(|name| {
            map.get(name).ok_or_else(|| {
                SessionError::invalid_input(format!(
                    "Missing value for named parameter ':{}'",
                    name
                ))
            })
        })
        .collect()
}

/// Rewrite `:name` placeholders into native placeholders.
///
/// Returns the rewritten SQL and the parameter names in bind order. PostgreSQL
/// reuses `$n` for repeated names; `?` backends bind a repeated name once per
/// occurrence. String literals, quoted identifiers, comments, dollar-quoted
/// bodies and `::` casts are copied unchanged, and `\:` yields a literal colon.
/// Backslash escapes are honored inside MySQL strings and PostgreSQL `E'...'`
/// strings.
pub fn rewrite_named(sql: &str, db_type: DatabaseType) -> (String, Vec<String>) {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                let end = skip_quoted(&chars, i, c, backslash_escapes(&chars, i, db_type));
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map(|p| i + p)
                    .unwrap_or(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let end = find_seq(&chars, i + 2, &['*', '/'])
                    .map(|p| p + 2)
                    .unwrap_or(chars.len());
                out.extend(&chars[i..end]);
                i = end;
            }
            '$' if db_type == DatabaseType::PostgreSQL => {
                let end = skip_dollar_quoted(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '\\' if chars.get(i + 1) == Some(&':') => {
                out.push(':');
                i += 2;
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                out.push_str("::");
                i += 2;
            }
            ':' if chars.get(i + 1).is_some_and(|&ch| is_ident_start(ch)) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                match db_type {
                    DatabaseType::PostgreSQL => {
                        let idx = match names.iter().position(|n| *n == name) {
                            Some(idx) => idx,
                            None => {
                                names.push(name);
                                names.len() - 1
                            }
                        };
                        out.push_str(&format!("${}", idx + 1));
                    }
                    DatabaseType::MySQL | DatabaseType::SQLite => {
                        names.push(name);
                        out.push('?');
                    }
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    (out, names)
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Whether `\` escapes the next character in the literal opening at `start`.
fn backslash_escapes(chars: &[char], start: usize, db_type: DatabaseType) -> bool {
    match (db_type, chars[start]) {
        (DatabaseType::MySQL, '\'' | '"') => true,
        (DatabaseType::PostgreSQL, '\'') => {
            start >= 1
                && matches!(chars[start - 1], 'E' | 'e')
                && (start < 2 || !is_ident_char(chars[start - 2]))
        }
        _ => false,
    }
}

/// Index just past the closing quote; a doubled quote is an escaped quote.
fn skip_quoted(chars: &[char], start: usize, quote: char, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        if backslash && chars[i] == '\\' {
            i += 2;
            continue;
        }
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn find_seq(chars: &[char], from: usize, seq: &[char]) -> Option<usize> {
    (from..chars.len()).find(|&i| chars[i..].starts_with(seq))
}

/// Skip a `$tag$ ... $tag$` body. A `$` that does not open a tag (such as
/// `$1`) only consumes itself.
fn skip_dollar_quoted(chars: &[char], start: usize) -> usize {
    let mut j = start + 1;
    while j < chars.len() && is_ident_char(chars[j]) && !chars[start + 1].is_ascii_digit() {
        j += 1;
    }
    if chars.get(j) != Some(&'$') {
        return start + 1;
    }
    let tag = &chars[start..=j];
    find_seq(chars, j + 1, tag)
        .map(|p| p + tag.len())
        .unwrap_or(chars.len())
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Bytes(v) => query.bind(v.as_slice()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_named_postgres() {
        let (sql, names) = rewrite_named(
            "SELECT x, y FROM some_table WHERE y > :y AND x < :x OR y = :y",
            DatabaseType::PostgreSQL,
        );
        assert_eq!(
            sql,
            "SELECT x, y FROM some_table WHERE y > $1 AND x < $2 OR y = $1"
        );
        assert_eq!(names, vec!["y", "x"]);
    }

    #[test]
    fn test_rewrite_named_question_mark() {
        let (sql, names) = rewrite_named(
            "INSERT INTO some_table (x, y) VALUES (:x, :y)",
            DatabaseType::SQLite,
        );
        assert_eq!(sql, "INSERT INTO some_table (x, y) VALUES (?, ?)");
        assert_eq!(names, vec!["x", "y"]);

        let (sql, names) = rewrite_named("SELECT :a + :a", DatabaseType::MySQL);
        assert_eq!(sql, "SELECT ? + ?");
        assert_eq!(names, vec!["a", "a"]);
    }

    #[test]
    fn test_rewrite_skips_literals_and_casts() {
        let (sql, names) = rewrite_named(
            "SELECT ':not_a_param', \"col:x\", '2024-01-01'::date, :real -- :comment\n/* :block */",
            DatabaseType::PostgreSQL,
        );
        assert_eq!(
            sql,
            "SELECT ':not_a_param', \"col:x\", '2024-01-01'::date, $1 -- :comment\n/* :block */"
        );
        assert_eq!(names, vec!["real"]);
    }

    #[test]
    fn test_rewrite_escaped_quote_and_colon() {
        let (sql, names) = rewrite_named(
            "SELECT 'it''s :x', '10\\:30', :y",
            DatabaseType::SQLite,
        );
        assert_eq!(sql, "SELECT 'it''s :x', '10\\:30', ?");
        assert_eq!(names, vec!["y"]);

        let (sql, names) = rewrite_named("SELECT 10\\:30", DatabaseType::SQLite);
        assert_eq!(sql, "SELECT 10:30");
        assert!(names.is_empty());
    }

    #[test]
    fn test_rewrite_backslash_escaped_quote() {
        let (sql, names) = rewrite_named("SELECT 'it\\'s :x', :y", DatabaseType::MySQL);
        assert_eq!(sql, "SELECT 'it\\'s :x', ?");
        assert_eq!(names, vec!["y"]);

        let (_, names) = rewrite_named("SELECT \"a\\\" :x\", :y", DatabaseType::MySQL);
        assert_eq!(names, vec!["y"]);

        let (sql, names) = rewrite_named(
            "SELECT E'it\\'s :x', e'\\\\', :y",
            DatabaseType::PostgreSQL,
        );
        assert_eq!(sql, "SELECT E'it\\'s :x', e'\\\\', $1");
        assert_eq!(names, vec!["y"]);
    }

    #[test]
    fn test_rewrite_backslash_is_literal_in_standard_strings() {
        // Standard strings end at the first quote, so :x is a placeholder
        let (sql, names) = rewrite_named("SELECT 'a\\', :x", DatabaseType::PostgreSQL);
        assert_eq!(sql, "SELECT 'a\\', $1");
        assert_eq!(names, vec!["x"]);

        let (_, names) = rewrite_named("SELECT name'a\\', :x", DatabaseType::PostgreSQL);
        assert_eq!(names, vec!["x"]);

        let (_, names) = rewrite_named("SELECT 'a\\', :x", DatabaseType::SQLite);
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn test_rewrite_dollar_quoted_body() {
        let (sql, names) = rewrite_named(
            "SELECT $fn$ :inside $fn$, $$ :also $$, :outside",
            DatabaseType::PostgreSQL,
        );
        assert_eq!(sql, "SELECT $fn$ :inside $fn$, $$ :also $$, $1");
        assert_eq!(names, vec!["outside"]);
    }

    #[test]
    fn test_rewrite_leaves_assignment_alone() {
        let (sql, names) = rewrite_named("SET @total := 5", DatabaseType::MySQL);
        assert_eq!(sql, "SET @total := 5");
        assert!(names.is_empty());
    }

    #[test]
    fn test_prepare_missing_named_param() {
        let params = ParamSet::named().with("x", 1);
        let err = prepare("SELECT :x, :y", Some(&params), DatabaseType::SQLite).unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput { .. }));
        assert!(err.to_string().contains(":y"));
    }

    #[test]
    fn test_prepare_rejects_mixed_params() {
        let params = ParamSet::positional().push(1).with("y", 2);
        let err = prepare("SELECT ?, :y", Some(&params), DatabaseType::SQLite).unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput { .. }));
        assert!(err.to_string().contains("mix"));
    }

    #[test]
    fn test_prepare_orders_values() {
        let params = ParamSet::named().with("x", 1).with("y", "b");
        let prepared = prepare("VALUES (:y, :x)", Some(&params), DatabaseType::SQLite).unwrap();
        assert_eq!(prepared.sql, "VALUES (?, ?)");
        assert_eq!(
            prepared.values,
            vec![&QueryParam::String("b".to_string()), &QueryParam::Int(1)]
        );
        assert!(prepared.parameterized);
    }

    #[test]
    fn test_prepare_without_params_borrows() {
        let prepared = prepare("SELECT 1", None, DatabaseType::MySQL).unwrap();
        assert!(matches!(prepared.sql, Cow::Borrowed(_)));
        assert!(!prepared.parameterized);
    }
}
