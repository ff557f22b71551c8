//! Output formatting for query results.
//!
//! Renders a [`QueryResult`] as JSON, an ASCII table (like the MySQL CLI) or
//! a Markdown table.

use crate::models::{ColumnMetadata, QueryResult};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    /// ASCII table format (like MySQL CLI)
    #[default]
    Table,
    /// Markdown table format
    Markdown,
}

impl OutputFormat {
    pub fn render(&self, result: &QueryResult) -> String {
        match self {
            Self::Json => format_as_json(result),
            Self::Table => format_as_table(result),
            Self::Markdown => format_as_markdown(result),
        }
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}

/// Rows as arrays aligned with `columns`, plus the counters.
///
/// Arrays keep column order and duplicate names such as `SELECT a.id, b.id`.
pub fn format_as_json(result: &QueryResult) -> String {
    let output = serde_json::json!({
        "columns": result.columns,
        "rows": result.rows,
        "row_count": result.row_count(),
        "rows_affected": result.rows_affected,
        "execution_time_ms": result.execution_time_ms,
    });
    serde_json::to_string_pretty(&output).unwrap_or_else(|_| output.to_string())
}

pub fn format_as_table(result: &QueryResult) -> String {
    let columns = &result.columns;
    if columns.is_empty() {
        return format!(
            "Query OK, {} ({:.2} sec)\n",
            affected_text(result.rows_affected),
            seconds(result.execution_time_ms)
        );
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.name.width()).collect();
    for row in &result.rows {
        for (i, value) in row.iter().enumerate().take(widths.len()) {
            widths[i] = widths[i].max(format_value(value).width());
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    output.push_str(&header_line(columns, &widths));
    output.push_str(&separator);

    for row in &result.rows {
        let row_str: String = widths
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let value = row.get(i).unwrap_or(&JsonValue::Null);
                pad(&format_value(value), w, matches!(value, JsonValue::Number(_)))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    output.push_str(&separator);

    let row_count = result.row_count();
    let row_text = if row_count == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} in set ({:.2} sec)\n",
        row_count,
        row_text,
        seconds(result.execution_time_ms)
    ));

    output
}

pub fn format_as_markdown(result: &QueryResult) -> String {
    let columns = &result.columns;
    if columns.is_empty() {
        return format!("*{}*\n", affected_text(result.rows_affected));
    }

    let mut output = String::new();

    let header: String = columns
        .iter()
        .map(|c| format!("| {} ", c.name))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = columns.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in &result.rows {
        let row_str: String = (0..columns.len())
            .map(|i| {
                let value = row.get(i).unwrap_or(&JsonValue::Null);
                format!("| {} ", format_value(value).replace('|', "\\|"))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&row_str);
    }

    output.push_str(&format!("\n*{} rows*\n", result.row_count()));

    output
}

fn header_line(columns: &[ColumnMetadata], widths: &[usize]) -> String {
    columns
        .iter()
        .zip(widths)
        .map(|(col, &w)| {
            let padding = w.saturating_sub(col.name.width());
            let left = padding / 2;
            format!(
                "| {}{}{} ",
                " ".repeat(left),
                col.name,
                " ".repeat(padding - left)
            )
        })
        .collect::<String>()
        + "|\n"
}

/// Pad by display width; `format!` width counts chars, not columns.
fn pad(text: &str, width: usize, right_align: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(text.width()));
    if right_align {
        format!("| {}{} ", fill, text)
    } else {
        format!("| {}{} ", text, fill)
    }
}

fn affected_text(rows_affected: u64) -> String {
    let row_text = if rows_affected == 1 { "row" } else { "rows" };
    format!("{} {} affected", rows_affected, row_text)
}

fn seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}
