//! Reader for whitespace separated TFS-style tables.
//!
//! The measurement toolchain ships error and rotation tables in a loose
//! TFS dialect: `@` metadata lines, a `*` column header, a `$` type row
//! and then one data row per magnet slot. Row and column names are
//! normalised to lowercase so lookups never depend on file casing.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use lhcerr_core::errors::{ErrorInfo, Fault};
use lhcerr_core::Result;

/// One parsed data row, keyed by lowercased column name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TfsRow {
    values: BTreeMap<String, f64>,
}

impl TfsRow {
    /// Looks up a column value, ignoring case.
    pub fn value(&self, column: &str) -> Option<f64> {
        self.values.get(&column.to_ascii_lowercase()).copied()
    }

    /// Looks up a column the caller considers mandatory.
    pub fn require(&self, column: &str) -> Result<f64> {
        self.value(column).ok_or_else(|| {
            read_fault(
                "missing-column",
                format!("column `{column}` is not present in this row"),
            )
        })
    }

    /// True when the row carries the named column.
    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(&column.to_ascii_lowercase())
    }

    /// Columns of this row in sorted order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

/// A parsed table: named rows in file order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TfsTable {
    columns: Vec<String>,
    rows: IndexMap<String, TfsRow>,
}

impl TfsTable {
    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table holds no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value column names as declared by the header, lowercased.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// True when a row with this (case-insensitive) name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.rows.contains_key(&name.to_ascii_lowercase())
    }

    /// Looks up a row, ignoring case.
    pub fn row(&self, name: &str) -> Option<&TfsRow> {
        self.rows.get(&name.to_ascii_lowercase())
    }

    /// Row names in file order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Rows in file order.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &TfsRow)> {
        self.rows.iter().map(|(name, row)| (name.as_str(), row))
    }
}

/// Reads and parses a table file.
pub fn read_table(path: impl AsRef<Path>) -> Result<TfsTable> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| {
        read_fault("table-io", format!("cannot read table file: {source}"))
            .with_context("path", path.display())
    })?;
    parse_table(&text).map_err(|fault| fault.with_context("path", path.display()))
}

/// Parses table text.
///
/// Metadata (`@`), type (`$`) and blank lines are skipped; the `*` header
/// names the columns (its first token is the key column and is dropped);
/// sentinel rows starting `not_found` or `not found` are skipped. A data
/// row before any header, or a value that does not parse as a float, is
/// fatal.
pub fn parse_table(text: &str) -> Result<TfsTable> {
    let mut columns: Option<Vec<String>> = None;
    let mut rows: IndexMap<String, TfsRow> = IndexMap::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('@') || line.starts_with('$') {
            continue;
        }
        if let Some(header) = line.strip_prefix('*') {
            columns = Some(
                header
                    .split_whitespace()
                    .skip(1)
                    .map(str::to_ascii_lowercase)
                    .collect(),
            );
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((key, value_tokens)) = tokens.split_first() else {
            continue;
        };
        if is_sentinel(key, value_tokens) {
            continue;
        }
        let Some(columns) = columns.as_deref() else {
            return Err(read_fault(
                "data-before-header",
                "data row appears before any `*` header row",
            )
            .with_context("line", index + 1));
        };
        let name = key.replace('"', "").to_ascii_lowercase();
        let mut values = BTreeMap::new();
        for (column, token) in columns.iter().zip(value_tokens.iter()) {
            let value: f64 = token.parse().map_err(|_| {
                read_fault(
                    "malformed-value",
                    format!("`{token}` in column `{column}` is not a number"),
                )
                .with_context("line", index + 1)
                .with_context("row", &name)
            })?;
            values.insert(column.clone(), value);
        }
        rows.insert(name, TfsRow { values });
    }
    Ok(TfsTable {
        columns: columns.unwrap_or_default(),
        rows,
    })
}

/// Placeholder rows the measurement export emits for unmatched slots.
fn is_sentinel(first: &str, rest: &[&str]) -> bool {
    if first.eq_ignore_ascii_case("not_found") {
        return true;
    }
    first.eq_ignore_ascii_case("not")
        && rest
            .first()
            .map(|second| second.eq_ignore_ascii_case("found"))
            .unwrap_or(false)
}

fn read_fault(code: impl Into<String>, message: impl Into<String>) -> Fault {
    Fault::Table(ErrorInfo::new(code, message))
}

trait ContextExt {
    fn with_context(self, key: impl Into<String>, value: impl ToString) -> Fault;
}

impl ContextExt for Fault {
    fn with_context(self, key: impl Into<String>, value: impl ToString) -> Fault {
        match self {
            Fault::Table(info) => Fault::Table(info.with_context(key, value.to_string())),
            other => other,
        }
    }
}
