// Copyright 2026 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Query synthesis for the small SQL subset the ingestor speaks:
//! select, create-table, insert and multi-table join.
//!
//! Everything here is pure string building. Malformed input fails fast with
//! `ValidationError` before anything reaches the store.

use crate::domain::entities::{column_names, Column, JoinSpec, Row, Value, DATETIME_FORMAT};
use crate::domain::errors::{IngestError, Result};

/// Storage clause for staging tables: single node, no sort key.
const STAGING_ENGINE: &str = "ENGINE = MergeTree() ORDER BY tuple()";

const DEFAULT_JOIN_TYPE: &str = "INNER JOIN";

/// Whether a caller-supplied `WHERE` clause may be appended verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterPolicy {
    /// Filter clauses are refused.
    #[default]
    Reject,
    /// The caller vouches for the clause; it is appended unchanged.
    Trusted,
}

impl FilterPolicy {
    pub fn from_trusted(trusted: bool) -> Self {
        if trusted {
            FilterPolicy::Trusted
        } else {
            FilterPolicy::Reject
        }
    }
}

/// Identifiers are interpolated unquoted, so anything that could end the
/// name (whitespace, quotes, separators, comments) is refused.
fn require_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(IngestError::ValidationError(format!("{} name is empty", kind)));
    }
    let legal = name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '$');
    if !legal {
        return Err(IngestError::ValidationError(format!(
            "invalid {} name: {}",
            kind, name
        )));
    }
    Ok(())
}

fn joined_names<S: AsRef<str>>(names: &[S]) -> Result<String> {
    if names.is_empty() {
        return Err(IngestError::ValidationError(
            "at least one column is required".to_string(),
        ));
    }
    for n in names {
        require_name("column", n.as_ref())?;
    }
    Ok(names
        .iter()
        .map(|n| n.as_ref())
        .collect::<Vec<_>>()
        .join(", "))
}

/// `SELECT a, b FROM t`
pub fn build_select(table: &str, columns: &[Column]) -> Result<String> {
    require_name("table", table)?;
    let cols = joined_names(&column_names(columns))?;
    Ok(format!("SELECT {} FROM {}", cols, table))
}

/// `SELECT <cols|*> FROM t LIMIT n`, used by previews.
pub fn build_preview(table: &str, columns: &[String], limit: usize) -> Result<String> {
    require_name("table", table)?;
    let cols = if columns.is_empty() {
        "*".to_string()
    } else {
        joined_names(columns)?
    };
    Ok(format!("SELECT {} FROM {} LIMIT {}", cols, table, limit))
}

/// `DESCRIBE TABLE t`
pub fn build_describe(table: &str) -> Result<String> {
    require_name("table", table)?;
    Ok(format!("DESCRIBE TABLE {}", table))
}

/// Appends a row limit to an already-built query.
pub fn with_limit(query: &str, limit: usize) -> String {
    format!("{} LIMIT {}", query.trim_end(), limit)
}

/// Idempotent `CREATE TABLE IF NOT EXISTS` with one definition per column, in order.
pub fn build_create_table(table: &str, columns: &[Column]) -> Result<String> {
    require_name("table", table)?;
    if columns.is_empty() {
        return Err(IngestError::ValidationError(format!(
            "cannot create table {} without columns",
            table
        )));
    }
    let mut defs = Vec::with_capacity(columns.len());
    for col in columns {
        require_name("column", &col.name)?;
        defs.push(format!("{} {}", col.name, col.col_type));
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) {}",
        table,
        defs.join(", "),
        STAGING_ENGINE
    ))
}

/// `INSERT INTO t (a, b)`; the batch engine appends the value tuples.
pub fn build_insert_prefix(table: &str, columns: &[Column]) -> Result<String> {
    require_name("table", table)?;
    let cols = joined_names(&column_names(columns))?;
    Ok(format!("INSERT INTO {} ({})", table, cols))
}

/// Renders a full multi-row insert from a prefix and a batch.
pub fn build_insert_batch(prefix: &str, rows: &[Row]) -> String {
    let mut sql = String::with_capacity(prefix.len() + rows.len() * 32);
    sql.push_str(prefix);
    sql.push_str(" VALUES ");
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        sql.push('(');
        for (j, value) in row.iter().enumerate() {
            if j > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&sql_literal(value));
        }
        sql.push(')');
    }
    sql
}

/// SQL literal for a single value.
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) if f.is_nan() => "nan".to_string(),
        Value::Float64(f) if f.is_infinite() => {
            if *f > 0.0 {
                "inf".to_string()
            } else {
                "-inf".to_string()
            }
        }
        Value::Float64(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::DateTime(dt) => format!("'{}'", dt.format(DATETIME_FORMAT)),
        Value::Text(s) => quote_string(s),
    }
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Join types are keywords only, e.g. `LEFT JOIN` or `LEFT OUTER JOIN`.
fn validate_join_type(join_type: &str) -> Result<String> {
    let t = join_type.trim();
    let keywords_only = t.chars().all(|c| c.is_ascii_alphabetic() || c == ' ');
    if !keywords_only || !t.to_ascii_uppercase().ends_with("JOIN") {
        return Err(IngestError::ValidationError(format!(
            "invalid join type: {}",
            join_type
        )));
    }
    Ok(t.to_string())
}

/// Builds a multi-table join. The first table drives; the rest join onto it
/// in order. Every selected column is table-qualified.
pub fn build_join(spec: &JoinSpec, policy: FilterPolicy) -> Result<String> {
    if spec.tables.len() < 2 {
        return Err(IngestError::ValidationError(
            "at least two tables are required for a join".to_string(),
        ));
    }

    let mut columns = Vec::new();
    for table in &spec.tables {
        require_name("table", &table.name)?;
        for col in &table.selected_columns {
            require_name("column", col)?;
            columns.push(format!("{}.{}", table.name, col));
        }
    }
    if columns.is_empty() {
        return Err(IngestError::ValidationError("no columns selected".to_string()));
    }

    let mut query = format!("SELECT {} FROM {}", columns.join(", "), spec.tables[0].name);

    for table in &spec.tables[1..] {
        let condition = table
            .join_condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                IngestError::ValidationError(format!(
                    "join condition is required for table {}",
                    table.name
                ))
            })?;
        let join_type = match table.join_type.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => validate_join_type(t)?,
            _ => DEFAULT_JOIN_TYPE.to_string(),
        };
        query.push_str(&format!(" {} {} ON {}", join_type, table.name, condition));
    }

    if let Some(clause) = spec
        .where_clause
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        match policy {
            FilterPolicy::Trusted => {
                query.push_str(" WHERE ");
                query.push_str(clause);
            }
            FilterPolicy::Reject => {
                return Err(IngestError::ValidationError(
                    "filter clauses require a trusted filter policy".to_string(),
                ))
            }
        }
    }

    Ok(query)
}
