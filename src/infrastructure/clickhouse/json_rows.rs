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

//! Decoding of `JSONCompactEachRowWithNamesAndTypes` result streams.
//!
//! The first line holds column names, the second the store's type names,
//! every following line one row as a JSON array. Values are decoded guided
//! by the declared type, so 64-bit integers quoted as strings still come
//! back as `Int64`.

use crate::domain::entities::{Row, SemanticType, TypeKind, Value};
use crate::domain::errors::{IngestError, Result};
use crate::domain::type_inference::parse_datetime;
use chrono::NaiveDateTime;
use serde_json::Value as Json;
use std::io::{BufRead, Lines};

/// Reads the two header lines and returns `(names, types)`.
pub fn read_header<R: BufRead>(lines: &mut Lines<R>) -> Result<(Vec<String>, Vec<SemanticType>)> {
    let names: Vec<String> = parse_header_line(lines.next(), "column names")?;
    let type_names: Vec<String> = parse_header_line(lines.next(), "column types")?;
    if names.len() != type_names.len() {
        return Err(IngestError::QueryError(format!(
            "result header has {} names but {} types",
            names.len(),
            type_names.len()
        )));
    }
    let types = type_names
        .iter()
        .map(|t| t.parse().unwrap_or(SemanticType::STRING))
        .collect();
    Ok((names, types))
}

fn parse_header_line(line: Option<std::io::Result<String>>, what: &str) -> Result<Vec<String>> {
    match line {
        Some(Ok(l)) => serde_json::from_str(&l).map_err(|_| {
            IngestError::QueryError(format!("malformed {} line: {}", what, l.trim()))
        }),
        Some(Err(e)) => Err(IngestError::IoError(e)),
        // An empty body means a statement with no result set.
        None => Ok(Vec::new()),
    }
}

/// Decodes one data line into a positional row.
pub fn decode_row(line: &str, types: &[SemanticType]) -> Result<Row> {
    let cells: Vec<Json> = serde_json::from_str(line).map_err(|_| {
        // The server reports mid-stream failures as plain text in the body.
        IngestError::QueryError(line.trim().to_string())
    })?;
    if cells.len() != types.len() {
        return Err(IngestError::QueryError(format!(
            "row has {} values, expected {}",
            cells.len(),
            types.len()
        )));
    }
    Ok(cells
        .into_iter()
        .zip(types)
        .map(|(cell, t)| decode_value(cell, *t))
        .collect())
}

fn parse_store_datetime(s: &str) -> Option<NaiveDateTime> {
    parse_datetime(s).or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
}

/// Decodes a single JSON cell. Anything that does not fit its declared
/// type is kept as text rather than dropped.
pub fn decode_value(cell: Json, col_type: SemanticType) -> Value {
    match (cell, col_type.kind) {
        (Json::Null, _) => Value::Null,
        (Json::Number(n), TypeKind::Int64) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => Value::Text(n.to_string()),
        },
        (Json::String(s), TypeKind::Int64) => match s.parse::<i64>() {
            Ok(i) => Value::Int64(i),
            Err(_) => Value::Text(s),
        },
        (Json::Number(n), TypeKind::Float64) => match n.as_f64() {
            Some(f) => Value::Float64(f),
            None => Value::Text(n.to_string()),
        },
        (Json::String(s), TypeKind::Float64) => match s.parse::<f64>() {
            Ok(f) => Value::Float64(f),
            Err(_) => Value::Text(s),
        },
        (Json::Bool(b), _) => Value::Bool(b),
        (Json::Number(n), TypeKind::Bool) => Value::Bool(n.as_i64().unwrap_or(0) != 0),
        (Json::String(s), TypeKind::DateTime) => match parse_store_datetime(&s) {
            Some(dt) => Value::DateTime(dt),
            None => Value::Text(s),
        },
        (Json::String(s), _) => Value::Text(s),
        (Json::Number(n), _) => match n.as_i64() {
            Some(i) => Value::Int64(i),
            None => n.as_f64().map(Value::Float64).unwrap_or(Value::Null),
        },
        (other, _) => Value::Text(other.to_string()),
    }
}
