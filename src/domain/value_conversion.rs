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

//! Text to `Value` conversion driven by a column's `SemanticType`.

use crate::domain::entities::{SemanticType, TypeKind, Value};
use crate::domain::type_inference::parse_datetime;
use chrono::NaiveDateTime;

/// What happens when a field does not parse as its column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionMode {
    /// The field is rejected and the caller skips the row.
    #[default]
    Strict,
    /// The field degrades to the type's zero value.
    Lossy,
}

impl ConversionMode {
    pub fn from_lossy(lossy: bool) -> Self {
        if lossy {
            ConversionMode::Lossy
        } else {
            ConversionMode::Strict
        }
    }
}

/// Zero value for lossy fallback. `DateTime` falls back to the Unix epoch.
pub fn zero_value(kind: TypeKind) -> Value {
    match kind {
        TypeKind::String => Value::Text(String::new()),
        TypeKind::Int64 => Value::Int64(0),
        TypeKind::Float64 => Value::Float64(0.0),
        TypeKind::Bool => Value::Bool(false),
        TypeKind::DateTime => Value::DateTime(epoch()),
    }
}

fn epoch() -> NaiveDateTime {
    // 1970-01-01 00:00:00
    NaiveDateTime::default()
}

/// Accepts the spellings `1 t T TRUE true True` and their false counterparts.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn parse_kind(raw: &str, kind: TypeKind) -> Option<Value> {
    match kind {
        TypeKind::String => Some(Value::Text(raw.to_string())),
        TypeKind::Int64 => raw.parse::<i64>().ok().map(Value::Int64),
        TypeKind::Float64 => raw.parse::<f64>().ok().map(Value::Float64),
        TypeKind::Bool => parse_bool(raw).map(Value::Bool),
        TypeKind::DateTime => parse_datetime(raw).map(Value::DateTime),
    }
}

/// Converts one raw field.
///
/// `Nullable(T)` yields `Null` for an empty field and otherwise converts as `T`.
/// Text is taken verbatim; other kinds ignore leading whitespace.
/// The error is a human-readable reason, wrapped into a `RowError` by the caller.
pub fn convert(raw: &str, col_type: SemanticType, mode: ConversionMode) -> Result<Value, String> {
    let raw = match col_type.kind {
        TypeKind::String => raw,
        _ => raw.trim_start(),
    };
    if col_type.nullable && raw.is_empty() {
        return Ok(Value::Null);
    }
    match parse_kind(raw, col_type.kind) {
        Some(v) => Ok(v),
        None => match mode {
            ConversionMode::Lossy => Ok(zero_value(col_type.kind)),
            ConversionMode::Strict => Err(format!(
                "cannot convert {:?} to {}",
                raw,
                col_type.kind.as_str()
            )),
        },
    }
}
