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

//! # Domain Entities
//!
//! The "Nouns" of the ingestor: columns and their semantic types, the
//! dynamically-typed values that flow through a transfer, and the request,
//! progress and result records exchanged with callers.
//!
//! Rows travel positionally (`Row`) on the hot path. The name-keyed `Record`
//! is only used at preview boundaries and on the store-to-file leg, where the
//! writer projects it back into column order.

use crate::domain::errors::{self, IngestError};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Text layout used when a `DateTime` value is rendered for a file or the store.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The base of a `SemanticType`, without nullability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKind {
    String,
    Int64,
    Float64,
    Bool,
    DateTime,
}

impl TypeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeKind::String => "String",
            TypeKind::Int64 => "Int64",
            TypeKind::Float64 => "Float64",
            TypeKind::Bool => "Bool",
            TypeKind::DateTime => "DateTime",
        }
    }

    /// Maps a store type name onto the closed taxonomy.
    ///
    /// Integer widths collapse to `Int64`, floats and decimals to `Float64`,
    /// dates of any precision to `DateTime`. Anything unrecognised is `String`.
    fn from_store_name(name: &str) -> TypeKind {
        let base = name.split('(').next().unwrap_or("").trim();
        match base {
            "Int8" | "Int16" | "Int32" | "Int64" | "Int128" | "Int256" | "UInt8" | "UInt16"
            | "UInt32" | "UInt64" | "UInt128" | "UInt256" => TypeKind::Int64,
            "Float32" | "Float64" | "Decimal" | "Decimal32" | "Decimal64" | "Decimal128"
            | "Decimal256" => TypeKind::Float64,
            "Bool" | "Boolean" => TypeKind::Bool,
            "Date" | "Date32" | "DateTime" | "DateTime64" => TypeKind::DateTime,
            _ => TypeKind::String,
        }
    }
}

/// The inferred or declared type of a column: a base kind, optionally `Nullable(...)`.
///
/// String-encoded as the store spells it (`Int64`, `Nullable(Float64)`), which is
/// also how it appears in `CREATE TABLE` and in JSON requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemanticType {
    pub kind: TypeKind,
    pub nullable: bool,
}

impl SemanticType {
    pub const STRING: SemanticType = SemanticType::of(TypeKind::String);
    pub const INT64: SemanticType = SemanticType::of(TypeKind::Int64);
    pub const FLOAT64: SemanticType = SemanticType::of(TypeKind::Float64);
    pub const BOOL: SemanticType = SemanticType::of(TypeKind::Bool);
    pub const DATETIME: SemanticType = SemanticType::of(TypeKind::DateTime);

    /// Sentinel produced by classifying an empty value: "seen empty, otherwise unconstrained".
    pub const EMPTY_SENTINEL: SemanticType = SemanticType::nullable(TypeKind::String);

    pub const fn of(kind: TypeKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub const fn nullable(kind: TypeKind) -> Self {
        Self {
            kind,
            nullable: true,
        }
    }

    /// Wraps in `Nullable(...)`. Already-nullable types are unchanged.
    pub fn into_nullable(self) -> Self {
        Self::nullable(self.kind)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "Nullable({})", self.kind.as_str())
        } else {
            f.write_str(self.kind.as_str())
        }
    }
}

impl FromStr for SemanticType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty type name".to_string());
        }
        if let Some(inner) = unwrap_call(s, "Nullable") {
            let inner: SemanticType = inner.parse()?;
            return Ok(inner.into_nullable());
        }
        if let Some(inner) = unwrap_call(s, "LowCardinality") {
            return inner.parse();
        }
        Ok(SemanticType::of(TypeKind::from_store_name(s)))
    }
}

fn unwrap_call<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)
        .and_then(|rest| rest.strip_prefix('('))
        .and_then(|rest| rest.strip_suffix(')'))
}

impl TryFrom<String> for SemanticType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SemanticType> for String {
    fn from(t: SemanticType) -> Self {
        t.to_string()
    }
}

/// A named, typed column. Position within a column list is significant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: SemanticType,
}

impl Column {
    pub fn new(name: impl Into<String>, col_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            col_type,
        }
    }
}

pub fn column_names(columns: &[Column]) -> Vec<&str> {
    columns.iter().map(|c| c.name.as_str()).collect()
}

/// A single dynamically-typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Text(String),
}

/// Textual form written to flat files. `Null` renders as an empty field.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Bool(b) => write!(f, "{}", b),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Int64(i) => serializer.serialize_i64(*i),
            Value::Float64(v) if v.is_finite() => serializer.serialize_f64(*v),
            Value::Float64(_) => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::DateTime(dt) => {
                serializer.collect_str(&dt.format(DATETIME_FORMAT))
            }
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

/// Positional row, one value per column.
pub type Row = Vec<Value>;

/// Name-keyed row used at API and preview boundaries.
pub type Record = HashMap<String, Value>;

/// Kind tag for either end of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[serde(rename = "clickhouse")]
    ClickHouse,
    #[serde(rename = "flatfile")]
    FlatFile,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::ClickHouse => write!(f, "clickhouse"),
            SourceKind::FlatFile => write!(f, "flatfile"),
        }
    }
}

/// Path and delimiter of a flat file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatFileParams {
    pub file_path: String,
    #[serde(default)]
    pub delimiter: String,
}

impl FlatFileParams {
    pub fn new(file_path: impl Into<String>, delimiter: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            delimiter: delimiter.into(),
        }
    }

    /// First character of the delimiter string, `,` when empty.
    ///
    /// The flat-file codec works on single bytes, so the character must be ASCII.
    pub fn delimiter_byte(&self) -> errors::Result<u8> {
        match self.delimiter.chars().next() {
            None => Ok(b','),
            Some(c) if c.is_ascii() => Ok(c as u8),
            Some(c) => Err(IngestError::ValidationError(format!(
                "delimiter {:?} is not a single ASCII character",
                c
            ))),
        }
    }
}

/// Connection settings for the analytical store.
///
/// The credential is never logged: `Debug` redacts it.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Bearer token, used instead of the password when present.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub secure: bool,
}

fn default_http_port() -> u16 {
    8123
}

fn default_database() -> String {
    "default".to_string()
}

fn default_user() -> String {
    "default".to_string()
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            database: default_database(),
            user: default_user(),
            password: None,
            token: None,
            secure: false,
        }
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.host, self.port)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("secure", &self.secure)
            .finish()
    }
}

/// A validated transfer request as handed over by the request layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub source_type: SourceKind,
    pub target_type: SourceKind,
    pub table_name: String,
    pub flat_file_params: FlatFileParams,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Source descriptor for a preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    pub source_type: SourceKind,
    #[serde(default)]
    pub table_name: String,
    #[serde(default)]
    pub flat_file_params: Option<FlatFileParams>,
    #[serde(default)]
    pub columns: Vec<Column>,
}

/// One table in a join. The first (driving) table has no join type or condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTable {
    pub name: String,
    #[serde(default)]
    pub join_type: Option<String>,
    #[serde(default)]
    pub join_condition: Option<String>,
    #[serde(default)]
    pub selected_columns: Vec<String>,
}

impl JoinTable {
    pub fn driving(name: &str, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            join_type: None,
            join_condition: None,
            selected_columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn joined(name: &str, condition: &str, columns: &[&str]) -> Self {
        Self {
            join_condition: Some(condition.to_string()),
            ..Self::driving(name, columns)
        }
    }

    pub fn with_join_type(mut self, join_type: &str) -> Self {
        self.join_type = Some(join_type.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSpec {
    pub tables: Vec<JoinTable>,
    #[serde(default)]
    pub where_clause: Option<String>,
}

/// Status of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Success,
    Error,
    Cancelled,
}

/// An incremental status event. Serialized flat as `{status, message, count, completed}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub status: ProgressStatus,
    pub message: String,
    pub count: u64,
    pub completed: bool,
}

impl ProgressUpdate {
    pub fn processing(message: String, count: u64) -> Self {
        Self {
            status: ProgressStatus::Processing,
            message,
            count,
            completed: false,
        }
    }

    pub fn success(count: u64) -> Self {
        Self {
            status: ProgressStatus::Success,
            message: "Ingestion completed successfully".to_string(),
            count,
            completed: true,
        }
    }

    pub fn error(message: String, count: u64) -> Self {
        Self {
            status: ProgressStatus::Error,
            message,
            count,
            completed: true,
        }
    }

    pub fn cancelled(count: u64) -> Self {
        Self {
            status: ProgressStatus::Cancelled,
            message: "Transfer cancelled".to_string(),
            count,
            completed: true,
        }
    }

    /// JSON payload for one server-push event.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","message":"Failed to marshal progress update"}"#.to_string()
        })
    }
}

/// Returned once a transfer fully drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    pub total_records: u64,
}
