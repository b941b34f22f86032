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

//! Core error definitions for the ingestor.
//!
//! This module provides a centralized `IngestError` enum and a `Result` type
//! used by every layer. Only `RowError` is recoverable: it is logged and the
//! offending row is skipped. Everything else ends the affected side of a
//! transfer and is surfaced once, in the terminal progress event.

use thiserror::Error;

/// Error types encountered while moving data between the store and flat files.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Store unreachable or authentication rejected.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Malformed join/query/request parameters, caught before any I/O.
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(String),

    /// A single row could not be parsed or decoded.
    #[error("Row {row} skipped: {reason}")]
    RowError { row: u64, reason: String },

    /// The store rejected a query or its result stream broke mid-read.
    #[error("Query failed: {0}")]
    QueryError(String),

    /// The sink rejected a batch. `inserted` rows were committed before it.
    #[error("Batch insert failed after {inserted} rows: {reason}")]
    BatchSubmitError { inserted: u64, reason: String },

    #[error("Transfer cancelled after {records} rows")]
    Cancelled { records: u64 },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl IngestError {
    /// Row-level failures are swallowed locally; all others are fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IngestError::RowError { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, IngestError::Cancelled { .. })
    }
}

impl From<csv::Error> for IngestError {
    fn from(e: csv::Error) -> Self {
        if e.is_io_error() {
            match e.into_kind() {
                csv::ErrorKind::Io(io) => IngestError::IoError(io),
                other => IngestError::CsvError(format!("{:?}", other)),
            }
        } else {
            IngestError::CsvError(e.to_string())
        }
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            IngestError::ConnectionError(e.to_string())
        } else {
            IngestError::QueryError(e.to_string())
        }
    }
}

/// A specialized Result type for the ingestor.
pub type Result<T> = std::result::Result<T, IngestError>;
