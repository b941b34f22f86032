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

//! # ClickHouse Store Adapter
//!
//! Implements `TabularStore` over the ClickHouse HTTP interface. Every call
//! checks a connection out of the shared r2d2 pool, so the adapter can be
//! cloned into as many transfers as needed.
//!
//! Result sets are requested as `JSONCompactEachRowWithNamesAndTypes` and
//! decoded line by line straight off the response body; a query never holds
//! more than one row in memory.

use crate::domain::entities::{Column, Row, SemanticType, Value};
use crate::domain::errors::{IngestError, Result};
use crate::domain::query_builder::{build_describe, build_insert_batch};
use crate::infrastructure::clickhouse::connection_manager::ClickHouseConnectionManager;
use crate::infrastructure::clickhouse::json_rows::{decode_row, read_header};
use crate::ports::store_port::{QueryRows, TabularStore};
use log::{debug, warn};
use r2d2::{Pool, PooledConnection};
use reqwest::blocking::Response;
use std::io::{BufRead, BufReader, Lines};
use std::sync::Arc;
use std::time::Duration;

const SQL_LIST_TABLES: &str = "SHOW TABLES";
const RESULT_FORMAT: &str = "FORMAT JSONCompactEachRowWithNamesAndTypes";

type PooledClickHouse = PooledConnection<ClickHouseConnectionManager>;

#[derive(Clone)]
pub struct ClickHouseStoreAdapter {
    pool: Arc<Pool<ClickHouseConnectionManager>>,
}

impl ClickHouseStoreAdapter {
    pub fn new(pool: Arc<Pool<ClickHouseConnectionManager>>) -> Self {
        Self { pool }
    }

    fn get_conn(&self) -> Result<PooledClickHouse> {
        self.pool
            .get()
            .map_err(|e| IngestError::ConnectionError(e.to_string()))
    }

    /// Collects a small result set fully, e.g. catalog lookups.
    fn query_all(&self, sql: &str) -> Result<Vec<Row>> {
        self.query(sql)?.rows.collect()
    }
}

fn with_format(sql: &str) -> String {
    let trimmed = sql.trim().trim_end_matches(';');
    format!("{} {}", trimmed, RESULT_FORMAT)
}

/// Streams rows off a live response. Holds the pooled connection until the
/// iterator is dropped, so the pool's concurrency bound covers open streams.
struct JsonRowStream {
    lines: Lines<BufReader<Response>>,
    types: Vec<SemanticType>,
    row: u64,
    done: bool,
    _conn: PooledClickHouse,
}

impl Iterator for JsonRowStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(IngestError::QueryError(format!(
                        "result stream broke after {} rows: {}",
                        self.row, e
                    ))));
                }
                Some(Ok(line)) => line,
            };
            if line.trim().is_empty() {
                continue;
            }
            self.row += 1;
            let decoded = decode_row(&line, &self.types);
            if decoded.is_err() {
                self.done = true;
            }
            return Some(decoded);
        }
    }
}

fn open_stream(conn: PooledClickHouse, sql: &str, timeout: Option<Duration>) -> Result<QueryRows> {
    let body = with_format(sql);
    let response = match timeout {
        Some(t) => conn.post_within(body, t)?,
        None => conn.post(body)?,
    };
    let mut lines = BufReader::new(response).lines();
    let (columns, types) = read_header(&mut lines)?;
    debug!("Streaming {} columns: {:?}", columns.len(), columns);
    Ok(QueryRows {
        columns,
        rows: Box::new(JsonRowStream {
            lines,
            types,
            row: 0,
            done: false,
            _conn: conn,
        }),
    })
}

fn text_at(row: &Row, idx: usize) -> Option<&str> {
    match row.get(idx) {
        Some(Value::Text(s)) => Some(s.as_str()),
        _ => None,
    }
}

impl TabularStore for ClickHouseStoreAdapter {
    fn ping(&self) -> Result<()> {
        self.get_conn()?.ping()
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        let rows = self.query_all(SQL_LIST_TABLES)?;
        Ok(rows
            .iter()
            .filter_map(|r| text_at(r, 0).map(str::to_string))
            .collect())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<Column>> {
        let rows = self.query_all(&build_describe(table)?)?;
        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let (Some(name), Some(type_name)) = (text_at(row, 0), text_at(row, 1)) else {
                warn!("Skipping malformed DESCRIBE row for {}", table);
                continue;
            };
            let col_type = type_name.parse().unwrap_or(SemanticType::STRING);
            columns.push(Column::new(name, col_type));
        }
        Ok(columns)
    }

    fn query(&self, sql: &str) -> Result<QueryRows> {
        let conn = self.get_conn()?;
        open_stream(conn, sql, None)
    }

    fn query_within(&self, sql: &str, timeout: Duration) -> Result<QueryRows> {
        let conn = self.get_conn()?;
        open_stream(conn, sql, Some(timeout))
    }

    fn execute(&self, sql: &str) -> Result<()> {
        self.get_conn()?.execute(sql.to_string())
    }

    fn submit_batch(&self, insert_prefix: &str, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let sql = build_insert_batch(insert_prefix, rows);
        debug!("Submitting batch of {} rows ({} bytes)", rows.len(), sql.len());
        self.get_conn()?.execute(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_format_strips_trailing_semicolon() {
        assert_eq!(
            with_format("SELECT a FROM t; "),
            "SELECT a FROM t FORMAT JSONCompactEachRowWithNamesAndTypes"
        );
    }

    #[test]
    fn test_text_at() {
        let row = vec![Value::Text("events".into()), Value::Int64(1)];
        assert_eq!(text_at(&row, 0), Some("events"));
        assert_eq!(text_at(&row, 1), None);
        assert_eq!(text_at(&row, 2), None);
    }
}
