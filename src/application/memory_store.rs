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

//! In-memory `TabularStore` for application tests.

use crate::domain::entities::{Column, Row};
use crate::domain::errors::{IngestError, Result};
use crate::ports::store_port::{QueryRows, TabularStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryStore {
    /// Every SQL string seen by `query` and `execute`, in order.
    pub statements: Mutex<Vec<String>>,
    pub inserted: Mutex<Vec<Row>>,
    /// Canned result for every `query` call.
    pub result_columns: Vec<String>,
    pub result_rows: Vec<Row>,
    /// Bumped each time the result iterator yields a row.
    pub yielded: Arc<AtomicU64>,
    pub catalog: Vec<(String, Vec<Column>)>,
    /// Time `query` spends before the result set opens.
    pub query_delay: Duration,
    pub submit_delay: Duration,
    /// Zero-based index of the batch that gets rejected.
    pub reject_batch: Option<usize>,
    /// Fails `ping` like a server that cannot be reached.
    pub unreachable: bool,
    /// Batches seen by `submit_batch`, rejected ones included.
    pub batches: AtomicU64,
}

impl MemoryStore {
    pub fn with_result(columns: &[&str], rows: Vec<Row>) -> Self {
        Self {
            result_columns: columns.iter().map(|c| c.to_string()).collect(),
            result_rows: rows,
            ..Self::default()
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn inserted_count(&self) -> usize {
        self.inserted.lock().unwrap().len()
    }
}

impl TabularStore for MemoryStore {
    fn ping(&self) -> Result<()> {
        if self.unreachable {
            return Err(IngestError::ConnectionError("connection refused".to_string()));
        }
        Ok(())
    }

    fn list_tables(&self) -> Result<Vec<String>> {
        Ok(self.catalog.iter().map(|(name, _)| name.clone()).collect())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.catalog
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, cols)| cols.clone())
            .ok_or_else(|| IngestError::QueryError(format!("Table {} doesn't exist", table)))
    }

    fn query(&self, sql: &str) -> Result<QueryRows> {
        self.statements.lock().unwrap().push(sql.to_string());
        if !self.query_delay.is_zero() {
            std::thread::sleep(self.query_delay);
        }
        let counter = Arc::clone(&self.yielded);
        let rows = self.result_rows.clone().into_iter().map(move |row| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(row)
        });
        Ok(QueryRows {
            columns: self.result_columns.clone(),
            rows: Box::new(rows),
        })
    }

    fn execute(&self, sql: &str) -> Result<()> {
        self.statements.lock().unwrap().push(sql.to_string());
        Ok(())
    }

    fn submit_batch(&self, _insert_prefix: &str, rows: &[Row]) -> Result<()> {
        if !self.submit_delay.is_zero() {
            std::thread::sleep(self.submit_delay);
        }
        let n = self.batches.fetch_add(1, Ordering::SeqCst) as usize;
        if self.reject_batch == Some(n) {
            return Err(IngestError::QueryError("Code: 53. Type mismatch".to_string()));
        }
        self.inserted.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }
}
