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

//! # Store Port
//!
//! The contract for the analytical store. The pipeline never talks to a
//! driver directly; it holds an `Arc<dyn TabularStore>` and works through
//! this trait, which is what lets tests swap in an in-memory store.
//!
//! Adapters implement the handful of primitive operations. Batching,
//! progress and cancellation for inserts are layered on top as a provided
//! method, so every adapter gets identical partial-success semantics.

use crate::domain::cancellation::CancelToken;
use crate::domain::entities::{Column, Row};
use crate::domain::errors::{IngestError, Result};
use crate::domain::progress::ProgressReporter;
use crate::domain::query_builder::{build_create_table, build_insert_prefix};
use crossbeam_channel::Receiver;
use log::{debug, error};
use std::time::Duration;

/// A lazily materialised result set.
///
/// Column names are resolved once, before the first row. The iterator ends at
/// the first `Err`; anything after it is never produced.
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Box<dyn Iterator<Item = Result<Row>> + Send>,
}

impl std::fmt::Debug for QueryRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRows")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// `TabularStore` must be `Send + Sync`: one handle is shared by every
/// concurrent transfer and by both threads of a single transfer.
pub trait TabularStore: Send + Sync {
    /// Cheap liveness probe (`SELECT 1`).
    fn ping(&self) -> Result<()>;

    /// Tables in the connected database.
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Column names and types of `table`, mapped onto the semantic taxonomy.
    fn table_columns(&self, table: &str) -> Result<Vec<Column>>;

    /// Runs a read query and streams its rows.
    fn query(&self, sql: &str) -> Result<QueryRows>;

    /// Like `query`, for interactive reads that must finish within `timeout`.
    /// Adapters that can bound the statement server-side override this.
    fn query_within(&self, sql: &str, _timeout: Duration) -> Result<QueryRows> {
        self.query(sql)
    }

    /// Runs a statement with no result set.
    fn execute(&self, sql: &str) -> Result<()>;

    /// Submits one multi-row insert. `insert_prefix` is `INSERT INTO t (cols)`.
    fn submit_batch(&self, insert_prefix: &str, rows: &[Row]) -> Result<()>;

    /// Ensures `table` exists with `columns`. Safe to call repeatedly.
    fn create_table(&self, table: &str, columns: &[Column]) -> Result<()> {
        let sql = build_create_table(table, columns)?;
        self.execute(&sql)
    }

    /// Drains `rows` into `table` in batches of `batch_size`.
    ///
    /// A trailing partial batch is submitted once the channel closes. On a
    /// rejected batch the call fails with `BatchSubmitError` carrying the count
    /// committed before it; earlier batches stay in the store. On cancellation
    /// any unsent accumulated rows are dropped and `Cancelled` carries the
    /// committed count.
    fn insert_batched(
        &self,
        table: &str,
        columns: &[Column],
        rows: &Receiver<Row>,
        batch_size: usize,
        progress: &mut ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let prefix = build_insert_prefix(table, columns)?;
        let batch_size = batch_size.max(1);
        let mut batch: Vec<Row> = Vec::with_capacity(batch_size);
        let mut inserted: u64 = 0;

        loop {
            match cancel.recv(rows) {
                Ok(Some(row)) => {
                    batch.push(row);
                    if batch.len() >= batch_size {
                        inserted = submit(self, &prefix, &mut batch, inserted)?;
                        progress
                            .advance(inserted, cancel)
                            .map_err(|_| IngestError::Cancelled { records: inserted })?;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    debug!(
                        "Insert into {} cancelled with {} rows pending",
                        table,
                        batch.len()
                    );
                    return Err(IngestError::Cancelled { records: inserted });
                }
            }
        }

        if !batch.is_empty() {
            if cancel.is_cancelled() {
                debug!(
                    "Insert into {} cancelled before its last {} rows",
                    table,
                    batch.len()
                );
                return Err(IngestError::Cancelled { records: inserted });
            }
            inserted = submit(self, &prefix, &mut batch, inserted)?;
            progress
                .advance(inserted, cancel)
                .map_err(|_| IngestError::Cancelled { records: inserted })?;
        }
        Ok(inserted)
    }
}

fn submit<S: TabularStore + ?Sized>(
    store: &S,
    prefix: &str,
    batch: &mut Vec<Row>,
    inserted: u64,
) -> Result<u64> {
    if let Err(e) = store.submit_batch(prefix, batch) {
        error!("Batch of {} rows rejected: {}", batch.len(), e);
        return Err(IngestError::BatchSubmitError {
            inserted,
            reason: e.to_string(),
        });
    }
    let total = inserted + batch.len() as u64;
    batch.clear();
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{ProgressUpdate, SemanticType, Value};
    use std::sync::Mutex;

    /// Records submitted batch sizes; rejects the batch at `fail_at` if set.
    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<usize>>,
        fail_at: Option<usize>,
    }

    impl TabularStore for RecordingStore {
        fn ping(&self) -> Result<()> {
            Ok(())
        }
        fn list_tables(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn table_columns(&self, _table: &str) -> Result<Vec<Column>> {
            Ok(vec![])
        }
        fn query(&self, _sql: &str) -> Result<QueryRows> {
            Err(IngestError::QueryError("not supported".into()))
        }
        fn execute(&self, _sql: &str) -> Result<()> {
            Ok(())
        }
        fn submit_batch(&self, prefix: &str, rows: &[Row]) -> Result<()> {
            assert_eq!(prefix, "INSERT INTO t (id)");
            let mut batches = self.batches.lock().unwrap();
            if Some(batches.len()) == self.fail_at {
                return Err(IngestError::QueryError("too many parts".into()));
            }
            batches.push(rows.len());
            Ok(())
        }
    }

    fn feed(n: usize) -> Receiver<Row> {
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..n {
            tx.send(vec![Value::Int64(i as i64)]).unwrap();
        }
        rx
    }

    fn columns() -> Vec<Column> {
        vec![Column::new("id", SemanticType::INT64)]
    }

    fn drain(rx: &Receiver<ProgressUpdate>) -> Vec<u64> {
        rx.try_iter().map(|u| u.count).collect()
    }

    #[test]
    fn test_batches_and_trailing_remainder() {
        let store = RecordingStore::default();
        let (ptx, prx) = crossbeam_channel::unbounded();
        let mut progress = ProgressReporter::new(ptx, 5, "Inserted");
        let rows = feed(23);

        let n = store
            .insert_batched("t", &columns(), &rows, 10, &mut progress, &CancelToken::new())
            .unwrap();

        assert_eq!(n, 23);
        assert_eq!(*store.batches.lock().unwrap(), vec![10, 10, 3]);
        assert_eq!(drain(&prx), vec![10, 20]);
    }

    #[test]
    fn test_failed_batch_reports_prior_count() {
        let store = RecordingStore {
            fail_at: Some(2),
            ..Default::default()
        };
        let (ptx, _prx) = crossbeam_channel::unbounded();
        let mut progress = ProgressReporter::new(ptx, 5000, "Inserted");
        let rows = feed(35);

        let err = store
            .insert_batched("t", &columns(), &rows, 10, &mut progress, &CancelToken::new())
            .unwrap_err();

        match err {
            IngestError::BatchSubmitError { inserted, .. } => assert_eq!(inserted, 20),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_cancel_drops_pending_rows() {
        let store = RecordingStore::default();
        let (ptx, _prx) = crossbeam_channel::unbounded();
        let mut progress = ProgressReporter::new(ptx, 5000, "Inserted");
        let (tx, rx) = crossbeam_channel::unbounded();
        for i in 0..15 {
            tx.send(vec![Value::Int64(i)]).unwrap();
        }
        let cancel = CancelToken::new();
        let worker = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                store
                    .insert_batched("t", &columns(), &rx, 10, &mut progress, &cancel)
                    .map(|_| store)
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        cancel.cancel();
        drop(tx);

        match worker.join().unwrap() {
            Err(IngestError::Cancelled { records }) => assert_eq!(records, 10),
            other => panic!("unexpected outcome: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_closed_channel_after_cancel_submits_nothing_more() {
        let store = RecordingStore::default();
        let (ptx, _prx) = crossbeam_channel::unbounded();
        let mut progress = ProgressReporter::new(ptx, 5000, "Inserted");
        let rows = feed(5);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = store
            .insert_batched("t", &columns(), &rows, 10, &mut progress, &cancel)
            .unwrap_err();

        assert!(matches!(err, IngestError::Cancelled { records: 0 }));
        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[test]
    fn test_create_table_is_idempotent_sql() {
        struct Capture(Mutex<Vec<String>>);
        impl TabularStore for Capture {
            fn ping(&self) -> Result<()> {
                Ok(())
            }
            fn list_tables(&self) -> Result<Vec<String>> {
                Ok(vec![])
            }
            fn table_columns(&self, _t: &str) -> Result<Vec<Column>> {
                Ok(vec![])
            }
            fn query(&self, _sql: &str) -> Result<QueryRows> {
                Err(IngestError::QueryError("n/a".into()))
            }
            fn execute(&self, sql: &str) -> Result<()> {
                self.0.lock().unwrap().push(sql.to_string());
                Ok(())
            }
            fn submit_batch(&self, _p: &str, _r: &[Row]) -> Result<()> {
                Ok(())
            }
        }
        let store = Capture(Mutex::new(vec![]));
        store.create_table("t", &columns()).unwrap();
        store.create_table("t", &columns()).unwrap();
        let sql = store.0.lock().unwrap();
        assert_eq!(sql.len(), 2);
        assert!(sql[0].starts_with("CREATE TABLE IF NOT EXISTS t (id Int64)"));
        assert_eq!(sql[0], sql[1]);
    }
}
