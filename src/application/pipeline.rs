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

//! # Transfer Pipeline
//!
//! One transfer is a producer thread and a consumer (the calling thread)
//! joined by a bounded crossbeam channel:
//!
//! - **Store to file**: the producer runs the query and pushes name-keyed
//!   records; the consumer writes them with `write_stream`.
//! - **File to store**: the table is created first, then the producer streams
//!   positional rows out of the file and the consumer batches them into the
//!   store with `insert_batched`.
//!
//! A full channel blocks the producer, so memory stays bounded by the channel
//! capacity. Every channel operation goes through the `CancelToken`, so both
//! sides leave within one iteration of a cancel. When the consumer stops
//! early it drops its receiver, which ends the producer as well. A producer
//! stuck in a blocking store call is not waited for once the token fires.
//!
//! The consumer emits `processing` events. Producers never hold the progress
//! sender, so an abandoned producer cannot keep the stream open. Once both
//! sides have settled the pipeline sends exactly one terminal event and drops
//! its progress sender, which closes the caller's progress stream.

use crate::application::worker::Worker;
use crate::config::TransferConfig;
use crate::domain::cancellation::{CancelToken, ChannelError};
use crate::domain::entities::{
    Column, FlatFileParams, ProgressUpdate, Record, Row, TransferResult,
};
use crate::domain::errors::{IngestError, Result};
use crate::domain::progress::ProgressReporter;
use crate::domain::query_builder::build_select;
use crate::infrastructure::flat_file::reader::{stream_rows, FlatFileReader};
use crate::infrastructure::flat_file::writer::{write_stream, FlatFileWriter};
use crate::ports::store_port::TabularStore;
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// How a transfer ended, before it is reported.
#[derive(Debug)]
struct Settled {
    committed: u64,
    error: Option<IngestError>,
}

impl Settled {
    fn failed(error: IngestError, committed: u64) -> Self {
        Self {
            committed,
            error: Some(error),
        }
    }
}

pub struct TransferPipeline {
    store: Arc<dyn TabularStore>,
    config: TransferConfig,
}

impl TransferPipeline {
    pub fn new(store: Arc<dyn TabularStore>, config: TransferConfig) -> Self {
        Self { store, config }
    }

    fn data_channel<T>(&self) -> (Sender<T>, Receiver<T>) {
        bounded(self.config.channel_capacity.max(1))
    }

    fn reporter(&self, progress: &Sender<ProgressUpdate>, verb: &'static str) -> ProgressReporter {
        ProgressReporter::new(progress.clone(), self.config.progress_report_size, verb)
    }

    /// Copies the result of `query` (or `SELECT columns FROM table`) into a flat file.
    ///
    /// `progress` is consumed: it carries `processing` events, then one
    /// terminal event, then closes.
    pub fn store_to_file(
        &self,
        table: &str,
        columns: &[Column],
        file: &FlatFileParams,
        query: Option<&str>,
        progress: Sender<ProgressUpdate>,
        cancel: &CancelToken,
    ) -> Result<TransferResult> {
        info!("Exporting {} to {}", table, file.file_path);
        let outcome = self.run_store_to_file(table, columns, file, query, &progress, cancel);
        settle(outcome, progress, table)
    }

    /// Loads a flat file into `table`, creating the table when it is missing.
    pub fn file_to_store(
        &self,
        file: &FlatFileParams,
        table: &str,
        columns: &[Column],
        progress: Sender<ProgressUpdate>,
        cancel: &CancelToken,
    ) -> Result<TransferResult> {
        info!("Importing {} into {}", file.file_path, table);
        let outcome = self.run_file_to_store(file, table, columns, &progress, cancel);
        settle(outcome, progress, table)
    }

    fn run_store_to_file(
        &self,
        table: &str,
        columns: &[Column],
        file: &FlatFileParams,
        query: Option<&str>,
        progress: &Sender<ProgressUpdate>,
        cancel: &CancelToken,
    ) -> Result<Settled> {
        let sql = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => q.to_string(),
            None => build_select(table, columns)?,
        };
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled { records: 0 });
        }
        let writer = FlatFileWriter::create(file, columns, self.config.flush_every)?;
        debug!("Export query: {}", sql);

        let (tx, rx) = self.data_channel::<Record>();
        let store = Arc::clone(&self.store);
        let fetch_cancel = cancel.clone();
        let producer = Worker::spawn(format!("fetch-{}", table), move || {
            produce_records(store.as_ref(), &sql, tx, &fetch_cancel)
        })?;

        let mut write_progress = self.reporter(progress, "Written");
        let consumed = write_stream(writer, &rx, &mut write_progress, cancel);
        drop(rx);
        let produced = producer.wait(cancel);
        Ok(combine(consumed, produced, write_progress.last_reported()))
    }

    fn run_file_to_store(
        &self,
        file: &FlatFileParams,
        table: &str,
        columns: &[Column],
        progress: &Sender<ProgressUpdate>,
        cancel: &CancelToken,
    ) -> Result<Settled> {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled { records: 0 });
        }
        file.delimiter_byte()?;
        self.store.create_table(table, columns)?;
        let rows = FlatFileReader::open(file)?.into_rows(columns, self.config.conversion_mode());

        let (tx, rx) = self.data_channel::<Row>();
        let read_cancel = cancel.clone();
        let producer = Worker::spawn(format!("read-{}", table), move || {
            stream_rows(rows, &tx, &read_cancel)
        })?;

        let mut insert_progress = self.reporter(progress, "Inserted");
        let consumed = self.store.insert_batched(
            table,
            columns,
            &rx,
            self.config.batch_size,
            &mut insert_progress,
            cancel,
        );
        drop(rx);
        let produced = producer.wait(cancel);
        Ok(combine(consumed, produced, insert_progress.last_reported()))
    }
}

/// Producer side of a store-to-file transfer.
fn produce_records(
    store: &dyn TabularStore,
    sql: &str,
    tx: Sender<Record>,
    cancel: &CancelToken,
) -> Result<u64> {
    let result = store.query(sql)?;
    let names = result.columns;
    let mut fetched = 0u64;
    for row in result.rows {
        let record: Record = names.iter().cloned().zip(row?).collect();
        match cancel.send(&tx, record) {
            Ok(()) => fetched += 1,
            Err(ChannelError::Cancelled) => return Err(IngestError::Cancelled { records: fetched }),
            Err(ChannelError::Disconnected) => {
                debug!("Writer stopped after {} fetched rows", fetched);
                break;
            }
        }
    }
    debug!("Fetched {} rows", fetched);
    Ok(fetched)
}

/// Rows the consumer had committed when it failed with `error`.
fn committed_at(error: &IngestError, fallback: u64) -> u64 {
    match error {
        IngestError::BatchSubmitError { inserted, .. } => *inserted,
        IngestError::Cancelled { records } => *records,
        _ => fallback,
    }
}

/// Folds both sides into one outcome. Cancellation on either side wins,
/// then the consumer's failure, then the producer's.
fn combine(consumed: Result<u64>, produced: Result<u64>, fallback: u64) -> Settled {
    let committed = match &consumed {
        Ok(n) => *n,
        Err(e) => committed_at(e, fallback),
    };
    let cancelled = matches!(&consumed, Err(e) if e.is_cancelled())
        || matches!(&produced, Err(e) if e.is_cancelled());
    if cancelled {
        return Settled::failed(IngestError::Cancelled { records: committed }, committed);
    }
    match (consumed, produced) {
        (Err(e), _) => Settled::failed(e, committed),
        (Ok(_), Err(e)) => Settled::failed(e, committed),
        (Ok(n), Ok(_)) => Settled {
            committed: n,
            error: None,
        },
    }
}

/// Sends the single terminal event and closes the progress stream.
fn settle(
    outcome: Result<Settled>,
    progress: Sender<ProgressUpdate>,
    table: &str,
) -> Result<TransferResult> {
    let Settled { committed, error } = outcome.unwrap_or_else(|e| {
        let committed = committed_at(&e, 0);
        Settled::failed(e, committed)
    });

    let (update, result) = match error {
        None => {
            info!("Transfer of {} finished: {} rows", table, committed);
            (
                ProgressUpdate::success(committed),
                Ok(TransferResult {
                    total_records: committed,
                }),
            )
        }
        Some(e) if e.is_cancelled() => {
            warn!("Transfer of {} cancelled after {} rows", table, committed);
            (
                ProgressUpdate::cancelled(committed),
                Err(IngestError::Cancelled { records: committed }),
            )
        }
        Some(e) => {
            error!("Transfer of {} failed after {} rows: {}", table, committed, e);
            (ProgressUpdate::error(e.to_string(), committed), Err(e))
        }
    };

    if progress.send(update).is_err() {
        debug!("Progress listener left before the terminal event");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::memory_store::MemoryStore;
    use crate::domain::entities::{ProgressStatus, SemanticType, Value};
    use crate::infrastructure::flat_file::discovery::discover_schema;
    use std::fs;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn config() -> TransferConfig {
        TransferConfig {
            batch_size: 4,
            progress_report_size: 4,
            channel_capacity: 3,
            ..TransferConfig::default()
        }
    }

    fn int_rows(n: i64) -> Vec<Row> {
        (0..n)
            .map(|i| vec![Value::Int64(i), Value::Text(format!("r{}", i))])
            .collect()
    }

    fn ab_columns() -> Vec<Column> {
        vec![
            Column::new("a", SemanticType::INT64),
            Column::new("b", SemanticType::STRING),
        ]
    }

    fn terminal_events(events: &[ProgressUpdate]) -> Vec<&ProgressUpdate> {
        events.iter().filter(|u| u.completed).collect()
    }

    #[test]
    fn test_file_to_store_infers_and_loads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        fs::write(
            &path,
            "id,name,value\n1,a,10\n2,b,2.5\n3,c,7\n4,d,8\n5,e,1.25\n\
             6,f,3\n7,g,4\n8,h,9.75\n9,i,6\n10,j,5\n",
        )
        .unwrap();
        let params = FlatFileParams::new(path.to_string_lossy(), ",");
        let cancel = CancelToken::new();

        let columns = discover_schema(&params, 100, &cancel).unwrap();
        assert_eq!(columns[2], Column::new("value", SemanticType::FLOAT64));

        let store = Arc::new(MemoryStore::default());
        let pipeline = TransferPipeline::new(store.clone(), config());
        let (tx, rx) = bounded(64);
        let result = pipeline
            .file_to_store(&params, "scores", &columns, tx, &cancel)
            .unwrap();

        assert_eq!(result, TransferResult { total_records: 10 });
        assert_eq!(store.inserted_count(), 10);
        assert_eq!(
            store.statements()[0],
            "CREATE TABLE IF NOT EXISTS scores (id Int64, name String, value Float64) \
             ENGINE = MergeTree() ORDER BY tuple()"
        );

        let events: Vec<ProgressUpdate> = rx.iter().collect();
        let counts: Vec<u64> = events.iter().map(|u| u.count).collect();
        assert_eq!(counts, vec![4, 8, 10]);
        assert_eq!(terminal_events(&events).len(), 1);
        assert_eq!(events.last().unwrap().status, ProgressStatus::Success);
    }

    #[test]
    fn test_store_to_file_builds_select_when_no_query() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("t.csv");
        let params = FlatFileParams::new(out.to_string_lossy(), ",");
        let store = Arc::new(MemoryStore::with_result(&["a", "b"], int_rows(3)));
        let pipeline = TransferPipeline::new(store.clone(), config());
        let (tx, rx) = bounded(64);

        let result = pipeline
            .store_to_file("t", &ab_columns(), &params, None, tx, &CancelToken::new())
            .unwrap();

        assert_eq!(result.total_records, 3);
        assert_eq!(store.statements(), vec!["SELECT a, b FROM t".to_string()]);
        assert_eq!(fs::read_to_string(&out).unwrap(), "a,b\n0,r0\n1,r1\n2,r2\n");
        let events: Vec<ProgressUpdate> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], ProgressUpdate::success(3));
    }

    #[test]
    fn test_store_to_file_uses_explicit_query() {
        let dir = tempdir().unwrap();
        let params = FlatFileParams::new(dir.path().join("q.csv").to_string_lossy(), ",");
        let store = Arc::new(MemoryStore::with_result(&["a", "b"], int_rows(10)));
        let pipeline = TransferPipeline::new(store.clone(), config());
        let (tx, rx) = bounded(64);

        let sql = "SELECT a, b FROM t WHERE a < 10";
        pipeline
            .store_to_file("t", &ab_columns(), &params, Some(sql), tx, &CancelToken::new())
            .unwrap();

        assert_eq!(store.statements(), vec![sql.to_string()]);
        let events: Vec<ProgressUpdate> = rx.iter().collect();
        let counts: Vec<u64> = events.iter().map(|u| u.count).collect();
        assert_eq!(counts, vec![4, 8, 10]);
        assert!(events[0].message.starts_with("Written"));
        assert_eq!(terminal_events(&events).len(), 1);
    }

    #[test]
    fn test_producer_blocks_at_channel_capacity() {
        let store = MemoryStore::with_result(&["a", "b"], int_rows(50));
        let yielded = Arc::clone(&store.yielded);
        let store: Arc<dyn TabularStore> = Arc::new(store);
        let pipeline = TransferPipeline::new(Arc::clone(&store), config());
        let (tx, rx) = pipeline.data_channel::<Record>();

        let producer = thread::spawn(move || {
            produce_records(store.as_ref(), "SELECT a, b FROM t", tx, &CancelToken::new())
        });
        thread::sleep(Duration::from_millis(100));

        // Capacity 3 in the channel plus the one row held by the blocked send.
        assert_eq!(rx.len(), 3);
        assert!(yielded.load(Ordering::SeqCst) <= 4);
        assert!(!producer.is_finished());

        let drained = rx.iter().count();
        assert_eq!(drained, 50);
        assert_eq!(producer.join().unwrap().unwrap(), 50);
    }

    #[test]
    fn test_rejected_batch_reports_committed_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("many.csv");
        let body: String = std::iter::once("a,b\n".to_string())
            .chain((0..10).map(|i| format!("{},x{}\n", i, i)))
            .collect();
        fs::write(&path, body).unwrap();
        let params = FlatFileParams::new(path.to_string_lossy(), ",");
        let store = Arc::new(MemoryStore {
            reject_batch: Some(1),
            ..MemoryStore::default()
        });
        let pipeline = TransferPipeline::new(store.clone(), config());
        let (tx, rx) = bounded(64);

        let err = pipeline
            .file_to_store(&params, "t", &ab_columns(), tx, &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, IngestError::BatchSubmitError { inserted: 4, .. }));
        assert_eq!(store.inserted_count(), 4);
        let events: Vec<ProgressUpdate> = rx.iter().collect();
        let last = events.last().unwrap();
        assert_eq!(last.status, ProgressStatus::Error);
        assert_eq!(last.count, 4);
        assert!(last.message.contains("Type mismatch"));
        assert_eq!(terminal_events(&events).len(), 1);
    }

    #[test]
    fn test_missing_file_fails_with_single_terminal_event() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = TransferPipeline::new(store, config());
        let (tx, rx) = bounded(64);
        let params = FlatFileParams::new("/no/such/input.csv", ",");

        let err = pipeline
            .file_to_store(&params, "t", &ab_columns(), tx, &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, IngestError::IoError(_)));
        let events: Vec<ProgressUpdate> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, ProgressStatus::Error);
        assert!(events[0].completed);
    }

    #[test]
    fn test_invalid_table_name_fails_before_io() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("never.csv");
        let params = FlatFileParams::new(out.to_string_lossy(), ",");
        let store = Arc::new(MemoryStore::with_result(&["a", "b"], int_rows(1)));
        let pipeline = TransferPipeline::new(store.clone(), config());
        let (tx, _rx) = bounded(64);

        let err = pipeline
            .store_to_file("t; DROP TABLE t", &ab_columns(), &params, None, tx, &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, IngestError::ValidationError(_)));
        assert!(store.statements().is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn test_cancel_mid_transfer_stops_both_sides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.csv");
        let body: String = std::iter::once("a,b\n".to_string())
            .chain((0..5000).map(|i| format!("{},x\n", i)))
            .collect();
        fs::write(&path, body).unwrap();
        let params = FlatFileParams::new(path.to_string_lossy(), ",");

        let store = Arc::new(MemoryStore {
            submit_delay: Duration::from_millis(2),
            ..MemoryStore::default()
        });
        let pipeline = TransferPipeline::new(
            store.clone(),
            TransferConfig {
                batch_size: 10,
                progress_report_size: 1_000_000,
                channel_capacity: 20,
                ..TransferConfig::default()
            },
        );
        let cancel = CancelToken::new();
        let (tx, rx) = bounded(10);

        let worker = {
            let cancel = cancel.clone();
            thread::spawn(move || pipeline.file_to_store(&params, "t", &ab_columns(), tx, &cancel))
        };

        let started = Instant::now();
        while store.inserted_count() < 50 && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
        cancel.cancel();
        let err = worker.join().unwrap().unwrap_err();

        let records = match err {
            IngestError::Cancelled { records } => records,
            other => panic!("expected cancellation, got {:?}", other),
        };
        let committed = store.inserted_count();
        assert_eq!(records as usize, committed);
        assert!(committed < 5000);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(store.inserted_count(), committed);

        let events: Vec<ProgressUpdate> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0], ProgressUpdate::cancelled(records));
    }

    #[test]
    fn test_cancel_does_not_wait_for_a_slow_query() {
        let dir = tempdir().unwrap();
        let params = FlatFileParams::new(dir.path().join("slow.csv").to_string_lossy(), ",");
        let store = Arc::new(MemoryStore {
            query_delay: Duration::from_secs(3),
            ..MemoryStore::with_result(&["a", "b"], int_rows(5))
        });
        let pipeline = TransferPipeline::new(store, config());
        let cancel = CancelToken::new();
        let (tx, rx) = bounded(4);

        let trigger = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });
        let started = Instant::now();
        let err = pipeline
            .store_to_file("t", &ab_columns(), &params, None, tx, &cancel)
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, IngestError::Cancelled { records: 0 }));
        let events: Vec<ProgressUpdate> = rx.iter().collect();
        assert_eq!(events, vec![ProgressUpdate::cancelled(0)]);
    }

    #[test]
    fn test_bad_delimiter_fails_before_table_creation() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = TransferPipeline::new(store.clone(), config());
        let (tx, _rx) = bounded(4);
        let params = FlatFileParams::new("/no/such/input.csv", "¦");

        let err = pipeline
            .file_to_store(&params, "t", &ab_columns(), tx, &CancelToken::new())
            .unwrap_err();

        assert!(matches!(err, IngestError::ValidationError(_)));
        assert!(store.statements().is_empty());
    }

    #[test]
    fn test_already_cancelled_moves_nothing() {
        let dir = tempdir().unwrap();
        let params = FlatFileParams::new(dir.path().join("c.csv").to_string_lossy(), ",");
        let store = Arc::new(MemoryStore::with_result(&["a", "b"], int_rows(5)));
        let pipeline = TransferPipeline::new(store.clone(), config());
        let cancel = CancelToken::new();
        cancel.cancel();
        let (tx, rx) = bounded(4);

        let err = pipeline
            .store_to_file("t", &ab_columns(), &params, None, tx, &cancel)
            .unwrap_err();

        assert!(matches!(err, IngestError::Cancelled { records: 0 }));
        assert!(store.statements().is_empty());
        assert_eq!(rx.recv().unwrap(), ProgressUpdate::cancelled(0));
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_listener_leaving_does_not_fail_transfer() {
        let dir = tempdir().unwrap();
        let params = FlatFileParams::new(dir.path().join("l.csv").to_string_lossy(), ",");
        let store = Arc::new(MemoryStore::with_result(&["a", "b"], int_rows(20)));
        let pipeline = TransferPipeline::new(store, config());
        let (tx, rx) = bounded(1);
        drop(rx);

        let result = pipeline
            .store_to_file("t", &ab_columns(), &params, None, tx, &CancelToken::new())
            .unwrap();
        assert_eq!(result.total_records, 20);
    }
}
