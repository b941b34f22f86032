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

use crate::application::pipeline::TransferPipeline;
use crate::application::worker::Worker;
use crate::config::TransferConfig;
use crate::domain::cancellation::CancelToken;
use crate::domain::entities::{
    Column, FlatFileParams, JoinSpec, PreviewRequest, ProgressUpdate, Record, SourceKind,
    TransferRequest, TransferResult,
};
use crate::domain::errors::{IngestError, Result};
use crate::domain::query_builder::{build_join, build_preview, with_limit};
use crate::infrastructure::flat_file::{discovery, preview};
use crate::ports::store_port::TabularStore;
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Entry points used by the CLI (or any other request layer).
///
/// Flat-file operations work without a store; everything that touches
/// ClickHouse fails with `ConnectionError` until one is attached.
pub struct IngestService {
    store: Option<Arc<dyn TabularStore>>,
    config: TransferConfig,
}

impl IngestService {
    /// A service that can only discover and preview flat files.
    pub fn offline(config: TransferConfig) -> Self {
        Self {
            store: None,
            config,
        }
    }

    /// Attaches `store` after checking it answers `SELECT 1`.
    pub fn connect(store: Arc<dyn TabularStore>, config: TransferConfig) -> Result<Self> {
        store.ping().map_err(|e| match e {
            IngestError::ConnectionError(_) => e,
            other => IngestError::ConnectionError(other.to_string()),
        })?;
        info!("Connected to ClickHouse");
        Ok(Self {
            store: Some(store),
            config,
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    fn store(&self) -> Result<&Arc<dyn TabularStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| IngestError::ConnectionError("not connected to ClickHouse".to_string()))
    }

    fn pipeline(&self) -> Result<TransferPipeline> {
        Ok(TransferPipeline::new(
            Arc::clone(self.store()?),
            self.config.clone(),
        ))
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        self.store()?.list_tables()
    }

    pub fn table_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.store()?.table_columns(table)
    }

    /// Store to file. See [`TransferPipeline::store_to_file`].
    pub fn ingest_store_to_file(
        &self,
        cancel: &CancelToken,
        table: &str,
        columns: &[Column],
        file: &FlatFileParams,
        query: Option<&str>,
        progress: Sender<ProgressUpdate>,
    ) -> Result<TransferResult> {
        match self.pipeline() {
            Ok(p) => p.store_to_file(table, columns, file, query, progress, cancel),
            Err(e) => refuse(e, progress),
        }
    }

    /// File to store. See [`TransferPipeline::file_to_store`].
    pub fn ingest_file_to_store(
        &self,
        cancel: &CancelToken,
        file: &FlatFileParams,
        table: &str,
        columns: &[Column],
        progress: Sender<ProgressUpdate>,
    ) -> Result<TransferResult> {
        match self.pipeline() {
            Ok(p) => p.file_to_store(file, table, columns, progress, cancel),
            Err(e) => refuse(e, progress),
        }
    }

    /// Routes a request by its source and target kinds.
    pub fn run_transfer(
        &self,
        request: &TransferRequest,
        progress: Sender<ProgressUpdate>,
        cancel: &CancelToken,
    ) -> Result<TransferResult> {
        let started = Instant::now();
        let result = match (request.source_type, request.target_type) {
            (SourceKind::ClickHouse, SourceKind::FlatFile) => self.ingest_store_to_file(
                cancel,
                &request.table_name,
                &request.columns,
                &request.flat_file_params,
                request.query.as_deref(),
                progress,
            ),
            (SourceKind::FlatFile, SourceKind::ClickHouse) => self.ingest_file_to_store(
                cancel,
                &request.flat_file_params,
                &request.table_name,
                &request.columns,
                progress,
            ),
            (source, target) => refuse(
                IngestError::ValidationError(format!(
                    "invalid source/target combination: {} -> {}",
                    source, target
                )),
                progress,
            ),
        };
        info!(
            "{} -> {} transfer of {} took {:.2}s",
            request.source_type,
            request.target_type,
            request.table_name,
            started.elapsed().as_secs_f64()
        );
        result
    }

    /// Infers the schema of a flat file, bounded by the discovery timeout.
    pub fn discover_schema(
        &self,
        cancel: &CancelToken,
        file_path: &str,
        delimiter: &str,
    ) -> Result<Vec<Column>> {
        let token = cancel.child_with_timeout(self.config.discovery_timeout());
        let params = FlatFileParams::new(file_path, delimiter);
        discovery::discover_schema(&params, self.config.sample_size, &token).inspect_err(|e| {
            if e.is_cancelled() && !cancel.is_cancelled() {
                warn!("Schema discovery of {} timed out", file_path);
            }
        })
    }

    fn preview_limit(&self, limit: usize) -> usize {
        if limit == 0 {
            self.config.max_preview_rows
        } else {
            limit.min(self.config.max_preview_rows)
        }
    }

    /// First rows of a table or flat file, capped at `max_preview_rows`.
    pub fn preview_rows(
        &self,
        cancel: &CancelToken,
        request: &PreviewRequest,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let limit = self.preview_limit(limit);
        let token = cancel.child_with_timeout(self.config.preview_timeout());
        match request.source_type {
            SourceKind::ClickHouse => {
                let names: Vec<String> = request.columns.iter().map(|c| c.name.clone()).collect();
                let sql = build_preview(&request.table_name, &names, limit)?;
                self.query_records(&sql, limit, &token)
            }
            SourceKind::FlatFile => {
                let params = request.flat_file_params.as_ref().ok_or_else(|| {
                    IngestError::ValidationError(
                        "flat file preview needs a file path".to_string(),
                    )
                })?;
                preview::preview_file(
                    params,
                    &request.columns,
                    limit,
                    self.config.conversion_mode(),
                    &token,
                )
            }
        }
    }

    /// `SELECT ... JOIN ...` for `spec`, honoring the configured filter policy.
    pub fn build_join_query(&self, spec: &JoinSpec) -> Result<String> {
        build_join(spec, self.config.filter_policy())
    }

    /// Runs a built join query with a row limit appended.
    pub fn preview_join(
        &self,
        cancel: &CancelToken,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Record>> {
        if query.trim().is_empty() {
            return Err(IngestError::ValidationError("join query is empty".to_string()));
        }
        let limit = self.preview_limit(limit);
        let token = cancel.child_with_timeout(self.config.preview_timeout());
        self.query_records(&with_limit(query, limit), limit, &token)
    }

    /// Runs `sql` on a worker so that `cancel`'s deadline bounds the blocking
    /// store call as well as the row loop.
    fn query_records(&self, sql: &str, limit: usize, cancel: &CancelToken) -> Result<Vec<Record>> {
        let store = Arc::clone(self.store()?);
        let timeout = cancel
            .remaining()
            .unwrap_or_else(|| self.config.preview_timeout());
        let sql = sql.to_string();
        let worker_cancel = cancel.clone();
        let worker = Worker::spawn("preview", move || {
            collect_records(store.as_ref(), &sql, limit, timeout, &worker_cancel)
        })?;
        worker.wait(cancel).inspect_err(|e| {
            if e.is_cancelled() {
                warn!("Preview query gave up after {:.1}s", timeout.as_secs_f64());
            }
        })
    }
}

fn collect_records(
    store: &dyn TabularStore,
    sql: &str,
    limit: usize,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<Vec<Record>> {
    let result = store.query_within(sql, timeout)?;
    let mut out = Vec::new();
    for row in result.rows.take(limit) {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled {
                records: out.len() as u64,
            });
        }
        out.push(result.columns.iter().cloned().zip(row?).collect());
    }
    Ok(out)
}

/// Terminal event for a transfer that never started.
fn refuse(e: IngestError, progress: Sender<ProgressUpdate>) -> Result<TransferResult> {
    error!("Transfer rejected: {}", e);
    if progress.send(ProgressUpdate::error(e.to_string(), 0)).is_err() {
        debug!("Progress listener left before the terminal event");
    }
    Err(e)
}
