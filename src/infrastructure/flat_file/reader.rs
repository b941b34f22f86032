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

//! Streaming flat-file reader.
//!
//! The header defines field names; callers ask for columns by name and get
//! positional rows back in their own column order. Rows whose width differs
//! from the header, or that fail to convert, are logged and skipped. Only
//! I/O failures end the stream.

use crate::domain::cancellation::{CancelToken, ChannelError};
use crate::domain::entities::{Column, FlatFileParams, Row, SemanticType, Value};
use crate::domain::errors::{IngestError, Result};
use crate::domain::value_conversion::{convert, ConversionMode};
use crate::infrastructure::flat_file::open_source;
use crossbeam_channel::Sender;
use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, warn};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

pub struct FlatFileReader {
    reader: csv::Reader<Box<dyn Read + Send>>,
    header: Vec<String>,
    index: HashMap<String, usize>,
    path: String,
    /// 1-based data row number of the last record read, header excluded.
    row: u64,
    skipped: u64,
}

impl FlatFileReader {
    /// Opens the file and consumes its header row.
    pub fn open(params: &FlatFileParams) -> Result<Self> {
        let delimiter = params.delimiter_byte()?;
        let source = open_source(Path::new(&params.file_path))?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .trim(Trim::Headers)
            .from_reader(source);

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if header.is_empty() || header.iter().all(|h| h.is_empty()) {
            return Err(IngestError::CsvError(format!(
                "{} has no header row",
                params.file_path
            )));
        }

        let mut index = HashMap::with_capacity(header.len());
        for (i, name) in header.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }

        Ok(Self {
            reader,
            header,
            index,
            path: params.file_path.clone(),
            row: 0,
            skipped: 0,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn skip(&mut self, reason: &str) {
        self.skipped += 1;
        let err = IngestError::RowError {
            row: self.row,
            reason: reason.to_string(),
        };
        warn!("{}: {}", self.path, err);
    }

    /// Next record whose width matches the header. `Ok(None)` at end of file.
    pub fn next_record(&mut self) -> Result<Option<StringRecord>> {
        let mut record = StringRecord::new();
        loop {
            match self.reader.read_record(&mut record) {
                Ok(false) => return Ok(None),
                Ok(true) => {
                    self.row += 1;
                    if record.len() != self.header.len() {
                        let reason = format!(
                            "expected {} fields, found {}",
                            self.header.len(),
                            record.len()
                        );
                        self.skip(&reason);
                        continue;
                    }
                    return Ok(Some(record));
                }
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    self.row += 1;
                    self.skip(&e.to_string());
                }
            }
        }
    }

    /// Positional rows projected onto `columns`.
    pub fn into_rows(self, columns: &[Column], mode: ConversionMode) -> FlatFileRows {
        let plan = columns
            .iter()
            .map(|c| (self.index.get(&c.name).copied(), c.col_type))
            .collect();
        FlatFileRows {
            reader: self,
            plan,
            mode,
        }
    }
}

/// Lazy, single-pass sequence of projected rows. Not restartable.
pub struct FlatFileRows {
    reader: FlatFileReader,
    plan: Vec<(Option<usize>, SemanticType)>,
    mode: ConversionMode,
}

impl FlatFileRows {
    pub fn skipped(&self) -> u64 {
        self.reader.skipped
    }

    fn project(&self, record: &StringRecord) -> std::result::Result<Row, String> {
        let mut row = Vec::with_capacity(self.plan.len());
        for (idx, col_type) in &self.plan {
            let value = match idx.and_then(|i| record.get(i)) {
                Some(raw) => convert(raw, *col_type, self.mode)?,
                None => Value::Null,
            };
            row.push(value);
        }
        Ok(row)
    }
}

impl Iterator for FlatFileRows {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.reader.next_record() {
                Ok(Some(r)) => r,
                Ok(None) => return None,
                Err(e) => return Some(Err(e)),
            };
            match self.project(&record) {
                Ok(row) => return Some(Ok(row)),
                Err(reason) => self.reader.skip(&reason),
            }
        }
    }
}

/// Producer side of a file-to-store transfer: pushes rows into `tx` until the
/// file ends, the consumer hangs up, or `cancel` fires.
///
/// Returns the number of rows handed to the channel.
pub fn stream_rows(mut rows: FlatFileRows, tx: &Sender<Row>, cancel: &CancelToken) -> Result<u64> {
    let mut sent = 0u64;
    for item in rows.by_ref() {
        let row = item?;
        match cancel.send(tx, row) {
            Ok(()) => sent += 1,
            Err(ChannelError::Cancelled) => return Err(IngestError::Cancelled { records: sent }),
            Err(ChannelError::Disconnected) => {
                debug!("Row consumer stopped after {} rows", sent);
                break;
            }
        }
    }
    if rows.skipped() > 0 {
        warn!("Skipped {} malformed rows", rows.skipped());
    }
    Ok(sent)
}
