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

//! Streaming flat-file writer.

use crate::domain::cancellation::CancelToken;
use crate::domain::entities::{Column, FlatFileParams, Record};
use crate::domain::errors::{IngestError, Result};
use crate::domain::progress::ProgressReporter;
use crate::infrastructure::flat_file::Sink;
use crossbeam_channel::Receiver;
use csv::{QuoteStyle, WriterBuilder};
use log::info;
use std::path::Path;

pub struct FlatFileWriter {
    writer: csv::Writer<Sink>,
    columns: Vec<String>,
    path: String,
    written: u64,
    flush_every: u64,
}

impl FlatFileWriter {
    /// Creates (or truncates) the target and writes the header from `columns`.
    pub fn create(params: &FlatFileParams, columns: &[Column], flush_every: u64) -> Result<Self> {
        if columns.is_empty() {
            return Err(IngestError::ValidationError(
                "at least one column is required to write a file".to_string(),
            ));
        }
        let delimiter = params.delimiter_byte()?;
        let sink = Sink::create(Path::new(&params.file_path))?;
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .quote_style(QuoteStyle::Necessary)
            .from_writer(sink);

        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        writer.write_record(&names)?;
        writer.flush()?;

        Ok(Self {
            writer,
            columns: names,
            path: params.file_path.clone(),
            written: 0,
            flush_every: flush_every.max(1),
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn after_write(&mut self) -> Result<()> {
        self.written += 1;
        if self.written % self.flush_every == 0 {
            self.writer.flush().map_err(|e| self.flush_error(e))?;
        }
        Ok(())
    }

    fn flush_error(&self, e: std::io::Error) -> IngestError {
        IngestError::IoError(std::io::Error::new(
            e.kind(),
            format!("flush of {} failed after {} rows: {}", self.path, self.written, e),
        ))
    }

    /// Writes a name-keyed record in column order. Missing keys become empty fields.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        let fields = self
            .columns
            .iter()
            .map(|name| record.get(name).map(|v| v.to_string()).unwrap_or_default());
        self.writer.write_record(fields)?;
        self.after_write()
    }

    /// Final flush. Returns the number of data rows written.
    pub fn finish(self) -> Result<u64> {
        let written = self.written;
        let path = self.path;
        let sink = self
            .writer
            .into_inner()
            .map_err(|e| IngestError::IoError(std::io::Error::new(e.error().kind(), e.to_string())))?;
        sink.finish()?;
        info!("Wrote {} rows to {}", written, path);
        Ok(written)
    }
}

/// Consumer side of a store-to-file transfer.
///
/// Drains `rx` until the producer closes it, reporting progress as rows are
/// written. Stops early on cancellation; rows already written stay on disk.
pub fn write_stream(
    mut writer: FlatFileWriter,
    rx: &Receiver<Record>,
    progress: &mut ProgressReporter,
    cancel: &CancelToken,
) -> Result<u64> {
    loop {
        match cancel.recv(rx) {
            Ok(Some(record)) => {
                writer.write_record(&record)?;
                progress.advance(writer.written(), cancel)?;
            }
            Ok(None) => break,
            Err(_) => {
                let written = writer.written();
                // Keep what is already written readable.
                writer.finish()?;
                return Err(IngestError::Cancelled { records: written });
            }
        }
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Row, SemanticType, Value};
    use crate::domain::value_conversion::ConversionMode;
    use crate::infrastructure::flat_file::reader::FlatFileReader;
    use std::fs;
    use tempfile::tempdir;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("id", SemanticType::INT64),
            Column::new("name", SemanticType::STRING),
        ]
    }

    fn record(columns: &[Column], row: &Row) -> Record {
        columns
            .iter()
            .map(|c| c.name.clone())
            .zip(row.iter().cloned())
            .collect()
    }

    fn write_then_read(params: &FlatFileParams, columns: &[Column], rows: &[Row]) -> Vec<Row> {
        let mut writer = FlatFileWriter::create(params, columns, 7).unwrap();
        for row in rows {
            writer.write_record(&record(columns, row)).unwrap();
        }
        assert_eq!(writer.finish().unwrap(), rows.len() as u64);

        FlatFileReader::open(params)
            .unwrap()
            .into_rows(columns, ConversionMode::Strict)
            .collect::<Result<_>>()
            .unwrap()
    }

    #[test]
    fn test_creates_parent_dirs_and_projects_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out/nested/x.csv");
        let params = FlatFileParams::new(path.to_string_lossy(), ",");
        let mut writer = FlatFileWriter::create(&params, &columns(), 1000).unwrap();

        let mut rec = Record::new();
        rec.insert("name".into(), Value::Text("a, b".into()));
        rec.insert("id".into(), Value::Int64(1));
        rec.insert("ignored".into(), Value::Bool(true));
        writer.write_record(&rec).unwrap();

        let mut partial = Record::new();
        partial.insert("id".into(), Value::Int64(2));
        writer.write_record(&partial).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "id,name\n1,\"a, b\"\n2,\n");
    }

    #[test]
    fn test_round_trip_through_reader() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rt.csv.gz");
        let params = FlatFileParams::new(path.to_string_lossy(), ";");
        let rows: Vec<Row> = (0..50)
            .map(|i| vec![Value::Int64(i), Value::Text(format!("name;{}", i))])
            .collect();

        assert_eq!(write_then_read(&params, &columns(), &rows), rows);
    }

    #[test]
    fn test_round_trip_keeps_padded_text() {
        let dir = tempdir().unwrap();
        let params = FlatFileParams::new(dir.path().join("pad.csv").to_string_lossy(), ",");
        let columns = vec![
            Column::new("name", "Nullable(String)".parse().unwrap()),
            Column::new("note", SemanticType::STRING),
        ];
        let rows: Vec<Row> = vec![
            vec![Value::Text("  padded".into()), Value::Text(" a, b ".into())],
            vec![Value::Text("   ".into()), Value::Text("\tx".into())],
            vec![Value::Null, Value::Text(String::new())],
        ];

        assert_eq!(write_then_read(&params, &columns, &rows), rows);
    }

    #[test]
    fn test_write_stream_reports_progress_and_counts() {
        let dir = tempdir().unwrap();
        let params = FlatFileParams::new(dir.path().join("s.csv").to_string_lossy(), ",");
        let writer = FlatFileWriter::create(&params, &columns(), 3).unwrap();
        let (tx, rx) = crossbeam_channel::bounded(4);
        let (ptx, prx) = crossbeam_channel::unbounded();
        let mut progress = ProgressReporter::new(ptx, 5, "Written");

        let producer = std::thread::spawn(move || {
            for i in 0..12 {
                let mut rec = Record::new();
                rec.insert("id".into(), Value::Int64(i));
                tx.send(rec).unwrap();
            }
        });
        let n = write_stream(writer, &rx, &mut progress, &CancelToken::new()).unwrap();
        producer.join().unwrap();

        assert_eq!(n, 12);
        let counts: Vec<u64> = prx.try_iter().map(|u| u.count).collect();
        assert_eq!(counts, vec![5, 10]);
    }

    #[test]
    fn test_rejects_empty_column_list() {
        let dir = tempdir().unwrap();
        let params = FlatFileParams::new(dir.path().join("e.csv").to_string_lossy(), ",");
        assert!(FlatFileWriter::create(&params, &[], 10).is_err());
    }

    #[test]
    fn test_non_ascii_delimiter_creates_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never.csv");
        let params = FlatFileParams::new(path.to_string_lossy(), "¦");
        assert!(matches!(
            FlatFileWriter::create(&params, &columns(), 10),
            Err(IngestError::ValidationError(_))
        ));
        assert!(!path.exists());
    }
}
