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

use crate::domain::cancellation::CancelToken;
use crate::domain::entities::{Column, FlatFileParams, Record, SemanticType};
use crate::domain::errors::{IngestError, Result};
use crate::domain::value_conversion::{convert, ConversionMode};
use crate::infrastructure::flat_file::reader::FlatFileReader;
use log::warn;

/// First `limit` well-formed rows as name-keyed records.
///
/// With no `columns`, every header field is returned as `String`. Requested
/// columns the file lacks are left out of the record.
pub fn preview_file(
    params: &FlatFileParams,
    columns: &[Column],
    limit: usize,
    mode: ConversionMode,
    cancel: &CancelToken,
) -> Result<Vec<Record>> {
    let mut reader = FlatFileReader::open(params)?;
    let selected: Vec<Column> = if columns.is_empty() {
        reader
            .header()
            .iter()
            .map(|h| Column::new(h.clone(), SemanticType::STRING))
            .collect()
    } else {
        columns.to_vec()
    };
    let positions: Vec<Option<usize>> = selected
        .iter()
        .map(|c| reader.header().iter().position(|h| *h == c.name))
        .collect();

    let mut out = Vec::with_capacity(limit.min(1024));
    'rows: while out.len() < limit {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled {
                records: out.len() as u64,
            });
        }
        let Some(record) = reader.next_record()? else {
            break;
        };
        let mut row = Record::with_capacity(selected.len());
        for (col, pos) in selected.iter().zip(&positions) {
            let Some(raw) = pos.and_then(|i| record.get(i)) else {
                continue;
            };
            match convert(raw, col.col_type, mode) {
                Ok(v) => {
                    row.insert(col.name.clone(), v);
                }
                Err(reason) => {
                    warn!("Preview skipped a row of {}: {}", params.file_path, reason);
                    continue 'rows;
                }
            }
        }
        out.push(row);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Value;
    use std::fs;
    use tempfile::tempdir;

    fn params(body: &str) -> (tempfile::TempDir, FlatFileParams) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p.csv");
        fs::write(&path, body).unwrap();
        let p = FlatFileParams::new(path.to_string_lossy(), "");
        (dir, p)
    }

    #[test]
    fn test_default_columns_are_strings() {
        let (_dir, p) = params("a,b\n1,x\n2,y\n3,z\n");
        let rows = preview_file(&p, &[], 2, ConversionMode::Strict, &CancelToken::new()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["a"], Value::Text("1".into()));
        assert_eq!(rows[1]["b"], Value::Text("y".into()));
    }

    #[test]
    fn test_typed_columns_and_missing_names() {
        let (_dir, p) = params("a,b\n1,x\nbad,y\n3,z\n");
        let cols = vec![
            Column::new("a", SemanticType::INT64),
            Column::new("zz", SemanticType::STRING),
        ];
        let rows = preview_file(&p, &cols, 10, ConversionMode::Strict, &CancelToken::new()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["a"], Value::Int64(3));
        assert!(!rows[0].contains_key("zz"));
    }
}
