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

//! Schema discovery: header names plus types inferred from the first rows.

use crate::domain::cancellation::CancelToken;
use crate::domain::entities::{Column, FlatFileParams};
use crate::domain::errors::{IngestError, Result};
use crate::domain::type_inference::ColumnSampler;
use crate::infrastructure::flat_file::reader::FlatFileReader;
use log::info;

/// Infers one `Column` per header field from up to `sample_size` well-formed rows.
///
/// Malformed rows are skipped and do not count toward the sample.
pub fn discover_schema(
    params: &FlatFileParams,
    sample_size: usize,
    cancel: &CancelToken,
) -> Result<Vec<Column>> {
    let mut reader = FlatFileReader::open(params)?;
    let header = reader.header().to_vec();
    let mut sampler = ColumnSampler::new(header.len(), sample_size);

    while !sampler.is_full() {
        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled {
                records: sampler.rows_observed() as u64,
            });
        }
        match reader.next_record()? {
            Some(record) => sampler.observe(record.iter().map(str::trim_start)),
            None => break,
        }
    }

    info!(
        "Discovered {} columns in {} from {} sample rows ({} skipped)",
        header.len(),
        params.file_path,
        sampler.rows_observed(),
        reader.skipped()
    );

    Ok(header
        .into_iter()
        .zip(sampler.finish())
        .map(|(name, col_type)| Column::new(name, col_type))
        .collect())
}
