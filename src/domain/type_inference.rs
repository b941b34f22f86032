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

//! # Type Inference
//!
//! Classifies raw text values and reduces per-row classifications into one
//! column type by majority vote.
//!
//! Classification order is fixed: empty, integer, float, date, string. The
//! first rule that matches wins, so `"42"` is `Int64` even though it also
//! parses as a float.

use crate::domain::entities::SemanticType;
use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Date-only layouts, tried in order.
const DATE_LAYOUTS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y"];

/// Date-time layouts, tried after the date-only ones.
const DATETIME_LAYOUTS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Parses any of the recognised date layouts, RFC 3339 last.
///
/// Date-only values land at midnight. RFC 3339 values are normalised to UTC.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    for layout in DATE_LAYOUTS {
        if let Ok(d) = NaiveDate::parse_from_str(value, layout) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    for layout in DATETIME_LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, layout) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.naive_utc())
}

/// Classifies a single raw value.
pub fn classify(value: &str) -> SemanticType {
    if value.is_empty() {
        return SemanticType::EMPTY_SENTINEL;
    }
    if value.parse::<i64>().is_ok() {
        return SemanticType::INT64;
    }
    if value.parse::<f64>().is_ok() {
        return SemanticType::FLOAT64;
    }
    if parse_datetime(value).is_some() {
        return SemanticType::DATETIME;
    }
    SemanticType::STRING
}

/// Reduces a sample of classifications into the column's type.
///
/// Ties on the modal count go to the candidate seen first.
pub fn reduce(samples: &[SemanticType]) -> SemanticType {
    if samples.is_empty() {
        return SemanticType::STRING;
    }

    // Insertion-ordered tally; the candidate set is tiny.
    let mut counts: Vec<(SemanticType, usize)> = Vec::new();
    for sample in samples {
        match counts.iter_mut().find(|(t, _)| t == sample) {
            Some((_, n)) => *n += 1,
            None => counts.push((*sample, 1)),
        }
    }
    let count_of = |t: SemanticType| {
        counts
            .iter()
            .find(|(c, _)| *c == t)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    };

    let mut dominant = SemanticType::STRING;
    let mut max = 0;
    for (t, n) in &counts {
        if *n > max {
            max = *n;
            dominant = *t;
        }
    }

    // Any fractional value widens the whole column.
    if count_of(SemanticType::INT64) > 0 && count_of(SemanticType::FLOAT64) > 0 {
        dominant = SemanticType::FLOAT64;
    }

    if count_of(SemanticType::EMPTY_SENTINEL) > 0 && dominant != SemanticType::STRING {
        return dominant.into_nullable();
    }
    dominant
}

/// Collects per-column classifications for up to `sample_size` rows.
#[derive(Debug)]
pub struct ColumnSampler {
    samples: Vec<Vec<SemanticType>>,
    rows: usize,
    sample_size: usize,
}

impl ColumnSampler {
    pub fn new(width: usize, sample_size: usize) -> Self {
        Self {
            samples: (0..width)
                .map(|_| Vec::with_capacity(sample_size))
                .collect(),
            rows: 0,
            sample_size,
        }
    }

    pub fn is_full(&self) -> bool {
        self.rows >= self.sample_size
    }

    /// Adds one well-formed row. Callers skip rows of the wrong width.
    pub fn observe<'a, I>(&mut self, fields: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.is_full() {
            return;
        }
        for (column, value) in self.samples.iter_mut().zip(fields) {
            column.push(classify(value));
        }
        self.rows += 1;
    }

    pub fn rows_observed(&self) -> usize {
        self.rows
    }

    pub fn finish(self) -> Vec<SemanticType> {
        self.samples.iter().map(|s| reduce(s)).collect()
    }
}
