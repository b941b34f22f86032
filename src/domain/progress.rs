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

//! Threshold-based `processing` events for one side of a transfer.

use crate::domain::cancellation::{CancelToken, ChannelError};
use crate::domain::entities::ProgressUpdate;
use crate::domain::errors::{IngestError, Result};
use crossbeam_channel::Sender;
use log::debug;

/// Emits a `processing` update each time the running count has advanced by at
/// least `interval` since the last report.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: Sender<ProgressUpdate>,
    interval: u64,
    last_reported: u64,
    verb: &'static str,
    detached: bool,
}

impl ProgressReporter {
    /// `verb` names the side in messages, e.g. "Inserted" or "Written".
    pub fn new(tx: Sender<ProgressUpdate>, interval: u64, verb: &'static str) -> Self {
        Self {
            tx,
            interval: interval.max(1),
            last_reported: 0,
            verb,
            detached: false,
        }
    }

    pub fn last_reported(&self) -> u64 {
        self.last_reported
    }

    /// Reports `total` if the threshold was crossed.
    ///
    /// Blocks while the progress channel is full; a cancelled token aborts the
    /// wait. If the caller stopped listening, reporting is silently dropped.
    pub fn advance(&mut self, total: u64, cancel: &CancelToken) -> Result<()> {
        if self.detached || total < self.last_reported + self.interval {
            return Ok(());
        }
        let update = ProgressUpdate::processing(format!("{} {} rows", self.verb, total), total);
        match cancel.send(&self.tx, update) {
            Ok(()) => {
                self.last_reported = total;
                Ok(())
            }
            Err(ChannelError::Cancelled) => Err(IngestError::Cancelled { records: total }),
            Err(ChannelError::Disconnected) => {
                debug!("Progress listener went away; {} reporting stops", self.verb);
                self.detached = true;
                Ok(())
            }
        }
    }
}
