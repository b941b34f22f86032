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

//! Background work that the caller may stop waiting for.
//!
//! A blocking store call cannot watch a `CancelToken`. Running it on a worker
//! thread lets the caller give up the moment the token fires; the worker
//! runs to completion on its own and its late result is dropped.

use crate::domain::cancellation::CancelToken;
use crate::domain::errors::{IngestError, Result};
use crossbeam_channel::{bounded, Receiver};
use log::debug;
use std::thread;

pub struct Worker<T> {
    done: Receiver<Result<T>>,
    name: String,
}

impl<T: Send + 'static> Worker<T> {
    pub fn spawn<F>(name: impl Into<String>, work: F) -> Result<Self>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let name = name.into();
        let (done_tx, done) = bounded(1);
        thread::Builder::new().name(name.clone()).spawn(move || {
            if done_tx.send(work()).is_err() {
                debug!("Dropped the result of an abandoned worker");
            }
        })?;
        Ok(Self { done, name })
    }

    /// The worker's result, or `Cancelled { records: 0 }` once `cancel` fires.
    ///
    /// A result that is already waiting is returned even if the token has fired.
    pub fn wait(self, cancel: &CancelToken) -> Result<T> {
        if let Ok(result) = self.done.try_recv() {
            return result;
        }
        match cancel.recv(&self.done) {
            Ok(Some(result)) => result,
            Ok(None) => Err(IngestError::IoError(std::io::Error::other(format!(
                "{} thread panicked",
                self.name
            )))),
            Err(_) => {
                debug!("Stopped waiting for {} after cancellation", self.name);
                Err(IngestError::Cancelled { records: 0 })
            }
        }
    }
}
