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

//! # Cooperative Cancellation
//!
//! A `CancelToken` is a cloneable signal shared by the caller and every
//! worker of one transfer. Cancelling drops the only `Sender` of an internal
//! zero-traffic channel, so every clone's `Receiver` observes a disconnect.
//! That receiver can sit in a `crossbeam_channel::select!` next to the data
//! channel, which is what makes each blocking channel operation abortable.
//!
//! An optional deadline turns the token into a timeout: once it passes the
//! token reports itself cancelled.

use crossbeam_channel::{after, never, select, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Why a cancellation-aware channel operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// The token fired or its deadline passed.
    Cancelled,
    /// The other side of the data channel hung up.
    Disconnected,
}

#[derive(Clone)]
pub struct CancelToken {
    trigger: Arc<Mutex<Option<Sender<()>>>>,
    signal: Receiver<()>,
    deadline: Option<Instant>,
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            trigger: Arc::new(Mutex::new(Some(tx))),
            signal: rx,
            deadline: None,
        }
    }

    /// A clone sharing this token's trigger, with an additional deadline.
    ///
    /// Cancelling either cancels both; the deadline applies to the child only.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(d) if d < candidate => d,
            _ => candidate,
        };
        Self {
            trigger: Arc::clone(&self.trigger),
            signal: self.signal.clone(),
            deadline: Some(deadline),
        }
    }

    /// Fires the token. Idempotent.
    pub fn cancel(&self) {
        match self.trigger.lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(poisoned) => {
                poisoned.into_inner().take();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return true;
            }
        }
        matches!(self.signal.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Time left before the deadline, if the token has one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Receiver that fires when the deadline passes, or never.
    fn deadline_rx(&self) -> Receiver<Instant> {
        match self.deadline {
            Some(deadline) => {
                after(deadline.saturating_duration_since(Instant::now()))
            }
            None => never(),
        }
    }

    /// Blocking send that aborts on cancellation.
    pub fn send<T>(&self, tx: &Sender<T>, item: T) -> Result<(), ChannelError> {
        if self.is_cancelled() {
            return Err(ChannelError::Cancelled);
        }
        let deadline = self.deadline_rx();
        select! {
            send(tx, item) -> res => res.map_err(|_| ChannelError::Disconnected),
            recv(self.signal) -> _ => Err(ChannelError::Cancelled),
            recv(deadline) -> _ => Err(ChannelError::Cancelled),
        }
    }

    /// Blocking receive that aborts on cancellation.
    ///
    /// `Ok(None)` means the sender side is done and the channel is drained.
    /// A hang-up that races with a cancel is reported as `Cancelled`, and so
    /// is an item that arrives once the token has fired.
    pub fn recv<T>(&self, rx: &Receiver<T>) -> Result<Option<T>, ChannelError> {
        if self.is_cancelled() {
            return Err(ChannelError::Cancelled);
        }
        let deadline = self.deadline_rx();
        let received = select! {
            recv(rx) -> res => res.ok(),
            recv(self.signal) -> _ => return Err(ChannelError::Cancelled),
            recv(deadline) -> _ => return Err(ChannelError::Cancelled),
        };
        if self.is_cancelled() {
            return Err(ChannelError::Cancelled);
        }
        Ok(received)
    }
}
