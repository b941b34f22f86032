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

use crate::domain::entities::ConnectionParams;
use crate::domain::errors::{IngestError, Result};
use r2d2::ManageConnection;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One logical session against the ClickHouse HTTP interface.
///
/// The underlying `reqwest` client keeps its own keep-alive sockets; the pool
/// above it bounds how many statements run at once.
pub struct ClickHouseConnection {
    http: Client,
    params: Arc<ConnectionParams>,
    url: String,
    max_execution_secs: u64,
}

impl ClickHouseConnection {
    /// Sends `sql` as the request body and returns the response once the
    /// server has accepted it. The body is not read.
    pub fn post(&self, sql: String) -> Result<Response> {
        self.send(sql, None)
    }

    /// `post` with the whole exchange, body included, bounded by `timeout`.
    /// The server-side `max_execution_time` is lowered to match.
    pub fn post_within(&self, sql: String, timeout: Duration) -> Result<Response> {
        self.send(sql, Some(timeout))
    }

    fn send(&self, sql: String, timeout: Option<Duration>) -> Result<Response> {
        let max_execution_time = execution_limit(self.max_execution_secs, timeout).to_string();
        let mut request = self
            .http
            .post(&self.url)
            .query(&[
                ("database", self.params.database.as_str()),
                ("max_execution_time", max_execution_time.as_str()),
            ])
            .header("X-ClickHouse-User", &self.params.user)
            .header("X-ClickHouse-Database", &self.params.database)
            .body(sql);

        if let Some(token) = &self.params.token {
            request = request.bearer_auth(token);
        } else if let Some(password) = &self.params.password {
            request = request.header("X-ClickHouse-Key", password);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send()?;
        check_status(response)
    }

    /// Runs a statement and discards any result body.
    pub fn execute(&self, sql: String) -> Result<()> {
        let response = self.post(sql)?;
        response.bytes()?;
        Ok(())
    }

    pub fn ping(&self) -> Result<()> {
        self.execute("SELECT 1".to_string())
    }
}

/// Seconds for `max_execution_time`: the configured cap, or `timeout` rounded
/// up when that is shorter.
fn execution_limit(configured_secs: u64, timeout: Option<Duration>) -> u64 {
    match timeout {
        Some(t) => {
            let secs = t.as_secs() + u64::from(t.subsec_nanos() > 0);
            secs.clamp(1, configured_secs.max(1))
        }
        None => configured_secs,
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(IngestError::ConnectionError(message))
    } else {
        Err(IngestError::QueryError(message))
    }
}

/// r2d2 connection manager for the ClickHouse HTTP interface.
///
/// Establishing a connection is cheap (no network round-trip); validity is
/// checked with a ping on checkout.
pub struct ClickHouseConnectionManager {
    http: Client,
    params: Arc<ConnectionParams>,
    url: String,
    max_execution_secs: u64,
}

impl std::fmt::Debug for ClickHouseConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseConnectionManager")
            .field("url", &self.url)
            .field("params", &self.params)
            .finish()
    }
}

impl ClickHouseConnectionManager {
    pub fn new(params: ConnectionParams, max_execution_time: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            // Exports stream for as long as they need; the server enforces
            // max_execution_time instead.
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| IngestError::ConnectionError(e.to_string()))?;
        Ok(Self {
            http,
            url: params.base_url(),
            params: Arc::new(params),
            max_execution_secs: max_execution_time.as_secs().max(1),
        })
    }
}

impl ManageConnection for ClickHouseConnectionManager {
    type Connection = ClickHouseConnection;
    type Error = IngestError;

    fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        Ok(ClickHouseConnection {
            http: self.http.clone(),
            params: Arc::clone(&self.params),
            url: self.url.clone(),
            max_execution_secs: self.max_execution_secs,
        })
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.ping()
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
