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

//! # Runtime Context
//!
//! Owns the resources shared by every transfer for the life of the process:
//! the pooled ClickHouse handle and the store adapter built on it. Transfers
//! borrow the store through `Arc<dyn TabularStore>`; nothing here is global.

use crate::config::{AppConfig, PASSWORD_ENV};
use crate::domain::errors::{IngestError, Result};
use crate::infrastructure::clickhouse::clickhouse_store_adapter::ClickHouseStoreAdapter;
use crate::infrastructure::clickhouse::connection_manager::ClickHouseConnectionManager;
use crate::ports::store_port::TabularStore;
use log::info;
use r2d2::Pool;
use std::sync::Arc;
use std::time::Duration;

const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RuntimeContext {
    pub pool: Arc<Pool<ClickHouseConnectionManager>>,
    pub store: Arc<dyn TabularStore>,
}

impl RuntimeContext {
    /// Builds the connection pool. No query is sent until the first checkout.
    pub fn init(config: &AppConfig) -> Result<Self> {
        let mut params = config.database.clone();
        // Password from the config file or CLI first, then the environment.
        if params.password.is_none() {
            params.password = std::env::var(PASSWORD_ENV).ok();
        }

        info!(
            "Initializing connection pool for {} (database {}, {} connections)",
            params.base_url(),
            params.database,
            config.transfer.pool_size
        );

        let manager = ClickHouseConnectionManager::new(params, config.transfer.query_timeout())?;
        let pool = Pool::builder()
            .max_size(config.transfer.pool_size)
            .connection_timeout(CHECKOUT_TIMEOUT)
            .build(manager)
            .map_err(|e| {
                IngestError::ConnectionError(format!("Failed to create connection pool: {}", e))
            })?;
        let pool = Arc::new(pool);

        Ok(Self {
            store: Arc::new(ClickHouseStoreAdapter::new(Arc::clone(&pool))),
            pool,
        })
    }
}
