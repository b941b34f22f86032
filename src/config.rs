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

use crate::domain::entities::{Column, ConnectionParams, SemanticType};
use crate::domain::errors::{IngestError, Result};
use crate::domain::query_builder::FilterPolicy;
use crate::domain::value_conversion::ConversionMode;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::time::Duration;

pub const PASSWORD_ENV: &str = "CLICKHOUSE_PASSWORD";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: ConnectionParams,
    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Tuning knobs for transfers, previews and discovery.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TransferConfig {
    pub batch_size: usize,
    pub progress_report_size: u64,
    pub max_preview_rows: usize,
    pub sample_size: usize,
    pub channel_capacity: usize,
    pub progress_capacity: usize,
    pub flush_every: u64,
    pub discovery_timeout_secs: u64,
    pub preview_timeout_secs: u64,
    /// Zero-value fallback instead of skipping rows that fail conversion.
    pub lossy_conversion: bool,
    /// Allow a caller-supplied WHERE clause in join queries.
    pub trusted_join_filter: bool,
    pub pool_size: u32,
    pub query_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            progress_report_size: 5_000,
            max_preview_rows: 100,
            sample_size: 100,
            channel_capacity: 100,
            progress_capacity: 10,
            flush_every: 1_000,
            discovery_timeout_secs: 30,
            preview_timeout_secs: 30,
            lossy_conversion: false,
            trusted_join_filter: false,
            pool_size: 5,
            query_timeout_secs: 60,
        }
    }
}

impl TransferConfig {
    pub fn conversion_mode(&self) -> ConversionMode {
        ConversionMode::from_lossy(self.lossy_conversion)
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy::from_trusted(self.trusted_join_filter)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn preview_timeout(&self) -> Duration {
        Duration::from_secs(self.preview_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("batch_size", self.batch_size as u64),
            ("progress_report_size", self.progress_report_size),
            ("max_preview_rows", self.max_preview_rows as u64),
            ("sample_size", self.sample_size as u64),
            ("channel_capacity", self.channel_capacity as u64),
            ("progress_capacity", self.progress_capacity as u64),
            ("flush_every", self.flush_every),
            ("pool_size", self.pool_size as u64),
        ];
        for (name, value) in sizes {
            if value == 0 {
                return Err(IngestError::ConfigError(format!(
                    "transfer.{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Moves tables between ClickHouse and flat files", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    // Overrides for ad-hoc runs
    #[arg(long, global = true)]
    pub host: Option<String>,
    #[arg(long, global = true)]
    pub port: Option<u16>,
    #[arg(long, global = true)]
    pub database: Option<String>,
    #[arg(long, global = true)]
    pub user: Option<String>,
    #[arg(long, global = true)]
    pub password: Option<String>,
    #[arg(long, global = true)]
    pub token: Option<String>,
    #[arg(long, global = true)]
    pub secure: bool,
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,
    /// Keep rows that fail conversion, substituting zero values
    #[arg(long, global = true)]
    pub lossy: bool,
    /// Accept a WHERE clause in join specifications
    #[arg(long, global = true)]
    pub trusted_filter: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List tables in the configured database
    Tables,
    /// Infer column names and types from a flat file
    Discover(FileArgs),
    /// Show the first rows of a table or a flat file
    Preview {
        #[arg(long, conflicts_with = "file")]
        table: Option<String>,
        #[arg(long)]
        file: Option<String>,
        #[arg(long, default_value = ",")]
        delimiter: String,
        /// Comma separated column names
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Copy a table (or query result) into a flat file
    Export {
        #[arg(long)]
        table: String,
        #[command(flatten)]
        file: FileArgs,
        /// `name:Type` pairs; defaults to the table's own columns
        #[arg(long)]
        columns: Option<String>,
        #[arg(long)]
        query: Option<String>,
    },
    /// Load a flat file into a table, creating it when missing
    Import {
        #[command(flatten)]
        file: FileArgs,
        #[arg(long)]
        table: String,
        /// `name:Type` pairs; inferred from the file when omitted
        #[arg(long)]
        columns: Option<String>,
    },
    /// Build a join query from a JSON or YAML specification
    Join {
        #[arg(long)]
        spec: String,
        /// Also run the query and print up to this many rows
        #[arg(long)]
        preview: Option<usize>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    #[arg(short, long)]
    pub file: String,
    #[arg(long, default_value = ",")]
    pub delimiter: String,
}

fn read_to_string(path: &str) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| IngestError::ConfigError(format!("cannot open {}: {}", path, e)))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

/// Deserializes `path` as JSON when it ends in `.json`, otherwise as YAML.
pub fn load_document<T: serde::de::DeserializeOwned>(path: &str) -> Result<T> {
    let contents = read_to_string(path)?;
    if path.ends_with(".json") {
        serde_json::from_str(&contents)
            .map_err(|e| IngestError::ConfigError(format!("{}: {}", path, e)))
    } else {
        serde_yaml::from_str(&contents)
            .map_err(|e| IngestError::ConfigError(format!("{}: {}", path, e)))
    }
}

impl AppConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        load_document(path)
    }

    /// Configuration built purely from command-line flags.
    pub fn default_from_cli(args: &CliArgs) -> Self {
        let mut config = AppConfig {
            database: ConnectionParams::new("localhost", 8123),
            transfer: TransferConfig::default(),
        };
        config.merge_cli(args);
        config
    }

    pub fn merge_cli(&mut self, args: &CliArgs) {
        if let Some(h) = &args.host { self.database.host = h.clone(); }
        if let Some(p) = args.port { self.database.port = p; }
        if let Some(d) = &args.database { self.database.database = d.clone(); }
        if let Some(u) = &args.user { self.database.user = u.clone(); }
        if let Some(p) = &args.password { self.database.password = Some(p.clone()); }
        if let Some(t) = &args.token { self.database.token = Some(t.clone()); }
        if args.secure { self.database.secure = true; }
        if let Some(b) = args.batch_size { self.transfer.batch_size = b; }
        if args.lossy { self.transfer.lossy_conversion = true; }
        if args.trusted_filter { self.transfer.trusted_join_filter = true; }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.host.trim().is_empty() {
            return Err(IngestError::ConfigError("database.host is required".to_string()));
        }
        self.transfer.validate()
    }
}

/// Parses `id:Int64,name:Nullable(String)` into a column list.
pub fn parse_column_list(spec: &str) -> Result<Vec<Column>> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (name, ty) = pair.split_once(':').ok_or_else(|| {
                IngestError::ConfigError(format!("column `{}` must be written as name:Type", pair))
            })?;
            let col_type: SemanticType = ty
                .trim()
                .parse()
                .map_err(|e| IngestError::ConfigError(format!("column `{}`: {}", name, e)))?;
            Ok(Column::new(name.trim(), col_type))
        })
        .collect()
}
