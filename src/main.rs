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

//! Command-line front end. Progress events and query results are printed to
//! stdout as one JSON object per line; logs go to stderr.

use clap::Parser;
use crossbeam_channel::Receiver;
use ingestor::application::ingest_service::IngestService;
use ingestor::application::runtime::RuntimeContext;
use ingestor::config::{load_document, parse_column_list, AppConfig, CliArgs, Command};
use ingestor::domain::cancellation::CancelToken;
use ingestor::domain::entities::{
    Column, FlatFileParams, JoinSpec, PreviewRequest, ProgressUpdate, Record, SemanticType,
    SourceKind,
};
use ingestor::domain::errors::{IngestError, Result};
use log::{error, info};
use std::process;
use std::thread;

fn main() {
    // 1. Initialize Logging
    env_logger::init();

    // 2. Parse Arguments
    let args = CliArgs::parse();

    // 3. Load Config
    let mut config = if let Some(config_path) = &args.config {
        match AppConfig::from_file(config_path) {
            Ok(c) => c,
            Err(e) => {
                error!("Failed to load config: {}", e);
                process::exit(1);
            }
        }
    } else {
        AppConfig::default_from_cli(&args)
    };

    // Merge CLI overrides
    config.merge_cli(&args);

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(args.command, &config) {
        error!("{}", e);
        process::exit(1);
    }
}

fn connect(config: &AppConfig) -> Result<IngestService> {
    let ctx = RuntimeContext::init(config)?;
    IngestService::connect(ctx.store, config.transfer.clone())
}

fn run(command: Command, config: &AppConfig) -> Result<()> {
    let cancel = CancelToken::new();
    match command {
        Command::Tables => {
            for table in connect(config)?.list_tables()? {
                println!("{}", table);
            }
        }
        Command::Discover(file) => {
            let service = IngestService::offline(config.transfer.clone());
            let columns = service.discover_schema(&cancel, &file.file, &file.delimiter)?;
            print_json(&columns)?;
        }
        Command::Preview {
            table,
            file,
            delimiter,
            columns,
            limit,
        } => {
            let columns: Vec<Column> = columns
                .iter()
                .map(|name| Column::new(name.as_str(), SemanticType::STRING))
                .collect();
            let (service, request) = match (table, file) {
                (Some(table), _) => (
                    connect(config)?,
                    PreviewRequest {
                        source_type: SourceKind::ClickHouse,
                        table_name: table,
                        flat_file_params: None,
                        columns,
                    },
                ),
                (None, Some(path)) => (
                    IngestService::offline(config.transfer.clone()),
                    PreviewRequest {
                        source_type: SourceKind::FlatFile,
                        table_name: String::new(),
                        flat_file_params: Some(FlatFileParams::new(path, delimiter)),
                        columns,
                    },
                ),
                (None, None) => {
                    return Err(IngestError::ConfigError(
                        "preview needs --table or --file".to_string(),
                    ))
                }
            };
            print_records(&service.preview_rows(&cancel, &request, limit)?)?;
        }
        Command::Export {
            table,
            file,
            columns,
            query,
        } => {
            let service = connect(config)?;
            let columns = match columns {
                Some(spec) => parse_column_list(&spec)?,
                None => service.table_columns(&table)?,
            };
            let params = FlatFileParams::new(file.file, file.delimiter);
            let (tx, rx) = crossbeam_channel::bounded(config.transfer.progress_capacity);
            let printer = spawn_progress_printer(rx)?;
            let result =
                service.ingest_store_to_file(&cancel, &table, &columns, &params, query.as_deref(), tx);
            let _ = printer.join();
            info!("Exported {} rows", result?.total_records);
        }
        Command::Import {
            file,
            table,
            columns,
        } => {
            let service = connect(config)?;
            let columns = match columns {
                Some(spec) => parse_column_list(&spec)?,
                None => service.discover_schema(&cancel, &file.file, &file.delimiter)?,
            };
            let params = FlatFileParams::new(file.file, file.delimiter);
            let (tx, rx) = crossbeam_channel::bounded(config.transfer.progress_capacity);
            let printer = spawn_progress_printer(rx)?;
            let result = service.ingest_file_to_store(&cancel, &params, &table, &columns, tx);
            let _ = printer.join();
            info!("Imported {} rows", result?.total_records);
        }
        Command::Join { spec, preview } => {
            let spec: JoinSpec = load_document(&spec)?;
            let offline = IngestService::offline(config.transfer.clone());
            let query = offline.build_join_query(&spec)?;
            println!("{}", query);
            if let Some(limit) = preview {
                let rows = connect(config)?.preview_join(&cancel, &query, limit)?;
                print_records(&rows)?;
            }
        }
    }
    Ok(())
}

/// Prints every progress event until the pipeline closes the stream.
fn spawn_progress_printer(rx: Receiver<ProgressUpdate>) -> Result<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            for update in rx.iter() {
                println!("{}", update.to_json());
            }
        })?;
    Ok(handle)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| IngestError::ValidationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn print_records(rows: &[Record]) -> Result<()> {
    for row in rows {
        let line =
            serde_json::to_string(row).map_err(|e| IngestError::ValidationError(e.to_string()))?;
        println!("{}", line);
    }
    Ok(())
}
