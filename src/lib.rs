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

//! # ClickHouse Flat-File Ingestor
//!
//! Streams tables between ClickHouse and delimited flat files in both
//! directions, with schema inference, incremental progress and cooperative
//! cancellation.
//!
//! The crate follows a **Hexagonal Architecture** (Ports and Adapters):
//! `domain` holds the types and pure algorithms, `ports` the store
//! contract, `infrastructure` the ClickHouse and flat-file adapters, and
//! `application` wires them into transfers.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod ports;
