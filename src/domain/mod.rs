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

//! Types and algorithms shared by every layer. Nothing in here touches the
//! network or the filesystem.

pub mod cancellation;
pub mod entities;
pub mod errors;
pub mod progress;
pub mod query_builder;
pub mod type_inference;
pub mod value_conversion;
