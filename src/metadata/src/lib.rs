// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! In-memory description of every logical database served by the proxy:
//! pools, rules and discovered schema.
//!
//! Everything in this crate is treated as an immutable value once it is
//! reachable from an installed snapshot. Changes are expressed by building
//! a new value (`with_*`/`without_*`) and swapping it in.

mod macros;

pub mod data;
pub mod database;
pub mod database_type;
pub mod error;
pub mod metadata;
pub mod props;
pub mod resource;
pub mod rule;
pub mod schema;

pub use error::{Error, Result};
