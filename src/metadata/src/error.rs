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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid property, key:{key}, value:{value}, err:{msg}")]
    InvalidProperty {
        key: String,
        value: String,
        msg: String,
    },

    #[error("Failed to build rules, scope:{scope}, failures:[{}]", .failures.join("; "))]
    BuildRules { scope: String, failures: Vec<String> },

    #[error("Failed to convert row value, table:{table}, column:{column}, value:{value}")]
    ConvertRowValue {
        table: String,
        column: String,
        value: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
