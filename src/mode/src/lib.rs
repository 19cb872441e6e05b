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

//! Context manager of the proxy: owns the current metadata snapshot and
//! applies configuration changes by building a replacement and swapping it
//! in atomically.

mod cluster_state;
mod config;
mod contexts;
mod discovery;
mod error;
mod executor;
mod factory;
mod instance;
mod manager;
pub mod persist;
mod switcher;
#[cfg(test)]
mod test_util;

pub use self::{
    cluster_state::{ClusterState, ClusterStateContext},
    config::{Config, ModeConfig, StaleResourceConfig},
    contexts::MetaDataContexts,
    discovery::{DiscoveryMaterial, SchemaDiscovery, SchemaDiscoveryRef},
    error::{Error, Result},
    executor::ExecutorEngine,
    factory::MetaDataFactory,
    instance::{InstanceContext, ModeType},
    manager::{AlterSchemaRequest, ContextManager},
    switcher::{
        DataSourceCreator, DataSourceCreatorRef, ResourceSwitchManager, SwitchMode, SwitchPlan,
        SwitchingResource,
    },
};
