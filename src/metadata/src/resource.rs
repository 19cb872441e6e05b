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

//! Connection pools of a logical database.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{database_type::DatabaseType, Result};

/// Declarative description of a connection pool, not the live handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceProperties {
    pub pool_class_name: String,
    #[serde(default)]
    pub props: BTreeMap<String, String>,
}

impl DataSourceProperties {
    pub fn new(pool_class_name: impl Into<String>, props: BTreeMap<String, String>) -> Self {
        Self {
            pool_class_name: pool_class_name.into(),
            props,
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.props
            .get("url")
            .or_else(|| self.props.get("jdbcUrl"))
            .map(String::as_str)
    }
}

/// A live connection pool.
#[async_trait]
pub trait DataSource: fmt::Debug + Send + Sync {
    /// Dialect of the storage engine behind the pool.
    fn storage_type(&self) -> DatabaseType;

    /// Release every connection held by the pool.
    async fn close(&self) -> Result<()>;
}

pub type DataSourceRef = Arc<dyn DataSource>;

/// A pool handle together with the properties it was created from.
#[derive(Clone, Debug)]
pub struct StorageUnit {
    pub props: DataSourceProperties,
    pub data_source: DataSourceRef,
}

impl StorageUnit {
    pub fn new(props: DataSourceProperties, data_source: DataSourceRef) -> Self {
        Self { props, data_source }
    }

    pub fn storage_type(&self) -> DatabaseType {
        self.data_source.storage_type()
    }

    pub fn is_same_pool(&self, other: &StorageUnit) -> bool {
        Arc::ptr_eq(&self.data_source, &other.data_source)
    }
}

/// Pools of one database keyed by pool name.
///
/// A pool handle is owned by exactly one resource map; switching pools
/// builds a new map instead of sharing handles between old and new.
#[derive(Clone, Debug, Default)]
pub struct ResourceMetaData {
    units: BTreeMap<String, StorageUnit>,
}

impl ResourceMetaData {
    pub fn new(units: BTreeMap<String, StorageUnit>) -> Self {
        Self { units }
    }

    pub fn units(&self) -> &BTreeMap<String, StorageUnit> {
        &self.units
    }

    pub fn unit(&self, name: &str) -> Option<&StorageUnit> {
        self.units.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.contains_key(name)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.units.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn data_sources(&self) -> BTreeMap<String, DataSourceRef> {
        self.units
            .iter()
            .map(|(name, unit)| (name.clone(), unit.data_source.clone()))
            .collect()
    }

    pub fn data_source(&self, name: &str) -> Option<DataSourceRef> {
        self.units.get(name).map(|unit| unit.data_source.clone())
    }

    pub fn data_source_props(&self) -> BTreeMap<String, DataSourceProperties> {
        self.units
            .iter()
            .map(|(name, unit)| (name.clone(), unit.props.clone()))
            .collect()
    }

    pub fn storage_types(&self) -> BTreeMap<String, DatabaseType> {
        self.units
            .iter()
            .map(|(name, unit)| (name.clone(), unit.storage_type()))
            .collect()
    }

    /// Only keep the pool `name`, used for scoped discovery.
    pub fn subset(&self, name: &str) -> Option<ResourceMetaData> {
        self.units.get(name).map(|unit| ResourceMetaData {
            units: BTreeMap::from([(name.to_string(), unit.clone())]),
        })
    }

    /// Drop `stale` pools and put `created` ones over the remaining.
    pub fn switched(
        &self,
        stale: &BTreeSet<String>,
        created: &BTreeMap<String, StorageUnit>,
    ) -> ResourceMetaData {
        let mut units: BTreeMap<_, _> = self
            .units
            .iter()
            .filter(|(name, _)| !stale.contains(*name))
            .map(|(name, unit)| (name.clone(), unit.clone()))
            .collect();
        units.extend(created.iter().map(|(n, u)| (n.clone(), u.clone())));

        ResourceMetaData { units }
    }
}
