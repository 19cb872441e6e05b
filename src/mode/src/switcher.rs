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

//! Compute and apply the pools to create and retire when pool properties
//! change.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::join_all;
use metadata::resource::{DataSourceProperties, DataSourceRef, ResourceMetaData, StorageUnit};
use tracing::{info, warn};

use crate::Result;

/// Creates live pools from their properties.
#[async_trait]
pub trait DataSourceCreator: Send + Sync {
    async fn create(&self, name: &str, props: &DataSourceProperties) -> Result<DataSourceRef>;
}

pub type DataSourceCreatorRef = Arc<dyn DataSourceCreator>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchMode {
    /// The proposal only lists pools to add or change, absent pools survive.
    Overlay,
    /// The proposal is the whole new pool set, absent pools are retired.
    Replace,
}

/// Names of the pools to create and to retire.
///
/// A pool whose properties changed is in both sets: a fresh handle is
/// created under its name and the old handle retired. Handles never appear
/// on both sides.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwitchPlan {
    pub to_be_created: BTreeMap<String, DataSourceProperties>,
    pub to_be_stale: BTreeSet<String>,
}

impl SwitchPlan {
    pub fn compute(
        current: &BTreeMap<String, DataSourceProperties>,
        proposed: &BTreeMap<String, DataSourceProperties>,
        mode: SwitchMode,
    ) -> SwitchPlan {
        let to_be_created = proposed
            .iter()
            .filter(|(name, props)| current.get(*name) != Some(*props))
            .map(|(name, props)| (name.clone(), props.clone()))
            .collect();

        let to_be_stale = current
            .iter()
            .filter(|(name, props)| match proposed.get(*name) {
                Some(proposed) => proposed != *props,
                None => mode == SwitchMode::Replace,
            })
            .map(|(name, _)| name.clone())
            .collect();

        SwitchPlan {
            to_be_created,
            to_be_stale,
        }
    }
}

/// A plan with its new pools created, ready to be merged into a candidate
/// resource map.
#[derive(Debug, Default)]
pub struct SwitchingResource {
    new_units: BTreeMap<String, StorageUnit>,
    stale_units: BTreeMap<String, StorageUnit>,
}

impl SwitchingResource {
    /// A switch that only retires `units`.
    pub fn retiring(units: BTreeMap<String, StorageUnit>) -> Self {
        Self {
            new_units: BTreeMap::new(),
            stale_units: units,
        }
    }

    pub fn new_units(&self) -> &BTreeMap<String, StorageUnit> {
        &self.new_units
    }

    pub fn stale_units(&self) -> &BTreeMap<String, StorageUnit> {
        &self.stale_units
    }

    /// Resource map with the stale pools removed and the new ones added.
    pub fn switched_resource(&self, current: &ResourceMetaData) -> ResourceMetaData {
        let stale = self.stale_units.keys().cloned().collect();
        current.switched(&stale, &self.new_units)
    }

    /// Close the pools retired by the switch, once the new state is
    /// installed.
    pub async fn close_stale_data_sources(&self) {
        close_units("stale", &self.stale_units).await;
    }

    /// Close the pools created for a switch that was never installed.
    pub async fn close_new_data_sources(&self) {
        close_units("new", &self.new_units).await;
    }
}

pub(crate) async fn close_units(kind: &str, units: &BTreeMap<String, StorageUnit>) {
    let closing = units.iter().map(|(name, unit)| async move {
        if let Err(e) = unit.data_source.close().await {
            warn!(data_source = name, kind, err = %e, "Failed to close data source");
        }
    });
    join_all(closing).await;
    if !units.is_empty() {
        info!(kind, count = units.len(), "Data sources closed");
    }
}

pub struct ResourceSwitchManager {
    creator: DataSourceCreatorRef,
}

impl ResourceSwitchManager {
    pub fn new(creator: DataSourceCreatorRef) -> Self {
        Self { creator }
    }

    /// Switch for a proposal listing only added or changed pools.
    pub async fn create(
        &self,
        resource: &ResourceMetaData,
        proposed: &BTreeMap<String, DataSourceProperties>,
    ) -> Result<SwitchingResource> {
        self.switch(resource, proposed, SwitchMode::Overlay).await
    }

    /// Switch for a proposal that is the whole new pool set.
    pub async fn create_by_alter_data_source_props(
        &self,
        resource: &ResourceMetaData,
        proposed: &BTreeMap<String, DataSourceProperties>,
    ) -> Result<SwitchingResource> {
        self.switch(resource, proposed, SwitchMode::Replace).await
    }

    async fn switch(
        &self,
        resource: &ResourceMetaData,
        proposed: &BTreeMap<String, DataSourceProperties>,
        mode: SwitchMode,
    ) -> Result<SwitchingResource> {
        let plan = SwitchPlan::compute(&resource.data_source_props(), proposed, mode);
        let new_units = self.create_units(&plan.to_be_created).await?;
        let stale_units = resource
            .units()
            .iter()
            .filter(|(name, _)| plan.to_be_stale.contains(*name))
            .map(|(name, unit)| (name.clone(), unit.clone()))
            .collect();

        Ok(SwitchingResource {
            new_units,
            stale_units,
        })
    }

    /// Create every pool, or none: pools created before a failure are
    /// closed again.
    async fn create_units(
        &self,
        to_be_created: &BTreeMap<String, DataSourceProperties>,
    ) -> Result<BTreeMap<String, StorageUnit>> {
        let creating = to_be_created.iter().map(|(name, props)| async move {
            let data_source = self.creator.create(name, props).await?;
            Ok::<_, crate::Error>((name.clone(), StorageUnit::new(props.clone(), data_source)))
        });

        let mut created = BTreeMap::new();
        let mut first_error = None;
        for result in join_all(creating).await {
            match result {
                Ok((name, unit)) => {
                    created.insert(name, unit);
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(created),
            Some(e) => {
                close_units("new", &created).await;
                Err(e)
            }
        }
    }
}
