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

use std::sync::Arc;

use metadata::{data::StatisticsData, metadata::MetaData};

use crate::{persist::PersistServiceRef, Result};

/// The snapshot: everything a query reads, immutable once installed.
#[derive(Debug, Clone)]
pub struct MetaDataContexts {
    persist: PersistServiceRef,
    metadata: Arc<MetaData>,
    statistics: Arc<StatisticsData>,
}

impl MetaDataContexts {
    pub fn new(persist: PersistServiceRef, metadata: MetaData, statistics: StatisticsData) -> Self {
        Self {
            persist,
            metadata: Arc::new(metadata),
            statistics: Arc::new(statistics),
        }
    }

    pub fn persist(&self) -> &PersistServiceRef {
        &self.persist
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    pub fn statistics(&self) -> &StatisticsData {
        &self.statistics
    }

    /// Same store and row cache, new metadata.
    pub fn with_metadata(&self, metadata: MetaData) -> MetaDataContexts {
        MetaDataContexts {
            persist: self.persist.clone(),
            metadata: Arc::new(metadata),
            statistics: self.statistics.clone(),
        }
    }

    pub fn with_statistics(&self, statistics: StatisticsData) -> MetaDataContexts {
        MetaDataContexts {
            persist: self.persist.clone(),
            metadata: self.metadata.clone(),
            statistics: Arc::new(statistics),
        }
    }

    pub async fn close(&self) -> Result<()> {
        self.persist.close().await
    }
}
