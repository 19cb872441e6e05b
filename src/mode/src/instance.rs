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

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cluster_state::ClusterStateContext;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeType {
    #[default]
    Standalone,
    Cluster,
}

/// Identity of this proxy instance.
#[derive(Debug)]
pub struct InstanceContext {
    id: String,
    mode_type: ModeType,
    cluster_state: ClusterStateContext,
}

impl InstanceContext {
    pub fn new(mode_type: ModeType) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), mode_type)
    }

    pub fn with_id(id: String, mode_type: ModeType) -> Self {
        Self {
            id,
            mode_type,
            cluster_state: ClusterStateContext::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode_type(&self) -> ModeType {
        self.mode_type
    }

    pub fn is_cluster(&self) -> bool {
        self.mode_type == ModeType::Cluster
    }

    pub fn cluster_state(&self) -> &ClusterStateContext {
        &self.cluster_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_are_unique() {
        let a = InstanceContext::new(ModeType::Cluster);
        let b = InstanceContext::new(ModeType::Cluster);
        assert_ne!(a.id(), b.id());
        assert!(a.is_cluster());
    }
}
