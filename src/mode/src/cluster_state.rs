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

use std::{
    fmt,
    str::FromStr,
    sync::atomic::{AtomicU8, Ordering},
};

use tracing::info;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum ClusterState {
    #[default]
    Ok = 0,
    ReadOnly = 1,
    Unavailable = 2,
}

impl ClusterState {
    pub fn name(&self) -> &'static str {
        match self {
            ClusterState::Ok => "OK",
            ClusterState::ReadOnly => "READ_ONLY",
            ClusterState::Unavailable => "UNAVAILABLE",
        }
    }

    fn from_u8(value: u8) -> ClusterState {
        match value {
            1 => ClusterState::ReadOnly,
            2 => ClusterState::Unavailable,
            _ => ClusterState::Ok,
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names are matched exactly, as published by the coordination store.
impl FromStr for ClusterState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [
            ClusterState::Ok,
            ClusterState::ReadOnly,
            ClusterState::Unavailable,
        ]
        .into_iter()
        .find(|state| state.name() == s)
        .ok_or_else(|| format!("unknown cluster state: {s}"))
    }
}

/// Current state of the cluster this instance belongs to.
#[derive(Debug, Default)]
pub struct ClusterStateContext {
    state: AtomicU8,
}

impl ClusterStateContext {
    pub fn state(&self) -> ClusterState {
        ClusterState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn switch_state(&self, state: ClusterState) {
        let previous = self.state.swap(state as u8, Ordering::AcqRel);
        if previous != state as u8 {
            info!(
                from = %ClusterState::from_u8(previous),
                to = %state,
                "Cluster state switched"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state() {
        assert_eq!("READ_ONLY".parse::<ClusterState>(), Ok(ClusterState::ReadOnly));
        assert!("read_only".parse::<ClusterState>().is_err());
        assert!("DEGRADED".parse::<ClusterState>().is_err());
    }

    #[test]
    fn test_switch_state() {
        let ctx = ClusterStateContext::default();
        assert_eq!(ctx.state(), ClusterState::Ok);
        ctx.switch_state(ClusterState::Unavailable);
        assert_eq!(ctx.state(), ClusterState::Unavailable);
    }
}
