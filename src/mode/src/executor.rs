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

use std::sync::{Mutex, PoisonError};

use anyhow::Context;
use metadata::props::GlobalProperties;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::info;

use crate::Result;

const THREAD_NAME: &str = "kernel-executor";

/// Worker pool executing query work, sized by `kernel-executor-size`.
#[derive(Debug)]
pub struct ExecutorEngine {
    size: usize,
    runtime: Mutex<Option<Runtime>>,
}

impl ExecutorEngine {
    pub fn try_new(props: &GlobalProperties) -> Result<Self> {
        let size = match props.kernel_executor_size()? {
            0 => num_cpus::get() * 2,
            n => n,
        };
        let runtime = Builder::new_multi_thread()
            .thread_name(THREAD_NAME)
            .worker_threads(size)
            .enable_all()
            .build()
            .context("build executor runtime")?;
        info!(size, "Executor engine started");

        Ok(Self {
            size,
            runtime: Mutex::new(Some(runtime)),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Handle to submit work, `None` once closed.
    pub fn handle(&self) -> Option<Handle> {
        self.runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|rt| rt.handle().clone())
    }

    pub fn is_closed(&self) -> bool {
        self.handle().is_none()
    }

    /// Stop the workers without waiting for running tasks. Idempotent.
    pub fn close(&self) {
        let runtime = self
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(runtime) = runtime {
            runtime.shutdown_background();
            info!("Executor engine closed");
        }
    }
}

impl Drop for ExecutorEngine {
    fn drop(&mut self) {
        self.close();
    }
}
