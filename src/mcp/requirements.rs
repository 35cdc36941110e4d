// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Requirement sidecars.
//!
//! Some servers need a dependency (a database) running before they start.
//! The sidecar is pulled, started under a random container name, and its
//! stdout is polled for a readiness marker. The main server then joins the
//! sidecar's network namespace, which is what makes the exported localhost
//! URL valid.

use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::constants::requirements::{self, neo4j};
use crate::core::errors::{ClientError, Result};
use crate::mcp::launcher::ContainerRuntime;
use crate::mcp::pipeline::{self, OutputCapture};
use crate::mcp::process::{ProcessExit, ProcessSupervisor};

/// A sidecar kind this client knows how to start.
#[derive(Debug)]
pub struct Requirement {
    pub name: &'static str,
    pub image: &'static str,
    pub ready_marker: &'static str,
    /// `-e` flags for the sidecar itself.
    pub run_env: &'static [&'static str],
    /// Variables handed to the main server.
    pub exports: &'static [(&'static str, &'static str)],
}

const SUPPORTED: &[Requirement] = &[Requirement {
    name: neo4j::NAME,
    image: neo4j::IMAGE,
    ready_marker: neo4j::READY_MARKER,
    run_env: &[neo4j::AUTH_ENV],
    exports: &[(neo4j::URL_ENV, neo4j::URL)],
}];

pub fn lookup(name: &str) -> Result<&'static Requirement> {
    SUPPORTED
        .iter()
        .find(|requirement| requirement.name == name)
        .ok_or_else(|| ClientError::UnsupportedRequirement(name.to_string()))
}

impl Requirement {
    fn container_name(&self) -> String {
        let mut rng = rand::rng();
        let suffix: String = (0..requirements::NAME_SUFFIX_LEN)
            .map(|_| char::from(b'a' + rng.random_range(0..26u8)))
            .collect();
        format!("{}-{}", self.name, suffix)
    }

    fn run_args(&self, container_name: &str) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--name".to_string(),
            container_name.to_string(),
            "--rm".to_string(),
            "--init".to_string(),
        ];
        for env in self.run_env {
            args.push("-e".to_string());
            args.push(env.to_string());
        }
        args.push(self.image.to_string());
        args
    }
}

/// A running, ready sidecar. Dropping the handle signals it to stop; `stop`
/// also waits for it to go away.
pub struct RequirementHandle {
    name: String,
    container_name: String,
    env: Vec<(String, String)>,
    supervisor: ProcessSupervisor,
}

impl RequirementHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Variables the main server needs to reach the sidecar.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// `docker run` flags that put the main server in the sidecar's network.
    pub fn network_args(&self) -> Vec<String> {
        vec![
            "--network".to_string(),
            format!("container:{}", self.container_name),
        ]
    }

    /// Stop the sidecar and wait for it to exit.
    pub async fn stop(mut self) -> ProcessExit {
        info!("Stopping requirement {}", self.container_name);
        self.supervisor.terminate();
        self.supervisor.wait_exit().await
    }
}

/// Start the named sidecar and wait until it reports ready.
pub async fn satisfy(runtime: &ContainerRuntime, name: &str) -> Result<RequirementHandle> {
    satisfy_within(
        runtime,
        name,
        Duration::from_secs(requirements::READY_TIMEOUT_SECS),
    )
    .await
}

/// `satisfy` with an explicit readiness ceiling. The pull is not counted.
pub async fn satisfy_within(
    runtime: &ContainerRuntime,
    name: &str,
    timeout: Duration,
) -> Result<RequirementHandle> {
    let requirement = lookup(name)?;

    // Pull outside the readiness deadline.
    runtime.pull(requirement.image).await?;

    let container_name = requirement.container_name();
    let mut command = runtime.command();
    command
        .args(requirement.run_args(&container_name))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let spawned = ProcessSupervisor::spawn(command, &container_name)?;
    let mut supervisor = spawned.supervisor;
    let capture = OutputCapture::new();
    if let Some(stdout) = spawned.stdout {
        pipeline::spawn_output_drain(container_name.clone(), stdout, capture.clone(), false);
    }

    info!("Waiting for requirement {} ({})", name, container_name);
    let ready = wait_for_marker(
        &capture,
        requirement.ready_marker,
        Duration::from_millis(requirements::POLL_INTERVAL_MS),
        timeout,
    )
    .await;

    if !ready {
        warn!("Requirement {} never became ready", container_name);
        supervisor.terminate();
        supervisor.wait_exit().await;
        return Err(ClientError::RequirementNotReady {
            name: name.to_string(),
            output: capture.snapshot(),
        });
    }

    debug!("Requirement {} is ready", container_name);
    Ok(RequirementHandle {
        name: name.to_string(),
        container_name,
        env: requirement
            .exports
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
        supervisor,
    })
}

/// Poll `capture` every `interval` until it contains `marker` or `timeout`
/// has elapsed. Runs on the caller's task.
pub async fn wait_for_marker(
    capture: &OutputCapture,
    marker: &str,
    interval: Duration,
    timeout: Duration,
) -> bool {
    let start = Instant::now();
    loop {
        tokio::time::sleep(interval).await;
        if capture.snapshot().contains(marker) {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
    }
}
