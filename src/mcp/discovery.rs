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

//! End-to-end discovery for one registry server.
//!
//! requirement (if any) → start → initialize → list → close → normalize.
//! The sidecar is stopped on every path: explicitly on the way out, and by
//! its handle's drop when an earlier step fails.

use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::constants::{handshake, requirements};
use crate::core::errors::Result;
use crate::core::models::CallToolResult;
use crate::mcp::launcher::{ContainerRuntime, LaunchSpec};
use crate::mcp::requirements::{satisfy_within, RequirementHandle};
use crate::mcp::session::Session;
use crate::schema::normalizer;
use crate::schema::types::{Prompt, Tool};
use crate::servers::Server;

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Pull the server image before starting it.
    pub pull: bool,
    /// Remove the server image after closing.
    pub cleanup: bool,
    /// Forward server stderr at info level.
    pub debug: bool,
    pub runtime: ContainerRuntime,
    pub protocol_version: String,
    pub handshake_timeout: Duration,
    /// How long a sidecar may take to print its ready marker.
    pub requirement_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            pull: false,
            cleanup: false,
            debug: false,
            runtime: ContainerRuntime::default(),
            protocol_version: handshake::DEFAULT_PROTOCOL_VERSION.to_string(),
            handshake_timeout: Duration::from_secs(handshake::TIMEOUT_SECS),
            requirement_timeout: Duration::from_secs(requirements::READY_TIMEOUT_SECS),
        }
    }
}

/// Launch description for `server`, joined to the sidecar's network if one runs.
pub fn launch_spec(server: &Server, pull: bool, requirement: Option<&RequirementHandle>) -> LaunchSpec {
    let (args, extra_env) = match requirement {
        Some(handle) => (handle.network_args(), handle.env().to_vec()),
        None => (Vec::new(), Vec::new()),
    };
    LaunchSpec {
        image: server.image.clone(),
        pull,
        env: server.environment(&extra_env),
        secrets: server.config.secrets.clone(),
        args,
        command: server.run.command.clone(),
    }
}

struct OpenSession {
    session: Session,
    requirement: Option<RequirementHandle>,
}

async fn open(server: &Server, options: &DiscoveryOptions) -> Result<OpenSession> {
    let requirement = match server.requirement() {
        Some(name) => {
            Some(satisfy_within(&options.runtime, name, options.requirement_timeout).await?)
        }
        None => None,
    };

    let spec = launch_spec(server, options.pull, requirement.as_ref());
    let mut session = Session::new(spec, options.runtime.clone())
        .with_handshake_timeout(options.handshake_timeout)
        .with_stderr_echo(options.debug);
    if let Err(err) = session.start_and_initialize(&options.protocol_version).await {
        // Nothing else owns the children yet; stop them before reporting.
        if session.is_started() {
            if let Err(close_err) = session.close(false).await {
                debug!("Closing {} after failed start: {}", session.label(), close_err);
            }
        }
        if let Some(handle) = requirement {
            let exit = handle.stop().await;
            debug!("Requirement exited with code {:?}", exit.code);
        }
        return Err(err);
    }

    Ok(OpenSession {
        session,
        requirement,
    })
}

async fn finish<T>(open: OpenSession, cleanup: bool, result: Result<T>) -> Result<T> {
    let OpenSession {
        mut session,
        requirement,
    } = open;
    let closed = session.close(cleanup).await;
    if let Some(handle) = requirement {
        let exit = handle.stop().await;
        debug!("Requirement exited with code {:?}", exit.code);
    }

    let value = result?;
    if let Err(err) = &closed {
        warn!("Closing {}: {}", session.label(), err);
    }
    closed?;
    Ok(value)
}

/// Normalized tool list of `server`.
pub async fn discover_tools(server: &Server, options: &DiscoveryOptions) -> Result<Vec<Tool>> {
    let open = open(server, options).await?;
    let result = open.session.list_tools().await;
    let raw = finish(open, options.cleanup, result).await?;
    Ok(normalizer::normalize_tools(&raw))
}

/// Normalized prompt list of `server`.
pub async fn discover_prompts(server: &Server, options: &DiscoveryOptions) -> Result<Vec<Prompt>> {
    let open = open(server, options).await?;
    let result = open.session.list_prompts().await;
    let raw = finish(open, options.cleanup, result).await?;
    Ok(normalizer::normalize_prompts(&raw))
}

/// Start `server`, call one tool, and shut everything down again.
pub async fn smoke_call(
    server: &Server,
    options: &DiscoveryOptions,
    tool: &str,
    arguments: Option<Map<String, Value>>,
) -> Result<CallToolResult> {
    let open = open(server, options).await?;
    let result = open.session.call_tool(tool, arguments).await;
    finish(open, options.cleanup, result).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_spec_without_requirement_uses_server_fields() {
        let server = Server::from_yaml_str(
            "name: fs\nimage: mcp/fs\nrun:\n  command: [\"/data\"]\n  env:\n    MODE: ro\nconfig:\n  env:\n    - name: ROOT\n      example: /tmp\n",
        )
        .unwrap();
        let spec = launch_spec(&server, true, None);
        assert!(spec.pull);
        assert!(spec.args.is_empty());
        assert_eq!(spec.command, ["/data"]);
        let env = spec.environment();
        assert_eq!(
            env,
            [
                ("ROOT".to_string(), "/tmp".to_string()),
                ("MODE".to_string(), "ro".to_string()),
            ]
        );
    }

    #[test]
    fn defaults_match_handshake_constants() {
        let options = DiscoveryOptions::default();
        assert_eq!(options.protocol_version, "2024-11-05");
        assert_eq!(options.handshake_timeout, Duration::from_secs(60));
        assert_eq!(options.runtime.binary(), "docker");
    }

    #[tokio::test]
    async fn unsupported_requirement_aborts_before_launch() {
        let server =
            Server::from_yaml_str("name: db\nimage: mcp/db\nrequirement: postgres\n").unwrap();
        let options = DiscoveryOptions {
            runtime: ContainerRuntime::new("/nonexistent/mcp-dock-runtime"),
            ..Default::default()
        };
        let err = discover_tools(&server, &options).await.unwrap_err();
        assert!(err.is_usage_error());
    }
}
