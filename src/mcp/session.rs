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

//! One MCP server instance: start, handshake, list, call, close.
//!
//! A session owns at most one transport. `start` installs it only after the
//! process is actually running, so a failed pull or spawn leaves the session
//! untouched. Listing and calling take `&self` and may run concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::core::constants::{calls, handshake, methods};
use crate::core::errors::{ClientError, Result};
use crate::core::models::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, ListPromptsResult,
    ListToolsResult, RawPrompt, RawTool,
};
use crate::mcp::launcher::{ContainerRuntime, LaunchSpec};
use crate::mcp::transport::StdioTransport;

pub struct Session {
    label: String,
    spec: Option<LaunchSpec>,
    runtime: ContainerRuntime,
    echo_stderr: bool,
    handshake_timeout: Duration,
    transport: Option<StdioTransport>,
    handshake_started: AtomicBool,
    initialized: AtomicBool,
}

impl Session {
    pub fn new(spec: LaunchSpec, runtime: ContainerRuntime) -> Self {
        Self {
            label: spec.image.clone(),
            spec: Some(spec),
            runtime,
            echo_stderr: false,
            handshake_timeout: Duration::from_secs(handshake::TIMEOUT_SECS),
            transport: None,
            handshake_started: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        }
    }

    /// Wrap an already running transport. The session counts as started.
    pub fn from_transport(label: &str, transport: StdioTransport) -> Self {
        Self {
            label: label.to_string(),
            spec: None,
            runtime: ContainerRuntime::default(),
            echo_stderr: false,
            handshake_timeout: Duration::from_secs(handshake::TIMEOUT_SECS),
            transport: Some(transport),
            handshake_started: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Forward server stderr to the log at info level instead of debug.
    pub fn with_stderr_echo(mut self, echo: bool) -> Self {
        self.echo_stderr = echo;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn transport(&self) -> Option<&StdioTransport> {
        self.transport.as_ref()
    }

    pub fn is_started(&self) -> bool {
        self.transport.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Pull (if asked) and launch the server container.
    pub async fn start(&mut self) -> Result<()> {
        if self.transport.is_some() {
            return Err(ClientError::AlreadyStarted(self.label.clone()));
        }
        let spec = self
            .spec
            .as_ref()
            .ok_or_else(|| ClientError::Configuration(format!("{}: nothing to launch", self.label)))?;
        let transport = self.runtime.launch(spec, self.echo_stderr).await?;
        self.transport = Some(transport);
        Ok(())
    }

    /// Perform the `initialize` handshake, then send `notifications/initialized`.
    ///
    /// Bounded by the handshake timeout and raced against process exit; either
    /// failure carries the server's stderr. Only one attempt is allowed per
    /// session.
    pub async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| ClientError::NotStarted(self.label.clone()))?;
        if self.handshake_started.swap(true, Ordering::AcqRel) {
            return Err(ClientError::AlreadyInitialized(self.label.clone()));
        }

        let params = serde_json::to_value(&params)?;
        let outcome = tokio::select! {
            biased;
            result = transport.request_with_timeout(
                methods::INITIALIZE,
                Some(params),
                self.handshake_timeout,
            ) => result,
            exit = transport.process_exited() => {
                debug!("{}: exited during handshake with {:?}", self.label, exit.code);
                Err(ClientError::TransportClosed)
            }
        };

        let value = match outcome {
            Ok(value) => value,
            Err(err) => {
                let err = match err {
                    ClientError::Timeout { .. } | ClientError::TransportClosed => {
                        let stderr = transport.stderr_output().await;
                        ClientError::Handshake {
                            image: self.label.clone(),
                            stderr: if stderr.is_empty() { err.to_string() } else { stderr },
                        }
                    }
                    other => other,
                };
                warn!("{}", err);
                transport.close();
                return Err(err);
            }
        };

        let result: InitializeResult = serde_json::from_value(value)?;
        transport.notify(methods::INITIALIZED, None).await?;
        self.initialized.store(true, Ordering::Release);
        info!(
            "{}: initialized {} {} (protocol {})",
            self.label, result.server_info.name, result.server_info.version, result.protocol_version
        );
        Ok(result)
    }

    /// `start` followed by `initialize` with the default client identity.
    pub async fn start_and_initialize(&mut self, protocol_version: &str) -> Result<InitializeResult> {
        self.start().await?;
        self.initialize(InitializeParams::new(protocol_version)).await
    }

    fn ready(&self) -> Result<&StdioTransport> {
        match &self.transport {
            Some(transport) if self.is_initialized() => Ok(transport),
            _ => Err(ClientError::NotStarted(self.label.clone())),
        }
    }

    pub async fn list_tools(&self) -> Result<Vec<RawTool>> {
        let value = self.ready()?.request(methods::TOOLS_LIST, Some(json!({}))).await?;
        let result: ListToolsResult = serde_json::from_value(value)?;
        Ok(result.tools)
    }

    pub async fn list_prompts(&self) -> Result<Vec<RawPrompt>> {
        let value = self.ready()?.request(methods::PROMPTS_LIST, Some(json!({}))).await?;
        let result: ListPromptsResult = serde_json::from_value(value)?;
        Ok(result.prompts)
    }

    /// Call a tool. Empty or missing arguments get a placeholder entry, since
    /// some servers reject an empty arguments object.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult> {
        let transport = self.ready()?;
        let mut arguments = arguments.unwrap_or_default();
        if arguments.is_empty() {
            arguments.insert(
                calls::PLACEHOLDER_ARG_NAME.to_string(),
                Value::String(calls::PLACEHOLDER_ARG_VALUE.to_string()),
            );
        }
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        let value = transport.request(methods::TOOLS_CALL, Some(params)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Terminate the server and optionally remove its image.
    pub async fn close(&mut self, delete_image: bool) -> Result<()> {
        let transport = self
            .transport
            .take()
            .ok_or_else(|| ClientError::NotStarted(self.label.clone()))?;
        self.initialized.store(false, Ordering::Release);
        if let Some(exit) = transport.shutdown().await {
            debug!("{}: closed with exit code {:?}", self.label, exit.code);
        }

        if delete_image {
            if let Some(spec) = &self.spec {
                self.runtime.remove_image(&spec.image).await?;
            }
        }
        Ok(())
    }
}
