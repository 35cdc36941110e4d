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

//! Container invocation for MCP servers.
//!
//! Builds the `docker run` command line (isolation flags, pass-through env
//! names, rendered command template) and owns the image-level operations
//! around it: pull before start, `rmi -f` after close.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::core::constants::container;
use crate::core::errors::{ClientError, Result};
use crate::mcp::process::ProcessSupervisor;
use crate::mcp::transport::StdioTransport;
use crate::servers::{EnvVar, Secret};

/// Everything needed to start one server container.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    pub image: String,
    pub pull: bool,
    pub env: Vec<EnvVar>,
    pub secrets: Vec<Secret>,
    /// Extra `docker run` flags, placed before the env flags.
    pub args: Vec<String>,
    /// The server's own argv template.
    pub command: Vec<String>,
}

impl LaunchSpec {
    pub fn new(image: &str) -> Self {
        Self {
            image: image.to_string(),
            ..Default::default()
        }
    }

    /// Full argument list for the container runtime, starting with `run`.
    pub fn run_args(&self) -> Vec<String> {
        let mut args: Vec<String> = container::RUN_FLAGS.iter().map(|s| s.to_string()).collect();
        args.extend(self.args.iter().cloned());
        for env in &self.env {
            args.push("-e".to_string());
            args.push(env.name.clone());
        }
        for secret in &self.secrets {
            args.push("-e".to_string());
            args.push(secret.env.clone());
        }
        args.push(self.image.clone());
        args.extend(self.command.iter().map(|arg| self.render_placeholder(arg)));
        args
    }

    /// Resolve a single command token. Only whole-token `$NAME` matches are
    /// substituted; anything else passes through untouched.
    pub fn render_placeholder(&self, arg: &str) -> String {
        if arg == container::LEGACY_PATHS_PLACEHOLDER {
            return container::LEGACY_PATHS_VALUE.to_string();
        }
        let Some(name) = arg.strip_prefix('$') else {
            return arg.to_string();
        };
        if let Some(env) = self.env.iter().find(|env| env.name == name) {
            return env.example_text();
        }
        if let Some(secret) = self.secrets.iter().find(|secret| secret.env == name) {
            return secret.example_text();
        }
        arg.to_string()
    }

    /// Values behind the `-e NAME` flags. They travel through the runtime's
    /// environment so they never show up in a process listing.
    pub fn environment(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|env| (env.name.clone(), env.resolved_value()))
            .chain(
                self.secrets
                    .iter()
                    .map(|secret| (secret.env.clone(), secret.example_text())),
            )
            .collect()
    }
}

/// The container CLI (`docker` or a compatible binary), plus any leading
/// arguments such as `sudo docker` or `nerdctl --namespace k8s.io`.
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    binary: String,
    args: Vec<String>,
}

impl Default for ContainerRuntime {
    fn default() -> Self {
        Self::new(container::DEFAULT_RUNTIME)
    }
}

impl ContainerRuntime {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: binary.to_string(),
            args: Vec::new(),
        }
    }

    /// Split a whitespace-separated command line; empty input means the default.
    pub fn parse(command_line: &str) -> Self {
        let mut words = command_line.split_whitespace();
        match words.next() {
            Some(binary) => Self::new(binary).with_args(words),
            None => Self::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(&self.args);
        command
    }

    pub async fn pull(&self, image: &str) -> Result<()> {
        info!("Pulling image {}", image);
        let output = self
            .command()
            .args(["pull", image])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ClientError::ImagePull {
                image: image.to_string(),
                reason: e.to_string(),
                output: String::new(),
            })?;
        if !output.status.success() {
            return Err(ClientError::ImagePull {
                image: image.to_string(),
                reason: output.status.to_string(),
                output: combined_output(&output),
            });
        }
        Ok(())
    }

    pub async fn remove_image(&self, image: &str) -> Result<()> {
        debug!("Removing image {}", image);
        let output = self
            .command()
            .args(["rmi", "-f", image])
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            return Err(ClientError::ProcessError(format!(
                "failed removing image {}: {} ({})",
                image,
                output.status,
                combined_output(&output)
            )));
        }
        Ok(())
    }

    /// Start the server container and wrap it in a transport. The image is
    /// pulled first when `pull` is set.
    pub async fn launch(&self, spec: &LaunchSpec, echo_stderr: bool) -> Result<StdioTransport> {
        if spec.pull {
            self.pull(&spec.image).await?;
        }

        let mut command = self.command();
        command
            .args(spec.run_args())
            .envs(spec.environment())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawned = ProcessSupervisor::spawn(command, &spec.image)?;
        info!(
            "Started {} (pid {:?})",
            spec.image,
            spawned.supervisor.pid()
        );
        StdioTransport::from_process(&spec.image, spawned, echo_stderr)
    }
}

fn combined_output(output: &std::process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> LaunchSpec {
        LaunchSpec {
            image: "mcp/fetch".to_string(),
            pull: false,
            env: vec![
                EnvVar {
                    name: "ROOT".to_string(),
                    example: Some(json!("/data")),
                    value: None,
                },
                EnvVar {
                    name: "PORT".to_string(),
                    example: Some(json!(8080)),
                    value: Some("9090".to_string()),
                },
            ],
            secrets: vec![Secret {
                name: "fetch.token".to_string(),
                env: "TOKEN".to_string(),
                example: Some("sk-123".to_string()),
            }],
            args: vec!["--network".to_string(), "container:neo4j-abcdefgh".to_string()],
            command: vec![
                "--root".to_string(),
                "$ROOT".to_string(),
                "$TOKEN".to_string(),
                "$UNKNOWN".to_string(),
                "prefix-$ROOT".to_string(),
                container::LEGACY_PATHS_PLACEHOLDER.to_string(),
            ],
        }
    }

    #[test]
    fn run_args_pass_env_names_only() {
        let args = spec().run_args();
        assert_eq!(
            args,
            [
                "run",
                "--rm",
                "-i",
                "--init",
                "--cap-drop=ALL",
                "--network",
                "container:neo4j-abcdefgh",
                "-e",
                "ROOT",
                "-e",
                "PORT",
                "-e",
                "TOKEN",
                "mcp/fetch",
                "--root",
                "/data",
                "sk-123",
                "$UNKNOWN",
                "prefix-$ROOT",
                ".",
            ]
        );
        assert!(!args.iter().any(|a| a.contains("9090")));
    }

    #[test]
    fn placeholders_render_non_string_examples() {
        let spec = spec();
        assert_eq!(spec.render_placeholder("$PORT"), "8080");
        assert_eq!(spec.render_placeholder("PORT"), "PORT");
        assert_eq!(spec.render_placeholder("$"), "$");
    }

    #[test]
    fn environment_prefers_fixed_values() {
        let env = spec().environment();
        assert_eq!(
            env,
            [
                ("ROOT".to_string(), "/data".to_string()),
                ("PORT".to_string(), "9090".to_string()),
                ("TOKEN".to_string(), "sk-123".to_string()),
            ]
        );
    }

    #[test]
    fn runtime_defaults_to_docker() {
        assert_eq!(ContainerRuntime::default().binary(), "docker");
        assert_eq!(ContainerRuntime::parse("  ").binary(), "docker");
    }

    #[test]
    fn runtime_keeps_leading_arguments() {
        let runtime = ContainerRuntime::parse("sudo docker");
        assert_eq!(runtime.binary(), "sudo");
        let command = runtime.command();
        let args: Vec<String> = command
            .as_std()
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["docker"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_pull_reports_output() {
        let runtime = ContainerRuntime::new("false");
        let err = runtime.pull("mcp/none").await.unwrap_err();
        assert!(matches!(err, ClientError::ImagePull { ref image, .. } if image == "mcp/none"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_runtime_fails_to_launch() {
        let runtime = ContainerRuntime::new("/nonexistent/mcp-dock-runtime");
        let result = runtime.launch(&LaunchSpec::new("mcp/none"), false).await;
        assert!(matches!(result, Err(ClientError::ProcessError(_))));
    }
}
