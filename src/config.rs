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

use crate::core::constants::{config as keys, container, handshake};
use crate::core::errors::{ClientError, Result};
use crate::mcp::discovery::DiscoveryOptions;
use crate::mcp::launcher::ContainerRuntime;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse_safe(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub container_runtime: String,
    pub protocol_version: String,
    pub handshake_timeout: Duration,
    pub debug: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let handshake_timeout = match lookup(keys::ENV_HANDSHAKE_TIMEOUT_SECS) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    ClientError::Configuration(format!(
                        "{} must be a whole number of seconds, got '{}'",
                        keys::ENV_HANDSHAKE_TIMEOUT_SECS,
                        raw
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.handshake_timeout,
        };

        Ok(Self {
            log_level: lookup(keys::ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_format: lookup(keys::ENV_LOG_FORMAT)
                .map(|s| LogFormat::parse_safe(&s))
                .unwrap_or(defaults.log_format),
            container_runtime: lookup(keys::ENV_CONTAINER_RUNTIME)
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.container_runtime),
            protocol_version: lookup(keys::ENV_PROTOCOL_VERSION)
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.protocol_version),
            handshake_timeout,
            debug: lookup(keys::ENV_DEBUG)
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    pub fn runtime(&self) -> ContainerRuntime {
        ContainerRuntime::parse(&self.container_runtime)
    }

    pub fn discovery_options(&self, pull: bool, cleanup: bool) -> DiscoveryOptions {
        DiscoveryOptions {
            pull,
            cleanup,
            debug: self.debug,
            runtime: self.runtime(),
            protocol_version: self.protocol_version.clone(),
            handshake_timeout: self.handshake_timeout,
            ..DiscoveryOptions::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            container_runtime: container::DEFAULT_RUNTIME.to_string(),
            protocol_version: handshake::DEFAULT_PROTOCOL_VERSION.to_string(),
            handshake_timeout: Duration::from_secs(handshake::TIMEOUT_SECS),
            debug: false,
        }
    }
}
