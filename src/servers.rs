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

//! Registry server entries, as far as launching them is concerned.
//!
//! Only the shape is modelled: image, command template, declared env and
//! secrets, fixed run env, and an optional requirement. Unknown keys in the
//! YAML are ignored.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::{ClientError, Result};

/// Declared environment variable. `value` is fixed; `example` is a sample
/// used to exercise the server and to render `$NAME` command tokens.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl EnvVar {
    pub fn with_value(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            example: None,
            value: Some(value.to_string()),
        }
    }

    /// Sample value as it would be typed on a command line.
    pub fn example_text(&self) -> String {
        match &self.example {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// Value handed to the process: the fixed value, else the example.
    pub fn resolved_value(&self) -> String {
        match &self.value {
            Some(value) if !value.is_empty() => value.clone(),
            _ => self.example_text(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    pub env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

impl Secret {
    pub fn example_text(&self) -> String {
        self.example.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Run {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Secret>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Server {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub server_type: Option<String>,
    #[serde(default)]
    pub run: Run,
    #[serde(default)]
    pub config: ServerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
}

impl Server {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let server: Server = serde_yaml_ng::from_str(content)?;
        if server.image.is_empty() {
            return Err(ClientError::Configuration(format!(
                "server {} has no image",
                server.name
            )));
        }
        Ok(server)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// The requirement name, if one is declared.
    pub fn requirement(&self) -> Option<&str> {
        self.requirement.as_deref().filter(|name| !name.is_empty())
    }

    /// Declared env, then `extra` (e.g. sidecar variables), then fixed run env.
    pub fn environment(&self, extra: &[(String, String)]) -> Vec<EnvVar> {
        let mut env = self.config.env.clone();
        env.extend(extra.iter().map(|(name, value)| EnvVar {
            name: name.clone(),
            example: Some(Value::String(value.clone())),
            value: None,
        }));
        env.extend(
            self.run
                .env
                .iter()
                .map(|(name, value)| EnvVar::with_value(name, value)),
        );
        env
    }
}
