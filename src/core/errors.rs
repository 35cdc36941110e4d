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

//! Error types for the container MCP client.

use std::time::Duration;
use thiserror::Error;

/// Main error type for sessions, transports and sidecars
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ClientError {
    /// Operation requires a started and initialized session
    #[error("{0}: not started")]
    NotStarted(String),

    /// `start` called on a session that already owns a transport
    #[error("already started {0}")]
    AlreadyStarted(String),

    /// Handshake attempted twice on the same session
    #[error("{0}: client already initialized")]
    AlreadyInitialized(String),

    /// Only known sidecars can be orchestrated
    #[error("unsupported requirement: {0}")]
    UnsupportedRequirement(String),

    /// Sidecar never printed its readiness marker
    #[error("failed to start {name}: [{output}]")]
    RequirementNotReady { name: String, output: String },

    /// `pull` failed; carries the combined runtime output
    #[error("pulling image {image}: {reason} ({output})")]
    ImagePull {
        image: String,
        reason: String,
        output: String,
    },

    /// Process Management Error
    #[error("process error: {0}")]
    ProcessError(String),

    /// Handshake failed or timed out; the server's stderr is the detail
    #[error("initializing {image}: {stderr}")]
    Handshake { image: String, stderr: String },

    /// The server process went away or the session was closed
    #[error("transport closed")]
    TransportClosed,

    /// Caller deadline elapsed before the response arrived
    #[error("request '{method}' timed out after {}ms", .timeout.as_millis())]
    Timeout { method: String, timeout: Duration },

    /// Server-reported JSON-RPC error, propagated verbatim
    #[error("{message}")]
    Protocol {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Inbound framing failure
    #[error("codec error: {0}")]
    Codec(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// I/O Error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Out-of-sequence calls; never worth retrying.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            ClientError::NotStarted(_)
                | ClientError::AlreadyStarted(_)
                | ClientError::AlreadyInitialized(_)
                | ClientError::UnsupportedRequirement(_)
        )
    }

    /// Steady-state failures a caller may retry on the same session.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Timeout { .. } | ClientError::Protocol { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
