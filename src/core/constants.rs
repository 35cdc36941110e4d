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

//! mcp-dock constants - single source of truth for protocol values, limits and timeouts.

/// JSON-RPC 2.0 values
pub mod jsonrpc {
    pub const VERSION: &str = "2.0";
    /// Method not found (standard JSON-RPC)
    pub const ERROR_METHOD_NOT_FOUND: i32 = -32601;
    /// Internal error; stands in for a code the server sent malformed
    pub const ERROR_INTERNAL: i32 = -32603;
}

/// MCP Protocol Methods
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PROMPTS_LIST: &str = "prompts/list";
}

/// Handshake defaults
pub mod handshake {
    pub const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";
    pub const CLIENT_NAME: &str = "docker";
    pub const CLIENT_VERSION: &str = "1.0.0";
    pub const TIMEOUT_SECS: u64 = 60;
    /// How long to wait for the stderr drain to finish after a failed handshake
    pub const STDERR_GRACE_MS: u64 = 500;
}

/// Tool call defaults
pub mod calls {
    /// Some servers reject an empty arguments object, so one harmless argument is injected.
    pub const PLACEHOLDER_ARG_NAME: &str = "args";
    pub const PLACEHOLDER_ARG_VALUE: &str = "...";
}

/// Container runtime invocation
pub mod container {
    pub const DEFAULT_RUNTIME: &str = "docker";
    /// Ephemeral, interactive, init-supervised, every capability dropped
    pub const RUN_FLAGS: &[&str] = &["run", "--rm", "-i", "--init", "--cap-drop=ALL"];
    /// Legacy catalog placeholder that resolves to the working directory
    pub const LEGACY_PATHS_PLACEHOLDER: &str = "{{filesystem.paths|volume-target|into}}";
    pub const LEGACY_PATHS_VALUE: &str = ".";
}

/// Child process supervision
pub mod process {
    /// Grace period between SIGTERM and a hard kill
    pub const TERMINATE_GRACE_SECS: u64 = 10;
}

/// Requirement sidecars
pub mod requirements {
    pub const POLL_INTERVAL_MS: u64 = 100;
    pub const READY_TIMEOUT_SECS: u64 = 30;
    pub const NAME_SUFFIX_LEN: usize = 8;

    pub mod neo4j {
        pub const NAME: &str = "neo4j";
        pub const IMAGE: &str = "neo4j";
        pub const READY_MARKER: &str = "Started.";
        pub const AUTH_ENV: &str = "NEO4J_AUTH=none";
        pub const URL_ENV: &str = "NEO4J_URL";
        pub const URL: &str = "bolt://localhost:7687";
    }
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_LOG_LEVEL: &str = "MCP_DOCK_LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "MCP_DOCK_LOG_FORMAT";
    pub const ENV_CONTAINER_RUNTIME: &str = "MCP_DOCK_CONTAINER_RUNTIME";
    pub const ENV_PROTOCOL_VERSION: &str = "MCP_DOCK_PROTOCOL_VERSION";
    pub const ENV_HANDSHAKE_TIMEOUT_SECS: &str = "MCP_DOCK_HANDSHAKE_TIMEOUT_SECS";
    pub const ENV_DEBUG: &str = "MCP_DOCK_DEBUG";
}

/// Transport Limits
pub mod limits {
    /// Maximum accepted inbound line (10 MB)
    pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;
    /// Stderr kept for diagnostics; older output is dropped first
    pub const MAX_STDERR_BYTES: usize = 64 * 1024;
}
