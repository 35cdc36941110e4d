#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcp_dock::core::constants::jsonrpc::ERROR_METHOD_NOT_FOUND;
use mcp_dock::core::models::JsonRpcResponse;
use mcp_dock::mcp::transport::StdioTransport;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

pub type Received = Arc<Mutex<Vec<Value>>>;

/// In-memory MCP server on the far end of a duplex pipe. Every message the
/// client writes is recorded, then handed to the handler, whose raw lines are
/// written back verbatim. Aborting `task` closes the pipe like a dead process.
pub struct FakeServer {
    pub transport: StdioTransport,
    pub received: Received,
    pub task: JoinHandle<()>,
}

pub fn fake_server<H>(mut handler: H) -> FakeServer
where
    H: FnMut(&Value) -> Vec<String> + Send + 'static,
{
    let (client, server) = tokio::io::duplex(1 << 16);
    let (client_read, client_write) = tokio::io::split(client);
    let transport = StdioTransport::from_pipes("fake", client_read, client_write);

    let received: Received = Arc::default();
    let log = received.clone();
    let task = tokio::spawn(async move {
        let (server_read, mut server_write) = tokio::io::split(server);
        let mut lines = BufReader::new(server_read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let message: Value = serde_json::from_str(&line).expect("client wrote invalid JSON");
            log.lock().unwrap().push(message.clone());
            for reply in handler(&message) {
                if server_write.write_all(reply.as_bytes()).await.is_err() {
                    return;
                }
            }
        }
    });

    FakeServer {
        transport,
        received,
        task,
    }
}

pub fn result_line(id: &Value, result: Value) -> String {
    line(&JsonRpcResponse::success(id.clone(), result))
}

pub fn error_line(id: &Value, code: i32, message: &str) -> String {
    line(&JsonRpcResponse::error(id.clone(), code, message))
}

pub fn line<T: serde::Serialize>(message: &T) -> String {
    let mut text = serde_json::to_string(message).unwrap();
    text.push('\n');
    text
}

pub fn methods(received: &Received) -> Vec<String> {
    received
        .lock()
        .unwrap()
        .iter()
        .map(|m| m["method"].as_str().unwrap_or_default().to_string())
        .collect()
}

/// Poll until the server has seen `count` messages.
pub async fn wait_for_received(received: &Received, count: usize) {
    while received.lock().unwrap().len() < count {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// A well-behaved server: handshake, two tools, one prompt, and a
/// `tools/call` that echoes its arguments back as text.
pub fn echo_handler(message: &Value) -> Vec<String> {
    let Some(id) = message.get("id") else {
        return Vec::new();
    };
    match message["method"].as_str().unwrap_or_default() {
        "initialize" => vec![result_line(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "echo", "version": "0.1.0"}
            }),
        )],
        "tools/list" => vec![result_line(
            id,
            json!({
                "tools": [
                    {
                        "name": "write_file",
                        "description": "Write a file.\n\nArgs:\n    path: where to write\n    content: what to write",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "path": {"type": "string"},
                                "content": {"type": "string"},
                                "mode": {"type": "integer", "description": "unix mode"}
                            },
                            "required": ["path", "content"]
                        },
                        "annotations": {"destructiveHint": true}
                    },
                    {
                        "name": "echo",
                        "inputSchema": {"type": "object", "properties": {"tags": {"type": "array"}}}
                    }
                ]
            }),
        )],
        "prompts/list" => vec![result_line(
            id,
            json!({
                "prompts": [{
                    "name": "summarize",
                    "arguments": [
                        {"name": "style"},
                        {"name": "text", "required": true}
                    ]
                }]
            }),
        )],
        "tools/call" => {
            let arguments = message["params"]["arguments"].clone();
            vec![result_line(
                id,
                json!({"content": [{"type": "text", "text": arguments.to_string()}]}),
            )]
        }
        _ => vec![error_line(id, ERROR_METHOD_NOT_FOUND, "Method not found")],
    }
}

/// How the scripted runtime's `run` behaves for the main server container.
#[cfg(unix)]
pub enum ServerScript {
    /// Complain on stderr and exit before answering anything.
    FailsWith(&'static str),
    /// Answer `initialize` and `tools/list`; the tool description echoes `$NEO4J_URL`.
    Graph,
}

/// A container runtime stand-in: a shell script invoked as `sh <script> <args>`.
///
/// Every invocation is appended to `calls`. `run --name ...` plays the sidecar:
/// it prints `Starting...`, optionally the ready marker, then idles until
/// SIGTERM, which it records in `sidecar-term`.
#[cfg(unix)]
pub struct ScriptedRuntime {
    pub dir: tempfile::TempDir,
    pub runtime: mcp_dock::mcp::launcher::ContainerRuntime,
}

#[cfg(unix)]
impl ScriptedRuntime {
    pub fn new(sidecar_ready: bool, server: ServerScript) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().display().to_string();
        let ready = if sidecar_ready { "echo \"Started.\"" } else { ":" };
        let server_body = match server {
            ServerScript::FailsWith(message) => {
                format!("echo \"{message}\" >&2\n    exit 1")
            }
            ServerScript::Graph => GRAPH_SERVER.to_string(),
        };
        let script = format!(
            r#"echo "$*" >> "{root}/calls"
case "$1" in
  pull|rmi) exit 0 ;;
  run)
    if [ "$2" = "--name" ]; then
      trap 'echo term > "{root}/sidecar-term"; exit 0' TERM
      echo "Starting..."
      {ready}
      while :; do sleep 1 & wait $!; done
    fi
    {server_body}
    ;;
esac
"#
        );
        let path = dir.path().join("runtime.sh");
        std::fs::write(&path, script).unwrap();
        let runtime = mcp_dock::mcp::launcher::ContainerRuntime::new("sh")
            .with_args([path.display().to_string()]);
        Self { dir, runtime }
    }

    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn sidecar_terminated(&self) -> bool {
        self.dir.path().join("sidecar-term").exists()
    }

    /// Poll for the sidecar's TERM marker without relying on any runtime.
    pub fn wait_for_sidecar_term(&self, within: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < within {
            if self.sidecar_terminated() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        self.sidecar_terminated()
    }
}

#[cfg(unix)]
const GRAPH_SERVER: &str = r#"while IFS= read -r line; do
      id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
      [ -z "$id" ] && continue
      case "$line" in
        *'"method":"initialize"'*)
          printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2024-11-05","capabilities":{},"serverInfo":{"name":"graph","version":"1.0"}}}\n' "$id" ;;
        *'"method":"tools/list"'*)
          printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"query","description":"Query %s","inputSchema":{"type":"object","properties":{"cypher":{"type":"string"}},"required":["cypher"]}}]}}\n' "$id" "$NEO4J_URL" ;;
        *)
          printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"unsupported"}}\n' "$id" ;;
      esac
    done
    exit 0"#;
