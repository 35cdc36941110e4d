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

//! JSON-RPC stdio transport for MCP servers.
//!
//! One `StdioTransport` owns one live process (or any reader/writer pair).
//! Any number of callers may have requests in flight at once: each request
//! gets a unique id and a single-slot response holder, writes are serialized
//! behind a mutex, and the dispatch loop hands every response to the caller
//! that owns its id. When stdout closes, every waiting caller is released
//! with `TransportClosed`.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::SinkExt;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedWrite;
use tracing::{debug, trace};

use crate::core::constants::handshake;
use crate::core::errors::{ClientError, Result};
use crate::core::models::{JsonRpcNotification, JsonRpcRequest};
use crate::mcp::codec::JsonLineCodec;
use crate::mcp::pipeline::{self, PendingRequests, OutputCapture};
use crate::mcp::process::{self, ProcessExit, ProcessSupervisor, SpawnedProcess};

type BoxWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Removes its slot from the pending map unless disarmed. Dropping a
/// request future (timeout, `select!`, task abort) therefore abandons the slot.
struct SlotGuard<'a> {
    pending: &'a PendingRequests,
    id: i64,
    armed: bool,
}

impl SlotGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.pending.abandon(self.id) {
            trace!("abandoned request {}", self.id);
        }
    }
}

pub struct StdioTransport {
    label: String,
    next_id: AtomicI64,
    pending: Arc<PendingRequests>,
    writer: tokio::sync::Mutex<FramedWrite<BoxWriter, JsonLineCodec>>,
    dispatch: JoinHandle<()>,
    stderr: OutputCapture,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
    supervisor: Mutex<Option<ProcessSupervisor>>,
    exit_rx: Option<watch::Receiver<Option<ProcessExit>>>,
}

impl StdioTransport {
    /// Drive an arbitrary reader/writer pair. Must be called inside a Tokio runtime.
    pub fn from_pipes<R, W>(label: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending = Arc::new(PendingRequests::default());
        let dispatch = pipeline::spawn_dispatch_loop(label.to_string(), reader, pending.clone());
        Self {
            label: label.to_string(),
            next_id: AtomicI64::new(1),
            pending,
            writer: tokio::sync::Mutex::new(FramedWrite::new(
                Box::new(writer) as BoxWriter,
                JsonLineCodec::new(),
            )),
            dispatch,
            stderr: OutputCapture::new(),
            stderr_task: Mutex::new(None),
            supervisor: Mutex::new(None),
            exit_rx: None,
        }
    }

    /// Take ownership of a spawned server. Requires piped stdin and stdout.
    pub fn from_process(label: &str, spawned: SpawnedProcess, echo_stderr: bool) -> Result<Self> {
        let SpawnedProcess {
            supervisor,
            stdin,
            stdout,
            stderr,
        } = spawned;
        let stdin = stdin
            .ok_or_else(|| ClientError::ProcessError("failed to create stdin pipe".to_string()))?;
        let stdout = stdout
            .ok_or_else(|| ClientError::ProcessError("failed to create stdout pipe".to_string()))?;

        let mut transport = Self::from_pipes(label, stdout, stdin);
        if let Some(stderr) = stderr {
            let task = pipeline::spawn_output_drain(
                label.to_string(),
                stderr,
                transport.stderr.clone(),
                echo_stderr,
            );
            transport.stderr_task = Mutex::new(Some(task));
        }
        transport.exit_rx = Some(supervisor.exit_watch());
        transport.supervisor = Mutex::new(Some(supervisor));
        Ok(transport)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Send a request and wait for its response.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.pending.register(id)?;
        let guard = SlotGuard {
            pending: self.pending.as_ref(),
            id,
            armed: true,
        };

        debug!("{}: -> {} (id {})", self.label, method, id);
        self.write(&JsonRpcRequest::new(id, method, params)).await?;

        // A dropped sender means the dispatch loop closed the map.
        let outcome = rx.await.map_err(|_| ClientError::TransportClosed)?;
        guard.disarm();
        debug!("{}: <- {} (id {})", self.label, method, id);
        outcome.map_err(ClientError::from)
    }

    /// `request` bounded by a deadline. The slot is abandoned on expiry.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        tokio::time::timeout(timeout, self.request(method, params))
            .await
            .map_err(|_| ClientError::Timeout {
                method: method.to_string(),
                timeout,
            })?
    }

    /// Fire-and-forget notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.pending.is_closed() {
            return Err(ClientError::TransportClosed);
        }
        debug!("{}: -> {} (notification)", self.label, method);
        self.write(&JsonRpcNotification::new(method, params)).await
    }

    async fn write<T: Serialize>(&self, item: &T) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.send(item).await.map_err(|e| match e {
            ClientError::Io(io) if io.kind() == std::io::ErrorKind::BrokenPipe => {
                ClientError::TransportClosed
            }
            other => other,
        })
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.pending.is_closed()
    }

    /// Resolves when the owned process exits; never resolves for plain pipes.
    pub async fn process_exited(&self) -> ProcessExit {
        match &self.exit_rx {
            Some(rx) => process::wait_for_exit(rx.clone()).await,
            None => std::future::pending().await,
        }
    }

    /// Everything the process wrote to stderr so far, after letting the drain catch up.
    pub async fn stderr_output(&self) -> String {
        let task = self
            .stderr_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(task) = task {
            let grace = Duration::from_millis(handshake::STDERR_GRACE_MS);
            if tokio::time::timeout(grace, task).await.is_err() {
                trace!("{}: stderr still open after {:?}", self.label, grace);
            }
        }
        self.stderr.snapshot().trim().to_string()
    }

    /// Signal the process to terminate and release every waiting caller.
    pub fn close(&self) {
        if let Some(supervisor) = self
            .supervisor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_mut()
        {
            supervisor.terminate();
        }
        let released = self.pending.close();
        if released > 0 {
            debug!("{}: released {} waiting caller(s) on close", self.label, released);
        }
        self.dispatch.abort();
    }

    /// `close`, then wait for the process to be gone.
    pub async fn shutdown(&self) -> Option<ProcessExit> {
        self.close();
        match &self.exit_rx {
            Some(rx) => Some(process::wait_for_exit(rx.clone()).await),
            None => None,
        }
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.close();
        if let Some(task) = self
            .stderr_task
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            task.abort();
        }
    }
}
