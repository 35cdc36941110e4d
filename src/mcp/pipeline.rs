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

//! Background tasks attached to a live server process.
//!
//! - The dispatch loop owns stdout: it decodes frames and routes each
//!   response to the caller waiting on its id.
//! - The output drain forwards a process's stderr (or a sidecar's stdout)
//!   to the log and keeps a bounded copy for failure reports.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, trace, warn};

use crate::core::constants::limits;
use crate::core::errors::{ClientError, Result};
use crate::core::models::{JsonRpcError, WireMessage};
use crate::mcp::codec::{Frame, JsonLineCodec};

/// What a waiting caller receives: the `result` or the `error` payload.
pub type Outcome = std::result::Result<Value, JsonRpcError>;

#[derive(Default)]
struct PendingState {
    slots: HashMap<i64, oneshot::Sender<Outcome>>,
    closed: bool,
}

/// In-flight requests keyed by id. Callers insert, the dispatch loop removes.
#[derive(Default)]
pub struct PendingRequests {
    inner: Mutex<PendingState>,
}

impl PendingRequests {
    fn state(&self) -> MutexGuard<'_, PendingState> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a fresh slot. Fails once the transport has closed.
    pub fn register(&self, id: i64) -> Result<oneshot::Receiver<Outcome>> {
        let mut state = self.state();
        if state.closed {
            return Err(ClientError::TransportClosed);
        }
        let (tx, rx) = oneshot::channel();
        state.slots.insert(id, tx);
        Ok(rx)
    }

    /// Deliver an outcome. Returns false when no caller holds this id.
    pub fn complete(&self, id: i64, outcome: Outcome) -> bool {
        let slot = self.state().slots.remove(&id);
        match slot {
            // The caller may have given up between removal and send; harmless.
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Forget a slot whose caller stopped waiting.
    pub fn abandon(&self, id: i64) -> bool {
        self.state().slots.remove(&id).is_some()
    }

    /// Refuse new registrations and release every waiter. Returns how many were waiting.
    pub fn close(&self) -> usize {
        let mut state = self.state();
        state.closed = true;
        let released = state.slots.len();
        // Dropping the senders wakes each receiver with a closed-channel error.
        state.slots.clear();
        released
    }

    pub fn len(&self) -> usize {
        self.state().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

/// Spawns the single reader task for a server's stdout.
pub fn spawn_dispatch_loop<R>(label: String, stream: R, pending: Arc<PendingRequests>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedRead::new(stream, JsonLineCodec::new());

        while let Some(result) = framed.next().await {
            match result {
                Ok(Frame::Message(message)) => route(&label, message, &pending),
                Ok(Frame::Malformed { line, reason }) => {
                    debug!("{}: skipping non-protocol output {:?} ({})", label, line, reason);
                }
                Ok(Frame::Oversized { bytes }) => {
                    warn!("{}: discarded {} byte line over the size limit", label, bytes);
                }
                Err(e) => {
                    error!("{}: stdout read failed: {}", label, e);
                    break;
                }
            }
        }

        let released = pending.close();
        if released > 0 {
            warn!("{}: stdout closed with {} request(s) in flight", label, released);
        } else {
            debug!("{}: stdout closed", label);
        }
    })
}

fn route(label: &str, message: WireMessage, pending: &PendingRequests) {
    match message {
        WireMessage::Response { id, outcome } => {
            let delivered = id.as_i64().is_some_and(|id| pending.complete(id, outcome));
            if delivered {
                trace!("{}: delivered response {}", label, id);
            } else {
                debug!("{}: dropping response for unknown id {}", label, id);
            }
        }
        WireMessage::Notification { method, .. } => {
            trace!("{}: notification {}", label, method);
        }
        WireMessage::Request { id, method, .. } => {
            // Sampling, roots and elicitation are not offered by this client.
            debug!("{}: ignoring server request {} ({})", label, method, id);
        }
    }
}

/// Bounded tail of a process's output stream.
#[derive(Clone, Default)]
pub struct OutputCapture {
    buffer: Arc<Mutex<String>>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&self, line: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        buffer.push_str(line);
        buffer.push('\n');
        if buffer.len() > limits::MAX_STDERR_BYTES {
            let mut cut = buffer.len() - limits::MAX_STDERR_BYTES;
            while !buffer.is_char_boundary(cut) {
                cut += 1;
            }
            buffer.drain(..cut);
        }
    }

    pub fn snapshot(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Spawns a background task to drain an output pipe (log forwarding).
pub fn spawn_output_drain<R>(label: String, stream: R, capture: OutputCapture, echo: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut raw = Vec::new();

        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw).await {
                Ok(0) => break, // Pipe closed
                Ok(_) => {
                    let line = String::from_utf8_lossy(&raw);
                    let line = line.trim_end();
                    if line.is_empty() {
                        continue;
                    }
                    if echo {
                        info!("[{}] {}", label, line);
                    } else {
                        debug!("[{}] {}", label, line);
                    }
                    capture.push_line(line);
                }
                Err(_) => break,
            }
        }
    })
}
