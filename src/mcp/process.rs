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

//! Child process management.
//!
//! Every spawned server or sidecar is owned by a `ProcessSupervisor`. A
//! watcher task waits on the child and publishes its exit over a `watch`
//! channel. `terminate` sends SIGTERM right away, on the caller's thread, so
//! the signal is delivered even if the runtime shuts down before the watcher
//! runs again; the watcher then hard-kills once the grace period lapses. On
//! Linux the child is additionally bound to our lifetime with
//! `PR_SET_PDEATHSIG`.

use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

use crate::core::constants::process;
use crate::core::errors::{ClientError, Result};

/// How a supervised process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
}

pub struct ProcessSupervisor {
    label: String,
    pid: Option<u32>,
    // Channel to trigger teardown
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
}

/// Pipes are present only where the caller configured `Stdio::piped()`.
pub struct SpawnedProcess {
    pub supervisor: ProcessSupervisor,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

impl ProcessSupervisor {
    pub fn spawn(mut command: Command, label: &str) -> Result<SpawnedProcess> {
        debug!("ProcessSupervisor: spawning {:?}", command.as_std());

        #[cfg(target_os = "linux")]
        // SAFETY: prctl(PR_SET_PDEATHSIG) is async-signal-safe and only touches
        // the calling (child) process between fork and exec.
        unsafe {
            command.pre_exec(|| {
                // Send SIGKILL to child if we die
                let ret = libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
                if ret != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command.spawn().map_err(|e| {
            ClientError::ProcessError(format!("failed to start {}: {}", label, e))
        })?;
        let pid = child.id();

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);

        let task_label = label.to_string();
        tokio::spawn(async move {
            let code = tokio::select! {
                // Fires on explicit teardown and when the supervisor is dropped
                _ = kill_rx => reap(&mut child, &task_label).await,
                status = child.wait() => status.ok().and_then(|s| s.code()),
            };
            debug!("{} exited with code {:?}", task_label, code);
            let _ = exit_tx.send(Some(ProcessExit { code }));
        });

        Ok(SpawnedProcess {
            supervisor: Self {
                label: label.to_string(),
                pid,
                kill_tx: Some(kill_tx),
                exit_rx,
            },
            stdin,
            stdout,
            stderr,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the process to stop. Idempotent.
    pub fn terminate(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            debug!("Terminating {}", self.label);
            // An exited child may already be reaped and its pid reused
            if self.exit_rx.borrow().is_none() {
                if let Some(pid) = self.pid {
                    send_sigterm(pid, &self.label);
                }
            }
            let _ = tx.send(());
        }
    }

    /// Receiver that flips to `Some` when the process exits.
    pub fn exit_watch(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit_rx.clone()
    }

    pub fn exit_status(&self) -> Option<ProcessExit> {
        *self.exit_rx.borrow()
    }

    /// Resolves once the process has exited.
    pub async fn wait_exit(&self) -> ProcessExit {
        wait_for_exit(self.exit_rx.clone()).await
    }
}

pub async fn wait_for_exit(mut rx: watch::Receiver<Option<ProcessExit>>) -> ProcessExit {
    match rx.wait_for(Option::is_some).await {
        Ok(exit) => (*exit).unwrap_or(ProcessExit { code: None }),
        // Watcher task gone without publishing; treat as exited
        Err(_) => ProcessExit { code: None },
    }
}

impl Drop for ProcessSupervisor {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Wait out the grace period after SIGTERM, then kill.
async fn reap(child: &mut Child, label: &str) -> Option<i32> {
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    let _ = child.start_kill();

    let grace = Duration::from_secs(process::TERMINATE_GRACE_SECS);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status.ok().and_then(|s| s.code()),
        Err(_) => {
            warn!("{} ignored SIGTERM for {:?}, killing", label, grace);
            let _ = child.kill().await;
            None
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos"))]
fn send_sigterm(pid: u32, label: &str) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("SIGTERM to {} ({}) failed: {}", label, pid, e);
    }
}

// Elsewhere the watcher issues a hard kill instead
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn send_sigterm(_pid: u32, _label: &str) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;

    fn sh(script: &str) -> Command {
        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        command
    }

    #[tokio::test]
    async fn reports_exit_code() {
        let spawned = ProcessSupervisor::spawn(sh("exit 3"), "exit-three").unwrap();
        assert!(spawned.stdout.is_some());
        assert!(spawned.stdin.is_none());
        let exit = spawned.supervisor.wait_exit().await;
        assert_eq!(exit.code, Some(3));
        assert_eq!(spawned.supervisor.exit_status(), Some(exit));
    }

    #[tokio::test]
    async fn terminate_stops_long_running_child() {
        let mut spawned = ProcessSupervisor::spawn(sh("sleep 30"), "sleeper").unwrap();
        assert!(spawned.supervisor.exit_status().is_none());
        spawned.supervisor.terminate();
        let exit = tokio::time::timeout(Duration::from_secs(5), spawned.supervisor.wait_exit())
            .await
            .expect("child should exit after SIGTERM");
        // Killed by a signal, so no exit code
        assert_eq!(exit.code, None);
    }

    #[tokio::test]
    async fn missing_binary_is_a_process_error() {
        let command = Command::new("/definitely/not/a/binary");
        match ProcessSupervisor::spawn(command, "ghost") {
            Err(ClientError::ProcessError(msg)) => assert!(msg.contains("ghost")),
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("spawn should fail"),
        }
    }

    #[test]
    fn terminate_signals_without_the_runtime() {
        use tokio::io::{AsyncBufReadExt, BufReader};

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("term");
        let script = format!(
            "trap 'echo term > {}; exit 0' TERM; echo ready; while :; do sleep 1 & wait $!; done",
            marker.display()
        );

        let rt = tokio::runtime::Runtime::new().unwrap();
        let mut spawned = {
            let _guard = rt.enter();
            ProcessSupervisor::spawn(sh(&script), "trapper").unwrap()
        };
        let stdout = spawned.stdout.take().unwrap();
        rt.block_on(async {
            let mut line = String::new();
            BufReader::new(stdout).read_line(&mut line).await.unwrap();
            assert_eq!(line.trim(), "ready");
        });

        // The watcher never gets to run again once the runtime is gone.
        spawned.supervisor.terminate();
        drop(rt);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !marker.exists() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(marker.exists(), "child never saw SIGTERM");
    }
}
