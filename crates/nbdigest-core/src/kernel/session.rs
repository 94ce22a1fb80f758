//! Kernel process management.
//!
//! A [`KernelSession`] owns one kernel process and its shell, iopub and
//! control sockets. Sessions are created per notebook and torn down after
//! it: explicitly through [`KernelSession::shutdown`], or by `Drop`, which
//! kills the process if shutdown never ran.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde_json::json;
use tempfile::NamedTempFile;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use zeromq::{DealerSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::error::{Error, Result};
use crate::notebook::{ErrorOutput, Output};

use super::connection::ConnectionInfo;
use super::outputs::{CollectState, OutputCollector};
use super::protocol::{Message, Signer};
use super::spec::KernelSpec;

/// Delay between connection attempts while the kernel binds its ports.
const CONNECT_RETRY: Duration = Duration::from_millis(100);
/// How long to wait for an iopub message after a `kernel_info_reply`.
const IOPUB_PROBE: Duration = Duration::from_millis(500);
/// Grace period for the kernel to exit after `shutdown_request`.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Options for launching a kernel.
#[derive(Debug, Clone)]
pub struct KernelOptions {
    /// Upper bound on launch + handshake. Cell execution itself is unbounded.
    pub startup_timeout: Duration,
    /// Pass the kernel's stderr through to ours.
    pub echo_stderr: bool,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(60),
            echo_stderr: false,
        }
    }
}

/// Outcome reported by `execute_reply`.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyStatus {
    Ok,
    Error(ErrorOutput),
    Aborted,
    /// The kernel process exited before replying. Outputs published up to
    /// that point are kept.
    KernelDied(String),
}

/// Result of running one cell's code.
#[derive(Debug, Clone)]
pub struct CellRun {
    /// Outputs in the order the kernel published them.
    pub outputs: Vec<Output>,
    pub execution_count: Option<u32>,
    pub status: ReplyStatus,
}

/// A running kernel and its sockets.
pub struct KernelSession {
    child: Child,
    shell: DealerSocket,
    iopub: SubSocket,
    control: DealerSocket,
    signer: Signer,
    session_id: String,
    kernel_name: String,
    /// Deleted when the session drops.
    _connection_file: NamedTempFile,
    shut_down: bool,
}

impl KernelSession {
    /// Launch a kernel in `working_dir` and wait until it answers.
    pub async fn start(
        spec: &KernelSpec,
        working_dir: &Path,
        options: &KernelOptions,
    ) -> Result<Self> {
        let info = ConnectionInfo::allocate(&spec.name)?;
        let connection_file = info.write_temp()?;

        let argv = spec.launch_argv(connection_file.path());
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::KernelLaunch(format!("kernel '{}' has no argv", spec.name)))?;

        let stderr = if options.echo_stderr {
            Stdio::inherit()
        } else {
            Stdio::null()
        };

        let mut child = Command::new(program)
            .args(args)
            .envs(&spec.env)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::KernelLaunch(format!("failed to spawn '{}': {}", program, e)))?;

        tracing::info!(
            "Started kernel '{}' (pid {:?}) in {}",
            spec.name,
            child.id(),
            working_dir.display()
        );

        let deadline = Instant::now() + options.startup_timeout;
        let timeout = options.startup_timeout;

        let mut shell = DealerSocket::new();
        connect_with_retry(&mut shell, &info.endpoint(info.shell_port), &mut child, deadline, timeout)
            .await?;

        let mut iopub = SubSocket::new();
        connect_with_retry(&mut iopub, &info.endpoint(info.iopub_port), &mut child, deadline, timeout)
            .await?;
        iopub.subscribe("").await?;

        let mut control = DealerSocket::new();
        connect_with_retry(
            &mut control,
            &info.endpoint(info.control_port),
            &mut child,
            deadline,
            timeout,
        )
        .await?;

        let mut session = Self {
            child,
            shell,
            iopub,
            control,
            signer: Signer::new(&info.key),
            session_id: uuid::Uuid::new_v4().to_string(),
            kernel_name: spec.name.clone(),
            _connection_file: connection_file,
            shut_down: false,
        };

        session.wait_for_ready(deadline, timeout).await?;
        Ok(session)
    }

    /// Handshake: a `kernel_info_reply` on shell, then proof that iopub
    /// delivers (subscriptions are established asynchronously).
    async fn wait_for_ready(&mut self, deadline: Instant, timeout: Duration) -> Result<()> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Err(Error::KernelDied(format!(
                    "kernel exited during startup ({})",
                    status
                )));
            }
            if Instant::now() >= deadline {
                return Err(Error::KernelStartupTimeout(timeout));
            }

            let request = Message::request(&self.session_id, "kernel_info_request", json!({}));
            match tokio::time::timeout_at(deadline, self.send_shell(&request)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::trace!("kernel_info_request not delivered yet: {}", e);
                    tokio::time::sleep(CONNECT_RETRY).await;
                    continue;
                }
                Err(_) => return Err(Error::KernelStartupTimeout(timeout)),
            }

            let reply = tokio::time::timeout_at(deadline, self.recv_shell_reply(request.msg_id()))
                .await
                .map_err(|_| Error::KernelStartupTimeout(timeout))??;
            tracing::debug!(
                "Kernel '{}' ready (protocol {})",
                self.kernel_name,
                reply.content["protocol_version"].as_str().unwrap_or("unknown")
            );

            match tokio::time::timeout(IOPUB_PROBE, self.recv_iopub()).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => return Err(e),
                Err(_) => tracing::trace!("iopub not delivering yet, retrying handshake"),
            }
        }
    }

    /// Run `code` and collect everything it publishes.
    ///
    /// Blocks until the kernel goes idle; there is no timeout.
    pub async fn execute(&mut self, code: &str) -> Result<CellRun> {
        let request = Message::request(
            &self.session_id,
            "execute_request",
            json!({
                "code": code,
                "silent": false,
                "store_history": true,
                "user_expressions": {},
                "allow_stdin": false,
                "stop_on_error": true,
            }),
        );
        self.send_shell(&request).await?;

        let mut collector = OutputCollector::new();
        let reply = match self.collect_reply(request.msg_id(), &mut collector).await {
            Ok(reply) => reply,
            Err(Error::KernelDied(reason)) => {
                tracing::warn!("Kernel '{}' died mid-cell: {}", self.kernel_name, reason);
                let execution_count = collector.execution_count();
                return Ok(CellRun {
                    outputs: collector.into_outputs(),
                    execution_count,
                    status: ReplyStatus::KernelDied(reason),
                });
            }
            Err(e) => return Err(e),
        };
        let status = match reply.content.get("status").and_then(|s| s.as_str()) {
            Some("ok") => ReplyStatus::Ok,
            Some("error") => ReplyStatus::Error(serde_json::from_value(reply.content.clone())?),
            Some("aborted") => ReplyStatus::Aborted,
            other => {
                return Err(Error::Protocol(format!(
                    "execute_reply with unexpected status {:?}",
                    other
                )));
            }
        };

        let execution_count = reply
            .content
            .get("execution_count")
            .and_then(|c| c.as_u64())
            .and_then(|c| u32::try_from(c).ok())
            .or(collector.execution_count());

        Ok(CellRun {
            outputs: collector.into_outputs(),
            execution_count,
            status,
        })
    }

    /// Feed iopub traffic for `msg_id` into `collector` until idle, then
    /// read the shell reply.
    async fn collect_reply(
        &mut self,
        msg_id: &str,
        collector: &mut OutputCollector,
    ) -> Result<Message> {
        loop {
            let msg = self.recv_iopub().await?;
            if !msg.is_reply_to(msg_id) {
                continue;
            }
            if collector.handle(&msg)? == CollectState::Idle {
                break;
            }
        }
        self.recv_shell_reply(msg_id).await
    }

    /// Ask the kernel to exit, killing it if it does not within the grace period.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shut_down = true;

        let request = Message::request(&self.session_id, "shutdown_request", json!({"restart": false}));
        if let Err(e) = send_message(&mut self.control, &request, &self.signer).await {
            tracing::warn!("Failed to send shutdown_request: {}", e);
        }

        match tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Kernel '{}' exited with {}", self.kernel_name, status);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                tracing::warn!(
                    "Kernel '{}' ignored shutdown_request, killing it",
                    self.kernel_name
                );
                self.child.kill().await?;
                Ok(())
            }
        }
    }

    async fn send_shell(&mut self, msg: &Message) -> Result<()> {
        tracing::debug!("shell <- {} {}", msg.msg_type(), msg.msg_id());
        send_message(&mut self.shell, msg, &self.signer).await
    }

    /// Next shell message answering `msg_id`; stale replies are skipped.
    async fn recv_shell_reply(&mut self, msg_id: &str) -> Result<Message> {
        loop {
            let frames = tokio::select! {
                received = self.shell.recv() => received?.into_vec(),
                status = self.child.wait() => return Err(died(status)),
            };
            match Message::from_frames(&frames, &self.signer) {
                Ok(msg) if msg.is_reply_to(msg_id) => {
                    tracing::debug!("shell -> {}", msg.msg_type());
                    return Ok(msg);
                }
                Ok(msg) => tracing::trace!("Skipping stale shell message {}", msg.msg_type()),
                Err(e) => tracing::warn!("Dropping shell message: {}", e),
            }
        }
    }

    /// Next valid iopub message, whoever it belongs to.
    async fn recv_iopub(&mut self) -> Result<Message> {
        loop {
            let frames = tokio::select! {
                received = self.iopub.recv() => received?.into_vec(),
                status = self.child.wait() => return Err(died(status)),
            };
            match Message::from_frames(&frames, &self.signer) {
                Ok(msg) => {
                    tracing::trace!("iopub -> {}", msg.msg_type());
                    return Ok(msg);
                }
                Err(e) => tracing::warn!("Dropping iopub message: {}", e),
            }
        }
    }
}

impl Drop for KernelSession {
    fn drop(&mut self) {
        if !self.shut_down {
            // Session abandoned mid-notebook; don't leave the kernel running.
            let _ = self.child.start_kill();
        }
    }
}

async fn send_message<S: SocketSend>(socket: &mut S, msg: &Message, signer: &Signer) -> Result<()> {
    let frames = msg.to_frames(signer)?;
    let message = ZmqMessage::try_from(frames).map_err(|e| Error::Protocol(e.to_string()))?;
    socket.send(message).await?;
    Ok(())
}

/// Connect, retrying until the kernel has bound the port.
async fn connect_with_retry<S: Socket>(
    socket: &mut S,
    endpoint: &str,
    child: &mut Child,
    deadline: Instant,
    timeout: Duration,
) -> Result<()> {
    loop {
        let attempt = tokio::time::timeout_at(deadline, socket.connect(endpoint)).await;
        match attempt {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => tracing::trace!("Connecting to {}: {}", endpoint, e),
            Err(_) => return Err(Error::KernelStartupTimeout(timeout)),
        }

        if let Some(status) = child.try_wait()? {
            return Err(Error::KernelDied(format!(
                "kernel exited during startup ({})",
                status
            )));
        }
        if Instant::now() >= deadline {
            return Err(Error::KernelStartupTimeout(timeout));
        }
        tokio::time::sleep(CONNECT_RETRY).await;
    }
}

fn died(status: std::io::Result<ExitStatus>) -> Error {
    match status {
        Ok(status) => Error::KernelDied(format!("kernel process exited ({})", status)),
        Err(e) => Error::KernelDied(format!("lost track of kernel process: {}", e)),
    }
}
