//! Handle to a running llama-server process.

use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::debug;

use super::error::ServerResult;
use super::logs::OutputCapture;
use super::shutdown::shutdown_child;

/// Default grace period between SIGTERM and SIGKILL in [`ServerHandle::terminate`].
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// A running llama-server process.
///
/// Returned by [`super::start_server`] once the health check has passed,
/// so a handle always refers to a server that was ready at least once.
/// Dropping the handle force-kills the process as a last resort; call
/// [`terminate`](Self::terminate) for a graceful stop.
#[derive(Debug)]
pub struct ServerHandle {
    child: Child,
    port: u16,
    capture: OutputCapture,
}

impl ServerHandle {
    pub(crate) fn new(child: Child, port: u16, capture: OutputCapture) -> Self {
        Self {
            child,
            port,
            capture,
        }
    }

    /// Port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether the process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Gracefully stop the server with the default grace period.
    ///
    /// No-op if the process has already exited.
    pub async fn terminate(&mut self) {
        self.terminate_within(DEFAULT_TERMINATE_GRACE).await;
    }

    /// Gracefully stop the server, force-killing after `grace`.
    ///
    /// No-op if the process has already exited. The log forwarding task is
    /// stopped either way.
    pub async fn terminate_within(&mut self, grace: Duration) {
        if self.is_alive() {
            if let Err(e) = shutdown_child(&mut self.child, grace).await {
                debug!("shutdown failed: {e}");
            }
        }
        self.capture.abort();
    }

    /// Force-kill the server immediately.
    ///
    /// Errors from an already-exited process are swallowed.
    pub async fn kill(&mut self) {
        if self.is_alive() {
            let _ = self.child.kill().await;
        }
        self.capture.abort();
    }

    /// Wait for the process to exit and return its status.
    pub async fn wait(&mut self) -> ServerResult<ExitStatus> {
        let status = self.child.wait().await?;
        Ok(status)
    }

    /// Tail of the output captured from the server so far.
    pub fn captured_output(&self) -> String {
        self.capture.buffer.tail()
    }
}

// Drop is not async, so a graceful stop is not possible here. Callers that
// want SIGTERM semantics must await terminate() themselves.
impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        self.capture.abort();
    }
}
