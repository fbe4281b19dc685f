//! Programmatic llama-server launcher.
//!
//! [`start_server`] validates a [`ServerConfig`], spawns the binary with
//! merged output capture, blocks until the health endpoint responds, and
//! returns a [`ServerHandle`] for lifecycle management. A failed startup
//! never leaks the child process: it is terminated before the error is
//! returned.

mod command;
mod config;
mod error;
mod handle;
mod health;
mod logs;
mod shutdown;

pub use command::{SERVER_BINARY, SERVER_PATH_ENV};
pub use config::{DEFAULT_HEALTH_TIMEOUT, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use handle::{DEFAULT_TERMINATE_GRACE, ServerHandle};
pub use health::{POLL_INTERVAL, PROBE_TIMEOUT};

use tracing::debug;

/// Launch a llama-server process and wait for it to become healthy.
///
/// Steps, in order: validate the configuration, resolve the binary, spawn
/// with piped output and per-child environment overrides, poll the health
/// endpoint until ready or `config.health_timeout` elapses, then enable
/// console log forwarding when requested. Any failure after spawn
/// terminates the child before the error is returned.
pub async fn start_server(config: ServerConfig) -> ServerResult<ServerHandle> {
    config.validate()?;
    let binary = command::resolve_server_binary(&config)?;
    debug!(
        "starting {} with model {}",
        binary.display(),
        config.model_path.display()
    );

    let mut child = command::spawn_server(&binary, &config)?;
    let capture = logs::spawn_output_capture(&mut child);

    if let Err(err) =
        health::wait_for_health(&mut child, config.port, config.health_timeout, &capture.buffer)
            .await
    {
        // Guarantee the child is gone before surfacing the failure
        let _ = shutdown::shutdown_child(&mut child, DEFAULT_TERMINATE_GRACE).await;
        capture.abort();
        return Err(err);
    }

    if config.stream_logs && !config.log_disable {
        capture.enable_forwarding();
    }

    Ok(ServerHandle::new(child, config.port, capture))
}
