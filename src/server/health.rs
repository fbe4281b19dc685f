//! Health polling for a freshly spawned server process.

use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::process::Child;
use tokio::time::sleep;
use tracing::{debug, info};

use super::error::{ServerError, ServerResult};
use super::logs::OutputBuffer;

/// Delay between health probes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Timeout for each individual health probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Pause before reporting an early exit so output capture can catch up.
const DRAIN_DELAY: Duration = Duration::from_millis(100);

/// Poll the server's `/health` endpoint until it returns 200 OK.
///
/// Every probe failure short of child death counts as "not ready yet" and
/// is retried after [`POLL_INTERVAL`]: connection refusals, request
/// timeouts, and non-200 statuses alike. If the child exits before
/// reporting healthy the poll fails immediately with the captured output.
/// `health_timeout` is a wall-clock ceiling measured from entry; the caller
/// is responsible for terminating the child on failure.
pub async fn wait_for_health(
    child: &mut Child,
    port: u16,
    health_timeout: Duration,
    output: &OutputBuffer,
) -> ServerResult<()> {
    let health_url = format!("http://127.0.0.1:{port}/health");
    info!("waiting for llama-server to be ready at {health_url}");

    let client = Client::builder().timeout(PROBE_TIMEOUT).build()?;
    let started = Instant::now();

    while started.elapsed() < health_timeout {
        if child.try_wait()?.is_some() {
            // Give the reader tasks a moment to drain the closed pipes
            sleep(DRAIN_DELAY).await;
            return Err(ServerError::ExitedEarly {
                output: output.tail(),
            });
        }

        match client.get(&health_url).send().await {
            Ok(response) if response.status().is_success() => {
                info!("llama-server is ready on port {port}");
                return Ok(());
            }
            Ok(response) => {
                debug!("health check returned status {}, retrying", response.status());
            }
            Err(e) => {
                debug!("health check failed: {e}, retrying");
            }
        }

        sleep(POLL_INTERVAL).await;
    }

    Err(ServerError::HealthTimeout {
        waited: health_timeout.as_secs_f64(),
        port,
        output: output.tail(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::process::Command;

    /// Answer health probes with `not_ready` 503s before switching to 200.
    async fn serve_health(listener: TcpListener, not_ready: usize) {
        let mut remaining = not_ready;
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = if remaining > 0 {
                remaining -= 1;
                "HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            } else {
                "HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            };
            let _ = stream.write_all(response.as_bytes()).await;
        }
    }

    fn spawn_long_running() -> Child {
        Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("failed to spawn sleep")
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn becomes_ready_after_not_ready_cycles() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_health(listener, 2));

        let mut child = spawn_long_running();
        let output = OutputBuffer::default();
        let started = Instant::now();
        let result = wait_for_health(&mut child, port, Duration::from_secs(5), &output).await;

        assert!(result.is_ok());
        // Two not-ready cycles mean at least two poll intervals elapsed
        assert!(started.elapsed() >= POLL_INTERVAL * 2);
        let _ = child.kill().await;
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn connection_refused_counts_as_not_ready() {
        // Nothing listens on the port; the poll should keep retrying until
        // the ceiling, not error out on the first refused connection.
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };

        let mut child = spawn_long_running();
        let output = OutputBuffer::default();
        let result = wait_for_health(&mut child, port, Duration::from_millis(600), &output).await;

        assert!(matches!(result, Err(ServerError::HealthTimeout { .. })));
        let _ = child.kill().await;
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn early_exit_fails_with_captured_output() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("exit 1")
            .spawn()
            .expect("failed to spawn sh");
        // Let the child exit before the first probe
        sleep(Duration::from_millis(100)).await;

        let output = OutputBuffer::default();
        output.push("model load failed".to_string());
        let result = wait_for_health(&mut child, 1, Duration::from_secs(5), &output).await;

        match result {
            Err(ServerError::ExitedEarly { output }) => {
                assert!(output.contains("model load failed"));
            }
            other => panic!("expected ExitedEarly, got {other:?}"),
        }
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn timeout_error_reports_duration_and_port() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };

        let mut child = spawn_long_running();
        let output = OutputBuffer::default();
        let result = wait_for_health(&mut child, port, Duration::from_millis(300), &output).await;

        match result {
            Err(ServerError::HealthTimeout {
                waited,
                port: reported,
                ..
            }) => {
                assert!((waited - 0.3).abs() < 1e-6);
                assert_eq!(reported, port);
            }
            other => panic!("expected HealthTimeout, got {other:?}"),
        }
        let _ = child.kill().await;
    }
}
