//! Output capture and console forwarding for the server process.
//!
//! Two reader tasks drain the child's stdout and stderr into a shared ring
//! buffer so startup failures can report the last output lines. Once the
//! health check passes, the same tasks optionally echo lines to the console.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::debug;

/// Tail of output retained for startup error reporting.
const MAX_CAPTURED_LINES: usize = 200;

/// Ring buffer of recent output lines shared with the reader tasks.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    lines: Mutex<VecDeque<String>>,
}

impl OutputBuffer {
    pub(crate) fn push(&self, line: String) {
        let mut lines = self.lines.lock().unwrap();
        if lines.len() >= MAX_CAPTURED_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// The captured tail joined with newlines, or a placeholder when empty.
    pub fn tail(&self) -> String {
        let lines = self.lines.lock().unwrap();
        if lines.is_empty() {
            "(no output)".to_string()
        } else {
            lines.iter().cloned().collect::<Vec<_>>().join("\n")
        }
    }
}

/// Capture state for one server process: the shared buffer, the console
/// echo switch, and the reader task handles.
#[derive(Debug)]
pub struct OutputCapture {
    pub(crate) buffer: Arc<OutputBuffer>,
    echo: Arc<AtomicBool>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputCapture {
    /// Begin echoing captured lines to the console.
    pub(crate) fn enable_forwarding(&self) {
        self.echo.store(true, Ordering::Relaxed);
    }

    /// Abort the reader tasks. Safe to call more than once.
    pub(crate) fn abort(&self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

/// Take the child's stdout/stderr pipes and start capture tasks for both.
pub fn spawn_output_capture(child: &mut Child) -> OutputCapture {
    let buffer = Arc::new(OutputBuffer::default());
    let echo = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::with_capacity(2);

    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, Arc::clone(&buffer), Arc::clone(&echo)));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, Arc::clone(&buffer), Arc::clone(&echo)));
    }

    OutputCapture {
        buffer,
        echo,
        readers,
    }
}

fn spawn_reader<R>(stream: R, buffer: Arc<OutputBuffer>, echo: Arc<AtomicBool>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.replace('\r', "");
            if echo.load(Ordering::Relaxed) {
                println!("{line}");
            }
            buffer.push(line);
        }
        debug!("output reader task exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[test]
    fn buffer_caps_at_tail() {
        let buffer = OutputBuffer::default();
        for i in 0..(MAX_CAPTURED_LINES + 10) {
            buffer.push(format!("line {i}"));
        }
        let tail = buffer.tail();
        assert!(!tail.contains("line 9\n"));
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with(&format!("line {}", MAX_CAPTURED_LINES + 9)));
    }

    #[test]
    fn empty_buffer_reports_placeholder() {
        let buffer = OutputBuffer::default();
        assert_eq!(buffer.tail(), "(no output)");
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn capture_collects_both_streams_and_strips_cr() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("printf 'out\\r\\n'; printf 'err\\n' >&2")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to spawn sh");

        let capture = spawn_output_capture(&mut child);
        child.wait().await.unwrap();
        // Let the reader tasks drain the closed pipes
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let tail = capture.buffer.tail();
        assert!(tail.contains("out"));
        assert!(tail.contains("err"));
        assert!(!tail.contains('\r'));
    }
}
