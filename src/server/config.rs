//! Launch configuration for llama-server.

use std::path::PathBuf;
use std::time::Duration;

use super::error::{ServerError, ServerResult};

/// Default health check ceiling, measured from spawn.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for one llama-server process.
///
/// Built with chained setters and handed to [`super::start_server`], after
/// which it is immutable. Only the model path, context size, and GPU layer
/// count are required; everything else has the llama-server defaults.
///
/// ```
/// use local_llm::ServerConfig;
///
/// let config = ServerConfig::new("/models/llama.gguf", 4096, 99)
///     .port(8081)
///     .threads(8)
///     .api_key("secret");
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Path to the GGUF model file
    pub model_path: PathBuf,
    /// Context window size (`-c`)
    pub n_ctx: u32,
    /// Layers to offload to the GPU (`-ngl`)
    pub n_gpu_layers: u32,
    /// Port the server listens on
    pub port: u16,
    /// Host the server binds to
    pub host: String,
    /// Worker thread count (`-t`)
    pub threads: Option<u32>,
    /// HTTP thread count (`--threads-http`)
    pub http_threads: Option<u32>,
    /// Concurrent request slots (`--slots`)
    pub slots: Option<u32>,
    /// CORS origin (`--cors`)
    pub cors: Option<String>,
    /// Disable server-side logging (`--log-disable`)
    pub log_disable: bool,
    /// Explicitly enable or disable colored logs; `Some(false)` emits
    /// `--log-colors=0`
    pub log_colors: Option<bool>,
    /// Quiet mode (`-q`)
    pub quiet: bool,
    /// Verbose mode (`-v`)
    pub verbose: bool,
    /// API key the server will require (`--api-key`)
    pub api_key: Option<String>,
    /// Raw arguments appended after all mapped flags
    pub extra_args: Vec<String>,
    /// Environment variables set on the child process only
    pub env: Vec<(String, String)>,
    /// Explicit path to the llama-server binary, bypassing resolution
    pub server_binary: Option<PathBuf>,
    /// Forward server output to the console once healthy
    pub stream_logs: bool,
    /// Wall-clock ceiling for the health check, measured from spawn
    pub health_timeout: Duration,
}

impl ServerConfig {
    /// Create a configuration with required fields and defaults for the rest.
    pub fn new(model_path: impl Into<PathBuf>, n_ctx: u32, n_gpu_layers: u32) -> Self {
        Self {
            model_path: model_path.into(),
            n_ctx,
            n_gpu_layers,
            port: 8080,
            host: "127.0.0.1".to_string(),
            threads: None,
            http_threads: None,
            slots: None,
            cors: None,
            log_disable: false,
            log_colors: None,
            quiet: false,
            verbose: false,
            api_key: None,
            extra_args: Vec::new(),
            env: Vec::new(),
            server_binary: None,
            stream_logs: true,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    /// Set the port the server listens on.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the host the server binds to.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the worker thread count.
    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set the HTTP thread count.
    pub fn http_threads(mut self, http_threads: u32) -> Self {
        self.http_threads = Some(http_threads);
        self
    }

    /// Set the number of concurrent request slots.
    pub fn slots(mut self, slots: u32) -> Self {
        self.slots = Some(slots);
        self
    }

    /// Set the CORS origin.
    pub fn cors(mut self, cors: impl Into<String>) -> Self {
        self.cors = Some(cors.into());
        self
    }

    /// Disable server-side logging.
    pub fn log_disable(mut self, disable: bool) -> Self {
        self.log_disable = disable;
        self
    }

    /// Enable or disable colored server logs.
    pub fn log_colors(mut self, colors: bool) -> Self {
        self.log_colors = Some(colors);
        self
    }

    /// Enable quiet mode.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Enable verbose mode.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Set the API key the server will require.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Append raw arguments after all mapped flags.
    pub fn extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable on the child process.
    ///
    /// Overrides apply to the spawned process only; the current process
    /// environment is never mutated.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Use an explicit llama-server binary instead of PATH resolution.
    pub fn server_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_binary = Some(path.into());
        self
    }

    /// Enable or disable console log forwarding.
    pub fn stream_logs(mut self, stream: bool) -> Self {
        self.stream_logs = stream;
        self
    }

    /// Set the wall-clock ceiling for the health check.
    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    /// Validate every field, failing fast on obvious user errors before a
    /// process is spawned.
    pub fn validate(&self) -> ServerResult<()> {
        if self.model_path.as_os_str().is_empty() {
            return Err(ServerError::Validation {
                field: "model_path",
                reason: "must be a non-empty path".to_string(),
            });
        }
        if !self.model_path.exists() {
            return Err(ServerError::ModelNotFound {
                path: self.model_path.clone(),
            });
        }
        if self.n_ctx == 0 {
            return Err(positive_int("n_ctx", self.n_ctx));
        }
        if self.n_gpu_layers == 0 {
            return Err(positive_int("n_gpu_layers", self.n_gpu_layers));
        }
        if self.port == 0 {
            return Err(ServerError::Validation {
                field: "port",
                reason: "must be in 1..=65535".to_string(),
            });
        }
        for (field, value) in [
            ("threads", self.threads),
            ("http_threads", self.http_threads),
            ("slots", self.slots),
        ] {
            if value == Some(0) {
                return Err(ServerError::Validation {
                    field,
                    reason: "must be a positive integer if provided".to_string(),
                });
            }
        }
        Ok(())
    }

}

fn positive_int(field: &'static str, got: u32) -> ServerError {
    ServerError::Validation {
        field,
        reason: format!("must be a positive integer (got {got})"),
    }
}
