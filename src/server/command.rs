//! Binary resolution, argument construction, and process spawning.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::config::ServerConfig;
use super::error::{ServerError, ServerResult};

/// Name of the server binary looked up on PATH.
pub const SERVER_BINARY: &str = "llama-server";

/// Environment variable overriding binary resolution.
pub const SERVER_PATH_ENV: &str = "LOCAL_LLM_SERVER_BIN";

/// Resolve the llama-server binary.
///
/// Precedence: explicit path in the config, then the `LOCAL_LLM_SERVER_BIN`
/// environment variable, then a PATH search.
pub fn resolve_server_binary(config: &ServerConfig) -> ServerResult<PathBuf> {
    if let Some(path) = &config.server_binary {
        if path.exists() {
            debug!("using llama-server from config: {}", path.display());
            return Ok(path.clone());
        }
        return Err(ServerError::BinaryNotFound {
            binary: path.display().to_string(),
        });
    }

    if let Ok(env_path) = std::env::var(SERVER_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            debug!("using llama-server from {SERVER_PATH_ENV}: {}", path.display());
            return Ok(path);
        }
        warn!(
            "{SERVER_PATH_ENV} points at a missing file: {}, falling back to PATH",
            path.display()
        );
    }

    which::which(SERVER_BINARY).map_err(|_| ServerError::BinaryNotFound {
        binary: SERVER_BINARY.to_string(),
    })
}

/// Map the configuration onto the llama-server argument list.
///
/// Order is deterministic: required flags first, then optional flags only
/// when set, then any raw extra arguments verbatim.
pub fn build_args(config: &ServerConfig) -> Vec<String> {
    let mut args = vec![
        "-m".to_string(),
        config.model_path.display().to_string(),
        "-c".to_string(),
        config.n_ctx.to_string(),
        "-ngl".to_string(),
        config.n_gpu_layers.to_string(),
        "--port".to_string(),
        config.port.to_string(),
        "--host".to_string(),
        config.host.clone(),
    ];
    if let Some(threads) = config.threads {
        args.push("-t".to_string());
        args.push(threads.to_string());
    }
    if let Some(http_threads) = config.http_threads {
        args.push("--threads-http".to_string());
        args.push(http_threads.to_string());
    }
    if let Some(slots) = config.slots {
        args.push("--slots".to_string());
        args.push(slots.to_string());
    }
    if let Some(cors) = &config.cors {
        args.push("--cors".to_string());
        args.push(cors.clone());
    }
    if config.log_disable {
        args.push("--log-disable".to_string());
    }
    if config.log_colors == Some(false) {
        args.push("--log-colors=0".to_string());
    }
    if config.quiet {
        args.push("-q".to_string());
    }
    if config.verbose {
        args.push("-v".to_string());
    }
    if let Some(key) = &config.api_key {
        args.push("--api-key".to_string());
        args.push(key.clone());
    }
    args.extend(config.extra_args.iter().cloned());
    args
}

/// Spawn the server with piped stdout/stderr and per-child env overrides.
pub fn spawn_server(binary: &Path, config: &ServerConfig) -> ServerResult<Child> {
    let mut cmd = Command::new(binary);
    cmd.args(build_args(config));
    cmd.envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning {} on port {}", binary.display(), config.port);
    cmd.spawn().map_err(ServerError::Spawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn args_have_fixed_required_order() {
        let config = ServerConfig::new("/models/test.gguf", 4096, 32).port(8123);
        let args = build_args(&config);
        assert_eq!(
            args,
            vec![
                "-m",
                "/models/test.gguf",
                "-c",
                "4096",
                "-ngl",
                "32",
                "--port",
                "8123",
                "--host",
                "127.0.0.1",
            ]
        );
    }

    #[test]
    fn optional_flags_appear_only_when_set() {
        let config = ServerConfig::new("/models/test.gguf", 2048, 1);
        let args = build_args(&config);
        for flag in ["-t", "--threads-http", "--slots", "--cors", "--api-key"] {
            assert!(!args.contains(&flag.to_string()), "unexpected {flag}");
        }

        let config = ServerConfig::new("/models/test.gguf", 2048, 1)
            .threads(6)
            .http_threads(2)
            .slots(4)
            .cors("*")
            .log_disable(true)
            .log_colors(false)
            .quiet(true)
            .verbose(true)
            .api_key("secret")
            .extra_args(["--mlock"]);
        let args = build_args(&config);
        let tail: Vec<&str> = args.iter().map(String::as_str).collect();
        assert_eq!(
            &tail[10..],
            &[
                "-t",
                "6",
                "--threads-http",
                "2",
                "--slots",
                "4",
                "--cors",
                "*",
                "--log-disable",
                "--log-colors=0",
                "-q",
                "-v",
                "--api-key",
                "secret",
                "--mlock",
            ]
        );
    }

    #[test]
    fn log_colors_true_emits_nothing() {
        let config = ServerConfig::new("/models/test.gguf", 2048, 1).log_colors(true);
        let args = build_args(&config);
        assert!(!args.iter().any(|a| a.starts_with("--log-colors")));
    }

    #[test]
    fn explicit_binary_wins_over_resolution() {
        let fake = NamedTempFile::new().unwrap();
        let config =
            ServerConfig::new("/models/test.gguf", 2048, 1).server_binary(fake.path());
        let resolved = resolve_server_binary(&config).unwrap();
        assert_eq!(resolved, fake.path());
    }

    #[test]
    fn missing_explicit_binary_fails() {
        let config = ServerConfig::new("/models/test.gguf", 2048, 1)
            .server_binary("/nonexistent/llama-server");
        assert!(matches!(
            resolve_server_binary(&config),
            Err(ServerError::BinaryNotFound { .. })
        ));
    }
}
