//! Launch a local llama-server, talk to it, and constrain its output.
//!
//! `local_llm` is a thin convenience layer over an external `llama-server`
//! binary. It covers the lifecycle gaps the binary itself leaves open:
//!
//! - [`start_server`] spawns `llama-server` as a child process with a
//!   validated argument list, waits for its `/health` endpoint, and returns
//!   a [`ServerHandle`] for liveness checks and graceful shutdown.
//! - [`ChatClient`] sends single OpenAI-compatible chat completion requests
//!   to the running server.
//! - [`multiple_choice_grammar`] generates GBNF grammar files that constrain
//!   the model's output to a fixed set of answers, optionally behind a
//!   thinking-block envelope.
//!
//! ```no_run
//! use local_llm::{start_server, ChatClient, ChatRequest, ServerConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ServerConfig::new("/models/llama.gguf", 4096, 99).port(8080);
//! let mut server = start_server(config).await?;
//!
//! let client = ChatClient::from_env();
//! let answer = client.chat(&ChatRequest::new("What is the capital of France?")).await?;
//! println!("{answer}");
//!
//! server.terminate().await;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod grammar;
pub mod server;

pub use client::{ChatClient, ChatRequest, ClientError};
pub use grammar::{GrammarError, load_grammar, multiple_choice_grammar, strip_thinking};
pub use server::{ServerConfig, ServerError, ServerHandle, ServerResult, start_server};
