//! # aura-runtime
//!
//! Model providers for the aura assistant.
//!
//! ## Providers
//!
//! - **OpenAI-compatible**: streams `/chat/completions` with function calling.
//!   Any server speaking that API works (OpenAI, Ollama's `/v1`, vLLM).
//!
//! ## Usage
//!
//! ```rust,ignore
//! use aura_runtime::OpenAiProvider;
//!
//! let provider = Arc::new(OpenAiProvider::from_env()?);
//! let agent = Agent::new(provider, Arc::new(tools), AgentConfig::default());
//! ```

pub mod openai;
mod sse;

pub use openai::{OpenAiConfig, OpenAiProvider};
