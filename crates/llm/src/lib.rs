//! LLM transport adapters for the thought graph engine.
//!
//! Implements the [`thoughts::LlmClient`] port over Ollama's HTTP API.
//! Other backends are added as further implementations in this crate without
//! any change to `thoughts` or `nodes`.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing and
//! the mapping of statuses and rate-limit headers onto [`thoughts::LlmError`]
//! live here. Clients make exactly one request per call; retrying is the
//! calling node's decision.

mod client;
mod error;
mod types;

pub use client::OllamaClient;
