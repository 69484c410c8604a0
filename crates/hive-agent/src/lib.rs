//! The agent execution loop: one LLM chat session per agent invocation.
//!
//! # Main types
//!
//! - [`AgentRunner`] — Drives the chat-with-tools protocol, enforcing the
//!   per-session tool budget and wall-clock timeout.
//! - [`LlmBackend`] — Transport trait with a production HTTP implementation
//!   ([`HttpBackend`]) speaking the Anthropic and OpenAI wire formats.
//! - [`BackendFactory`] — Injection point for mock backends in tests and
//!   custom providers in embedders.
//! - [`Pacer`] — Process-wide leaky-bucket rate limiter shared by all
//!   concurrent sessions; a 429 pauses every session together.
//! - [`RetryPolicy`] — Exponential backoff with jitter for transport errors.

/// LLM transport trait and response types.
pub mod backend;
/// Provider and model configuration.
pub mod config;
/// HTTP transport for Anthropic and OpenAI wire formats.
pub mod http;
/// Process-wide request pacing.
pub mod pacing;
/// Transport retry classification and backoff.
pub mod retry;
/// The session loop.
pub mod runner;

pub use backend::{BackendFactory, LlmBackend, LlmResponse};
pub use config::{LlmProvider, ModelConfig, SessionLimits};
pub use http::HttpBackend;
pub use pacing::Pacer;
pub use retry::{compute_backoff, is_rate_limited, is_retryable, RetryPolicy};
pub use runner::AgentRunner;
