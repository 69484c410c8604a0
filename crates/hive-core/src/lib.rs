//! Core types and error definitions for the Hive swarm orchestrator.
//!
//! This crate provides the foundational types shared across all Hive crates:
//! error handling, chat message representations, tool call abstractions, the
//! declarative workflow spec, and the per-run context.
//!
//! # Main types
//!
//! - [`HiveError`] — Unified error enum for all Hive subsystems.
//! - [`HiveResult`] — Convenience alias for `Result<T, HiveError>`.
//! - [`Role`] / [`Message`] — Chat message types for LLM sessions.
//! - [`ToolCall`] / [`ToolResult`] / [`ToolDescriptor`] — Tool invocation types.
//! - [`WorkflowSpec`] / [`AgentTask`] — The declarative workflow input.
//! - [`Artifact`] — A structured value shared between agents.
//! - [`AgentResult`] — Outcome of one agent invocation attempt.
//! - [`RunContext`] — Immutable per-run facts (project root, requirements).

/// Structured artifacts shared between agents.
pub mod artifact;
/// Immutable per-run context and path confinement.
pub mod context;
/// Unified error type and result alias.
pub mod error;
/// Chat message types.
pub mod message;
/// Per-agent invocation results.
pub mod result;
/// Tool call, result, and catalog descriptor types.
pub mod tool;
/// Declarative workflow spec loading and validation.
pub mod workflow;

pub use artifact::Artifact;
pub use context::RunContext;
pub use error::{HiveError, HiveResult};
pub use message::{Message, Role};
pub use result::AgentResult;
pub use tool::{ToolCall, ToolDescriptor, ToolResult};
pub use workflow::{AgentTask, WorkflowSpec};
