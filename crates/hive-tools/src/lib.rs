//! The tool invocation layer: registry, argument-repair pipeline, content
//! synthesis, and the builtin tool surface exposed to every agent.
//!
//! # Main types
//!
//! - [`ToolRegistry`] — Declares callable tools and their schemas; the
//!   catalog published to the LLM.
//! - [`ToolInvoker`] — The only place that reflects on argument shapes:
//!   alias repair, default filling, placeholder replacement, path
//!   confinement, lock acquisition, and loop-detector gating.
//! - [`ContentSynthesizer`] — Deterministic default content for well-known
//!   file types.
//! - [`builtin`] — The mandatory tool surface (`write_file`, `read_file`,
//!   `run_command`, `record_decision`, `share_artifact`,
//!   `verify_deliverables`, `dependency_check`, `complete_task`).

/// Builtin tool handlers.
pub mod builtin;
/// The invocation pipeline.
pub mod invoker;
/// Tool trait, metadata, and registry.
pub mod registry;
/// Deterministic scaffold content generation.
pub mod synth;

pub use builtin::register_builtins;
pub use invoker::{InvokeOutcome, ToolInvoker};
pub use registry::{ToolCtx, ToolHandler, ToolMeta, ToolOutput, ToolRegistry};
pub use synth::ContentSynthesizer;
