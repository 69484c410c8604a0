//! Coordination primitives shared by concurrent agent sessions.
//!
//! # Main types
//!
//! - [`FileCoordinator`] — Path-keyed exclusive/shared lock registry with
//!   FIFO wait queues, TTL reclaim, and writer preference.
//! - [`CommunicationHub`] — Structured artifact store, per-agent results,
//!   file attribution, and the flat completed-task rendering used in prompts.
//! - [`LoopDetector`] — Per-(agent, path) write-attempt counters and
//!   duplicate-reasoning tracking with escalation signaling.

/// Path-keyed lock registry.
pub mod coordinator;
/// Shared artifact store and run-state hub.
pub mod hub;
/// Write-attempt and reasoning-repeat tracking.
pub mod loop_detector;

pub use coordinator::{AcquireOutcome, FileCoordinator, LockInfo, LockMode};
pub use hub::{CommunicationHub, Decision, FileAttribution, HubMessage, HubSnapshot};
pub use loop_detector::{LoopConfig, LoopDetector, ReasoningVerdict, WriteVerdict};
