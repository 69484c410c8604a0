use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Caps for the loop detector. Both write caps are configuration; the
/// defaults match the common case of a couple of honest retries before an
/// agent is considered stuck.
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Attempts at or below this count pass through silently.
    pub soft_cap: u32,
    /// Attempts above this count terminate the session.
    pub hard_cap: u32,
    /// Consecutive identical reasoning lines tolerated before the session
    /// may be short-circuited.
    pub reasoning_repeat_cap: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            soft_cap: 2,
            hard_cap: 4,
            reasoning_repeat_cap: 3,
        }
    }
}

/// Verdict for one write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteVerdict {
    /// Permit the write.
    Proceed,
    /// Permit, but tag the call for emphasis in the next prompt; carries the
    /// previous failure message when one was recorded.
    Emphasize {
        /// The most recent failure message for this (agent, path), if any.
        previous_failure: Option<String>,
    },
    /// The per-file attempt cap was exceeded; terminate the session.
    LoopDetected,
}

/// Verdict for one observed reasoning line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningVerdict {
    /// A new line; show it.
    Fresh,
    /// Identical to the previous line; deduplicate before showing.
    Duplicate,
    /// Repeated past the cap; the session may be short-circuited.
    ShortCircuit,
}

#[derive(Default)]
struct DetectorState {
    attempts: HashMap<(String, PathBuf), u32>,
    failures: HashMap<(String, PathBuf), String>,
    reasoning: HashMap<String, (String, u32)>,
}

/// Tracks per-(agent, path) write pressure and duplicate reasoning.
///
/// Counters reset when an agent completes or is abandoned, never in the
/// middle of a session.
#[derive(Default)]
pub struct LoopDetector {
    config: LoopConfig,
    state: Mutex<DetectorState>,
}

impl LoopDetector {
    /// Creates a detector with default caps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detector with the given caps.
    pub fn with_config(config: LoopConfig) -> Self {
        Self {
            config,
            state: Mutex::new(DetectorState::default()),
        }
    }

    /// Registers one write attempt and returns the verdict for it.
    pub fn record_write(&self, agent: &str, path: &Path) -> WriteVerdict {
        let key = (agent.to_string(), path.to_path_buf());
        let mut state = self.state.lock();
        let attempts = state.attempts.entry(key.clone()).or_insert(0);
        *attempts += 1;
        let n = *attempts;
        if n <= self.config.soft_cap {
            WriteVerdict::Proceed
        } else if n <= self.config.hard_cap {
            warn!(
                agent = %agent,
                path = %path.display(),
                attempts = n,
                "Repeated write attempts, emphasizing in next prompt"
            );
            WriteVerdict::Emphasize {
                previous_failure: state.failures.get(&key).cloned(),
            }
        } else {
            warn!(
                agent = %agent,
                path = %path.display(),
                attempts = n,
                "Write attempt cap exceeded, signaling loop"
            );
            WriteVerdict::LoopDetected
        }
    }

    /// Current attempt count for an (agent, path) pair.
    pub fn attempts(&self, agent: &str, path: &Path) -> u32 {
        self.state
            .lock()
            .attempts
            .get(&(agent.to_string(), path.to_path_buf()))
            .copied()
            .unwrap_or(0)
    }

    /// Records a failure message to surface alongside the next emphasized
    /// attempt.
    pub fn record_failure(&self, agent: &str, path: &Path, message: &str) {
        self.state
            .lock()
            .failures
            .insert((agent.to_string(), path.to_path_buf()), message.to_string());
    }

    /// Drops all counters for an agent. Called on completion or abandonment.
    pub fn reset_agent(&self, agent: &str) {
        let mut state = self.state.lock();
        state.attempts.retain(|(a, _), _| a != agent);
        state.failures.retain(|(a, _), _| a != agent);
        state.reasoning.remove(agent);
    }

    /// Observes one line of agent reasoning, tracking consecutive repeats.
    pub fn observe_reasoning(&self, agent: &str, line: &str) -> ReasoningVerdict {
        let mut state = self.state.lock();
        let entry = state
            .reasoning
            .entry(agent.to_string())
            .or_insert_with(|| (String::new(), 0));
        if entry.0 == line {
            entry.1 += 1;
            if entry.1 >= self.config.reasoning_repeat_cap {
                ReasoningVerdict::ShortCircuit
            } else {
                ReasoningVerdict::Duplicate
            }
        } else {
            *entry = (line.to_string(), 0);
            ReasoningVerdict::Fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_writes_proceed() {
        let detector = LoopDetector::new();
        let path = Path::new("/p/API.md");
        assert_eq!(detector.record_write("a", path), WriteVerdict::Proceed);
        assert_eq!(detector.record_write("a", path), WriteVerdict::Proceed);
        assert_eq!(detector.attempts("a", path), 2);
    }

    #[test]
    fn test_emphasis_between_caps() {
        let detector = LoopDetector::new();
        let path = Path::new("/p/X");
        detector.record_write("a", path);
        detector.record_write("a", path);
        detector.record_failure("a", path, "wrote empty content");
        match detector.record_write("a", path) {
            WriteVerdict::Emphasize { previous_failure } => {
                assert_eq!(previous_failure.as_deref(), Some("wrote empty content"));
            }
            other => panic!("expected Emphasize, got {other:?}"),
        }
    }

    #[test]
    fn test_loop_detected_past_hard_cap() {
        let detector = LoopDetector::new();
        let path = Path::new("/p/X");
        // hard_cap = 4: four attempts pass, the fifth signals.
        for _ in 0..4 {
            assert_ne!(detector.record_write("a", path), WriteVerdict::LoopDetected);
        }
        assert_eq!(detector.record_write("a", path), WriteVerdict::LoopDetected);
    }

    #[test]
    fn test_counters_are_per_agent_and_path() {
        let detector = LoopDetector::new();
        let x = Path::new("/p/X");
        let y = Path::new("/p/Y");
        detector.record_write("a", x);
        detector.record_write("b", x);
        detector.record_write("a", y);
        assert_eq!(detector.attempts("a", x), 1);
        assert_eq!(detector.attempts("b", x), 1);
        assert_eq!(detector.attempts("a", y), 1);
    }

    #[test]
    fn test_reset_on_completion() {
        let detector = LoopDetector::new();
        let path = Path::new("/p/X");
        for _ in 0..4 {
            detector.record_write("a", path);
        }
        detector.reset_agent("a");
        assert_eq!(detector.attempts("a", path), 0);
        assert_eq!(detector.record_write("a", path), WriteVerdict::Proceed);
    }

    #[test]
    fn test_custom_caps() {
        let detector = LoopDetector::with_config(LoopConfig {
            soft_cap: 1,
            hard_cap: 2,
            reasoning_repeat_cap: 3,
        });
        let path = Path::new("/p/X");
        assert_eq!(detector.record_write("a", path), WriteVerdict::Proceed);
        assert!(matches!(
            detector.record_write("a", path),
            WriteVerdict::Emphasize { .. }
        ));
        assert_eq!(detector.record_write("a", path), WriteVerdict::LoopDetected);
    }

    #[test]
    fn test_reasoning_dedup_and_short_circuit() {
        let detector = LoopDetector::new();
        assert_eq!(
            detector.observe_reasoning("a", "I will write the file"),
            ReasoningVerdict::Fresh
        );
        assert_eq!(
            detector.observe_reasoning("a", "I will write the file"),
            ReasoningVerdict::Duplicate
        );
        assert_eq!(
            detector.observe_reasoning("a", "I will write the file"),
            ReasoningVerdict::Duplicate
        );
        assert_eq!(
            detector.observe_reasoning("a", "I will write the file"),
            ReasoningVerdict::ShortCircuit
        );
        // A fresh line resets the repeat counter.
        assert_eq!(
            detector.observe_reasoning("a", "trying another approach"),
            ReasoningVerdict::Fresh
        );
    }
}
