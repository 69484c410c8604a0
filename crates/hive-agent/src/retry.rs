use hive_core::HiveError;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Configures transport retry behaviour for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum transport retries per request (429 pauses are not counted).
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds.
    pub backoff_max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
        }
    }
}

/// Whether an error is transient and worth retrying.
///
/// Rate limits, timeouts, connection failures, and 5xx responses retry;
/// client errors like 400 do not.
pub fn is_retryable(err: &HiveError) -> bool {
    let lower = err.to_string().to_lowercase();
    if lower.contains("400") || lower.contains("404") {
        return false;
    }
    lower.contains("429")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
        || lower.contains("overloaded")
}

/// Whether an error is a rate-limit response. Rate limits trigger the global
/// pacer pause and are never counted against the session's retry budget.
pub fn is_rate_limited(err: &HiveError) -> bool {
    let lower = err.to_string().to_lowercase();
    lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit")
}

/// Computes the backoff delay for an attempt: exponential with jitter,
/// capped at `backoff_max_ms`.
pub fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let base = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(policy.backoff_max_ms);
    let half = (base / 2).max(1);
    half + rand::thread_rng().gen_range(0..=half)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&HiveError::Http("429 Too Many Requests".into())));
        assert!(is_retryable(&HiveError::Http("500 Internal Server Error".into())));
        assert!(is_retryable(&HiveError::Http("503 Service Unavailable".into())));
        assert!(is_retryable(&HiveError::Http("connection reset by peer".into())));
        assert!(is_retryable(&HiveError::Http("request timed out".into())));
        assert!(!is_retryable(&HiveError::Http("400 Bad Request".into())));
    }

    #[test]
    fn test_rate_limit_classification() {
        assert!(is_rate_limited(&HiveError::Http("429 Too Many Requests".into())));
        assert!(is_rate_limited(&HiveError::Http("rate limit exceeded".into())));
        assert!(!is_rate_limited(&HiveError::Http("503 Service Unavailable".into())));
    }

    #[test]
    fn test_backoff_bounds() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
        };
        for attempt in 0..10 {
            let delay = compute_backoff(&policy, attempt);
            let base = 500u64
                .saturating_mul(2u64.saturating_pow(attempt))
                .min(60_000);
            assert!(delay >= base / 2, "delay {delay} below half of base {base}");
            assert!(delay <= base, "delay {delay} above base {base}");
        }
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
        };
        // Far past the cap, the delay never exceeds the max.
        assert!(compute_backoff(&policy, 30) <= 60_000);
    }
}
