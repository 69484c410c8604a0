use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Default pause applied to every session when the provider rate-limits.
const DEFAULT_PAUSE: Duration = Duration::from_secs(30);

struct PacerState {
    tokens: f64,
    last_refill: Instant,
    paused_until: Option<Instant>,
}

/// Process-wide leaky-bucket rate limiter for outbound LLM calls.
///
/// One pacer is shared by all concurrent agent sessions. A 429 from any
/// session pauses the whole bucket, so every session waits together.
pub struct Pacer {
    capacity: f64,
    refill_per_sec: f64,
    pause: Duration,
    state: Mutex<PacerState>,
}

impl Pacer {
    /// Creates a pacer allowing roughly `requests_per_min` requests per
    /// minute, with a burst of the same size.
    pub fn new(requests_per_min: f64) -> Self {
        let capacity = requests_per_min.max(1.0);
        Self {
            capacity,
            refill_per_sec: capacity / 60.0,
            pause: DEFAULT_PAUSE,
            state: Mutex::new(PacerState {
                tokens: capacity,
                last_refill: Instant::now(),
                paused_until: None,
            }),
        }
    }

    /// Overrides the rate-limit pause duration.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Waits until a request slot is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                if let Some(until) = state.paused_until {
                    if now < until {
                        Some(until - now)
                    } else {
                        state.paused_until = None;
                        None
                    }
                } else {
                    None
                }
            };
            if let Some(wait) = wait {
                tokio::time::sleep(wait).await;
                continue;
            }

            let next = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill);
                state.tokens =
                    (state.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
                state.last_refill = now;
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64(
                        (1.0 - state.tokens) / self.refill_per_sec,
                    ))
                }
            };
            match next {
                None => return,
                Some(wait) => tokio::time::sleep(wait).await,
            }
        }
    }

    /// Pauses the whole bucket. Called on a 429; gates every concurrent
    /// session, including ones scheduled after the pause.
    pub async fn pause(&self) {
        let mut state = self.state.lock().await;
        let until = Instant::now() + self.pause;
        let until = match state.paused_until {
            Some(existing) if existing > until => existing,
            _ => until,
        };
        warn!(pause_secs = self.pause.as_secs(), "Rate limited; pausing all sessions");
        state.paused_until = Some(until);
    }
}
