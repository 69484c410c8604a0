use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hive_core::context::normalize;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default lease duration before an unreleased lock is reclaimed.
const DEFAULT_TTL_SECS: i64 = 300;

/// The mode of a path lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// One writer, excludes all other holders.
    Exclusive,
    /// Many readers, excluded by any writer.
    Shared,
}

/// The outcome of a lock acquisition attempt.
///
/// Contention is never an error: a held lock yields `Denied` (zero wait) or
/// `TimedOut` (queued past the wait budget).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The lock was granted to the caller.
    Granted,
    /// The lock is held incompatibly and the caller declined to wait.
    Denied,
    /// The caller queued but the wait budget elapsed first.
    TimedOut,
}

/// A currently-held lock on one path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// The agent holding the lock.
    pub holder: String,
    /// Exclusive or shared.
    pub mode: LockMode,
    /// When the lock was granted.
    pub acquired_at: DateTime<Utc>,
    /// When the lease expires and the lock becomes reclaimable.
    pub expires_at: DateTime<Utc>,
}

struct Waiter {
    id: Uuid,
    agent: String,
    mode: LockMode,
    tx: oneshot::Sender<()>,
}

#[derive(Default)]
struct PathLock {
    holders: Vec<LockInfo>,
    waiters: VecDeque<Waiter>,
}

struct CoordState {
    locks: HashMap<PathBuf, PathLock>,
    grants: Vec<(PathBuf, String, DateTime<Utc>)>,
}

/// Named lock registry keyed by canonicalized absolute path.
///
/// Waiters form a FIFO queue per path. When a lock frees, the head waiter is
/// granted if compatible with the remaining holders; consecutive shared
/// waiters are coalesced into one grant round. An exclusive waiter at the
/// head of the queue blocks new shared acquisitions (writer preference).
/// Expired leases are reclaimed lazily on next access.
pub struct FileCoordinator {
    state: Mutex<CoordState>,
    ttl: ChronoDuration,
}

impl FileCoordinator {
    /// Creates a coordinator with the default 5-minute lease.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoordState {
                locks: HashMap::new(),
                grants: Vec::new(),
            }),
            ttl: ChronoDuration::seconds(DEFAULT_TTL_SECS),
        }
    }

    /// Overrides the lease duration.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ChronoDuration::from_std(ttl).unwrap_or(self.ttl);
        self
    }

    /// Attempts to acquire `path` for `agent` in the given mode, waiting up
    /// to `wait_timeout` if the lock is currently held incompatibly.
    pub async fn acquire(
        &self,
        path: &Path,
        agent: &str,
        mode: LockMode,
        wait_timeout: Duration,
    ) -> AcquireOutcome {
        let key = lock_key(path);
        let (waiter_id, rx) = {
            let mut state = self.state.lock().await;
            let ttl = self.ttl;
            let CoordState { locks, grants } = &mut *state;
            let entry = locks.entry(key.clone()).or_default();
            reclaim_expired(entry, &key);
            grant_waiters(entry, &key, grants, ttl);

            // Re-acquire by the same agent refreshes the lease.
            if let Some(held) = entry
                .holders
                .iter_mut()
                .find(|h| h.holder == agent && h.mode == mode)
            {
                held.expires_at = Utc::now() + ttl;
                return AcquireOutcome::Granted;
            }

            if immediately_grantable(entry, mode) {
                let now = Utc::now();
                entry.holders.push(LockInfo {
                    holder: agent.to_string(),
                    mode,
                    acquired_at: now,
                    expires_at: now + ttl,
                });
                grants.push((key.clone(), agent.to_string(), now));
                debug!(path = %key.display(), agent = %agent, ?mode, "Lock granted");
                return AcquireOutcome::Granted;
            }

            if wait_timeout.is_zero() {
                debug!(path = %key.display(), agent = %agent, "Lock denied");
                return AcquireOutcome::Denied;
            }

            let (tx, rx) = oneshot::channel();
            let id = Uuid::new_v4();
            entry.waiters.push_back(Waiter {
                id,
                agent: agent.to_string(),
                mode,
                tx,
            });
            (id, rx)
        };

        match tokio::time::timeout(wait_timeout, rx).await {
            Ok(Ok(())) => AcquireOutcome::Granted,
            _ => {
                // Either the wait elapsed or the coordinator dropped the
                // sender; a grant may still have raced with the timeout.
                let mut state = self.state.lock().await;
                if let Some(entry) = state.locks.get_mut(&key) {
                    if entry.holders.iter().any(|h| h.holder == agent) {
                        return AcquireOutcome::Granted;
                    }
                    entry.waiters.retain(|w| w.id != waiter_id);
                }
                debug!(path = %key.display(), agent = %agent, "Lock wait timed out");
                AcquireOutcome::TimedOut
            }
        }
    }

    /// Releases `agent`'s hold on `path`. Idempotent: releasing a lock not
    /// held (or already reclaimed) returns without error.
    pub async fn release(&self, path: &Path, agent: &str) {
        let key = lock_key(path);
        let mut state = self.state.lock().await;
        let ttl = self.ttl;
        let CoordState { locks, grants } = &mut *state;
        if let Some(entry) = locks.get_mut(&key) {
            reclaim_expired(entry, &key);
            entry.holders.retain(|h| h.holder != agent);
            grant_waiters(entry, &key, grants, ttl);
            if entry.holders.is_empty() && entry.waiters.is_empty() {
                locks.remove(&key);
            }
        }
    }

    /// Cascade release: drops every lock held by `agent` across all paths.
    /// Called when an agent terminates.
    pub async fn release_all(&self, agent: &str) {
        let mut state = self.state.lock().await;
        let ttl = self.ttl;
        let CoordState { locks, grants } = &mut *state;
        let keys: Vec<PathBuf> = locks.keys().cloned().collect();
        for key in keys {
            if let Some(entry) = locks.get_mut(&key) {
                reclaim_expired(entry, &key);
                entry.holders.retain(|h| h.holder != agent);
                grant_waiters(entry, &key, grants, ttl);
                if entry.holders.is_empty() && entry.waiters.is_empty() {
                    locks.remove(&key);
                }
            }
        }
    }

    /// Diagnostic: current holders of `path`.
    pub async fn holders(&self, path: &Path) -> Vec<LockInfo> {
        let key = lock_key(path);
        let mut state = self.state.lock().await;
        match state.locks.get_mut(&key) {
            Some(entry) => {
                reclaim_expired(entry, &key);
                entry.holders.clone()
            }
            None => Vec::new(),
        }
    }

    /// Diagnostic: paths granted to different agents within `window` of each
    /// other, indicating near-simultaneous modification pressure.
    pub async fn detect_conflicts(&self, window: Duration) -> Vec<(PathBuf, Vec<String>)> {
        let window = ChronoDuration::from_std(window).unwrap_or(ChronoDuration::seconds(1));
        let state = self.state.lock().await;
        let mut by_path: HashMap<&PathBuf, Vec<(&String, DateTime<Utc>)>> = HashMap::new();
        for (path, agent, at) in &state.grants {
            by_path.entry(path).or_default().push((agent, *at));
        }
        let mut conflicts = Vec::new();
        for (path, mut grants) in by_path {
            grants.sort_by_key(|(_, at)| *at);
            let mut agents: Vec<String> = Vec::new();
            for pair in grants.windows(2) {
                let (a, ta) = &pair[0];
                let (b, tb) = &pair[1];
                if *tb - *ta <= window && a != b {
                    if !agents.contains(*a) {
                        agents.push((*a).clone());
                    }
                    if !agents.contains(*b) {
                        agents.push((*b).clone());
                    }
                }
            }
            if !agents.is_empty() {
                conflicts.push((path.clone(), agents));
            }
        }
        conflicts.sort_by(|(a, _), (b, _)| a.cmp(b));
        conflicts
    }
}

impl Default for FileCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes the registry key for a path: symlinks resolved when the path
/// exists, lexical normalization otherwise.
fn lock_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| normalize(path))
}

/// True when `mode` can be granted right now without jumping the queue.
fn immediately_grantable(entry: &PathLock, mode: LockMode) -> bool {
    match mode {
        LockMode::Exclusive => entry.holders.is_empty() && entry.waiters.is_empty(),
        LockMode::Shared => {
            entry.holders.iter().all(|h| h.mode == LockMode::Shared)
                && entry
                    .waiters
                    .front()
                    .map_or(true, |w| w.mode == LockMode::Shared)
        }
    }
}

/// Drops holders whose lease has expired. The holder loses the lock; its
/// later release is a no-op.
fn reclaim_expired(entry: &mut PathLock, key: &Path) {
    let now = Utc::now();
    entry.holders.retain(|h| {
        let live = now < h.expires_at;
        if !live {
            warn!(
                path = %key.display(),
                agent = %h.holder,
                "Reclaiming expired lock"
            );
        }
        live
    });
}

/// Grants queued waiters in FIFO order while compatible with the remaining
/// holders, coalescing consecutive shared waiters.
fn grant_waiters(
    entry: &mut PathLock,
    key: &Path,
    grants: &mut Vec<(PathBuf, String, DateTime<Utc>)>,
    ttl: ChronoDuration,
) {
    while let Some(head) = entry.waiters.front() {
        let compatible = match head.mode {
            LockMode::Exclusive => entry.holders.is_empty(),
            LockMode::Shared => entry.holders.iter().all(|h| h.mode == LockMode::Shared),
        };
        if !compatible {
            break;
        }
        if let Some(waiter) = entry.waiters.pop_front() {
            let now = Utc::now();
            entry.holders.push(LockInfo {
                holder: waiter.agent.clone(),
                mode: waiter.mode,
                acquired_at: now,
                expires_at: now + ttl,
            });
            grants.push((key.to_path_buf(), waiter.agent, now));
            let _ = waiter.tx.send(());
            if entry.holders.iter().any(|h| h.mode == LockMode::Exclusive) {
                break;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const NO_WAIT: Duration = Duration::from_secs(0);

    fn p(name: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/hive-test/{name}"))
    }

    #[tokio::test]
    async fn test_exclusive_excludes_exclusive() {
        let coord = FileCoordinator::new();
        let path = p("a.txt");
        assert_eq!(
            coord.acquire(&path, "b1", LockMode::Exclusive, NO_WAIT).await,
            AcquireOutcome::Granted
        );
        assert_eq!(
            coord.acquire(&path, "b2", LockMode::Exclusive, NO_WAIT).await,
            AcquireOutcome::Denied
        );
    }

    #[tokio::test]
    async fn test_shared_holders_coexist() {
        let coord = FileCoordinator::new();
        let path = p("shared.json");
        assert_eq!(
            coord.acquire(&path, "r1", LockMode::Shared, NO_WAIT).await,
            AcquireOutcome::Granted
        );
        assert_eq!(
            coord.acquire(&path, "r2", LockMode::Shared, NO_WAIT).await,
            AcquireOutcome::Granted
        );
        assert_eq!(coord.holders(&path).await.len(), 2);
        // Exclusive denied while shared holders exist.
        assert_eq!(
            coord.acquire(&path, "w", LockMode::Exclusive, NO_WAIT).await,
            AcquireOutcome::Denied
        );
    }

    #[tokio::test]
    async fn test_acquire_release_round_trip() {
        let coord = FileCoordinator::new();
        let path = p("rt.txt");
        coord.acquire(&path, "a", LockMode::Exclusive, NO_WAIT).await;
        coord.release(&path, "a").await;
        assert!(coord.holders(&path).await.is_empty());
        // The registry entry is gone; state is as before the acquire.
        assert_eq!(
            coord.acquire(&path, "b", LockMode::Exclusive, NO_WAIT).await,
            AcquireOutcome::Granted
        );
    }

    #[tokio::test]
    async fn test_release_not_held_is_noop() {
        let coord = FileCoordinator::new();
        coord.release(&p("never.txt"), "ghost").await;
    }

    #[tokio::test]
    async fn test_waiter_granted_on_release() {
        let coord = Arc::new(FileCoordinator::new());
        let path = p("queue.txt");
        coord.acquire(&path, "first", LockMode::Exclusive, NO_WAIT).await;

        let waiter = {
            let coord = coord.clone();
            let path = path.clone();
            tokio::spawn(async move {
                coord
                    .acquire(&path, "second", LockMode::Exclusive, Duration::from_secs(5))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        coord.release(&path, "first").await;
        assert_eq!(waiter.await.unwrap(), AcquireOutcome::Granted);
        let holders = coord.holders(&path).await;
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].holder, "second");
    }

    #[tokio::test]
    async fn test_wait_timeout() {
        let coord = FileCoordinator::new();
        let path = p("slow.txt");
        coord.acquire(&path, "holder", LockMode::Exclusive, NO_WAIT).await;
        let outcome = coord
            .acquire(&path, "waiter", LockMode::Exclusive, Duration::from_millis(50))
            .await;
        assert_eq!(outcome, AcquireOutcome::TimedOut);
        // The timed-out waiter left the queue; release frees the path fully.
        coord.release(&path, "holder").await;
        assert!(coord.holders(&path).await.is_empty());
    }

    #[tokio::test]
    async fn test_writer_preference_blocks_new_shared() {
        let coord = Arc::new(FileCoordinator::new());
        let path = p("pref.txt");
        coord.acquire(&path, "r1", LockMode::Shared, NO_WAIT).await;

        // A writer queues behind the shared holder.
        let writer = {
            let coord = coord.clone();
            let path = path.clone();
            tokio::spawn(async move {
                coord
                    .acquire(&path, "w", LockMode::Exclusive, Duration::from_secs(5))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // New shared acquisitions are blocked while the writer waits.
        assert_eq!(
            coord.acquire(&path, "r2", LockMode::Shared, NO_WAIT).await,
            AcquireOutcome::Denied
        );

        coord.release(&path, "r1").await;
        assert_eq!(writer.await.unwrap(), AcquireOutcome::Granted);
    }

    #[tokio::test]
    async fn test_shared_waiters_coalesce() {
        let coord = Arc::new(FileCoordinator::new());
        let path = p("coalesce.txt");
        coord.acquire(&path, "w", LockMode::Exclusive, NO_WAIT).await;

        let mut readers = Vec::new();
        for name in ["r1", "r2", "r3"] {
            let coord = coord.clone();
            let path = path.clone();
            readers.push(tokio::spawn(async move {
                coord
                    .acquire(&path, name, LockMode::Shared, Duration::from_secs(5))
                    .await
            }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        coord.release(&path, "w").await;

        for reader in readers {
            assert_eq!(reader.await.unwrap(), AcquireOutcome::Granted);
        }
        assert_eq!(coord.holders(&path).await.len(), 3);
    }

    #[tokio::test]
    async fn test_release_all_cascade() {
        let coord = FileCoordinator::new();
        coord.acquire(&p("one.txt"), "agent", LockMode::Exclusive, NO_WAIT).await;
        coord.acquire(&p("two.txt"), "agent", LockMode::Exclusive, NO_WAIT).await;
        coord.release_all("agent").await;
        assert!(coord.holders(&p("one.txt")).await.is_empty());
        assert!(coord.holders(&p("two.txt")).await.is_empty());
    }

    #[tokio::test]
    async fn test_ttl_reclaim() {
        let coord = FileCoordinator::new().with_ttl(Duration::from_millis(20));
        let path = p("ttl.txt");
        coord.acquire(&path, "sleepy", LockMode::Exclusive, NO_WAIT).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Reclaimed lazily on next access; a new agent can take the lock.
        assert_eq!(
            coord.acquire(&path, "fresh", LockMode::Exclusive, NO_WAIT).await,
            AcquireOutcome::Granted
        );
        // The reclaimed holder's release is a no-op.
        coord.release(&path, "sleepy").await;
        let holders = coord.holders(&path).await;
        assert_eq!(holders.len(), 1);
        assert_eq!(holders[0].holder, "fresh");
    }

    #[tokio::test]
    async fn test_reacquire_refreshes_lease() {
        let coord = FileCoordinator::new();
        let path = p("refresh.txt");
        coord.acquire(&path, "a", LockMode::Exclusive, NO_WAIT).await;
        assert_eq!(
            coord.acquire(&path, "a", LockMode::Exclusive, NO_WAIT).await,
            AcquireOutcome::Granted
        );
        assert_eq!(coord.holders(&path).await.len(), 1);
    }

    #[tokio::test]
    async fn test_detect_conflicts() {
        let coord = FileCoordinator::new();
        let path = p("hot.json");
        coord.acquire(&path, "b", LockMode::Exclusive, NO_WAIT).await;
        coord.release(&path, "b").await;
        coord.acquire(&path, "c", LockMode::Exclusive, NO_WAIT).await;
        coord.release(&path, "c").await;

        let conflicts = coord.detect_conflicts(Duration::from_secs(10)).await;
        assert_eq!(conflicts.len(), 1);
        let (_, agents) = &conflicts[0];
        assert!(agents.contains(&"b".to_string()));
        assert!(agents.contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn test_trailing_separator_normalized() {
        let coord = FileCoordinator::new();
        coord
            .acquire(Path::new("/tmp/hive-test/norm.txt/"), "a", LockMode::Exclusive, NO_WAIT)
            .await;
        assert_eq!(
            coord
                .acquire(Path::new("/tmp/hive-test/norm.txt"), "b", LockMode::Exclusive, NO_WAIT)
                .await,
            AcquireOutcome::Denied
        );
    }
}
