use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;

use crate::error::Result;
use crate::request::{Fingerprint, Request};

use super::{is_success, Lease, PrioritySelector, QueueStatus, SchedulerQueue};

#[derive(Debug, Clone, Eq, PartialEq)]
struct HeapEntry {
    priority: i64,
    seq: u64,
    fingerprint: Fingerprint,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Highest priority first; ties broken newest-first (higher seq wins),
        // matching `ZREVRANGEBYSCORE`'s member-insertion-order tie-break.
        self.priority.cmp(&other.priority).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
struct PendingEntry {
    request: Request,
    priority: i64,
    leased_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    waiting: BinaryHeap<HeapEntry>,
    requests: HashMap<Fingerprint, Request>,
    pending: HashMap<Fingerprint, PendingEntry>,
    failure: HashMap<Fingerprint, Request>,
    next_seq: u64,
}

/// In-process scheduler queue: a max-heap of waiting requests plus hash maps
/// for in-flight leases and quarantined failures. Matches the reference
/// implementation's `MemoryQueue` data shape one for one.
pub struct InMemorySchedulerQueue {
    state: Mutex<State>,
    pending_threshold: Duration,
}

impl InMemorySchedulerQueue {
    pub fn new(pending_threshold: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            pending_threshold,
        }
    }
}

impl Default for InMemorySchedulerQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl SchedulerQueue for InMemorySchedulerQueue {
    async fn add(&self, requests: Vec<Request>) -> Result<usize> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let mut added = 0usize;

        for request in requests {
            let fp = request.fingerprint();

            if let Some(entry) = state.pending.get(&fp) {
                let age = now.signed_duration_since(entry.leased_at);
                let stale = age
                    .to_std()
                    .map(|d| d >= self.pending_threshold)
                    .unwrap_or(true);
                if !stale {
                    continue;
                }
                state.pending.remove(&fp);
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            state.requests.insert(fp, request.clone());
            state.failure.remove(&fp);
            state.waiting.push(HeapEntry {
                priority: request.priority,
                seq,
                fingerprint: fp,
            });
            added += 1;
        }

        Ok(added)
    }

    async fn get(&self, priority: &PrioritySelector) -> Result<Option<Lease>> {
        let mut state = self.state.lock();
        let mut skipped = Vec::new();

        let result = loop {
            let Some(entry) = state.waiting.pop() else {
                break None;
            };
            let Some(request) = state.requests.get(&entry.fingerprint) else {
                // stale heap entry superseded by a later add/removal; skip it.
                continue;
            };
            if !priority.matches(entry.priority) {
                skipped.push(entry);
                continue;
            }

            let request = state.requests.remove(&entry.fingerprint).expect("checked above");
            let leased_at = Utc::now();
            state.pending.insert(
                entry.fingerprint,
                PendingEntry {
                    request: request.clone(),
                    priority: entry.priority,
                    leased_at,
                },
            );
            break Some(Lease {
                request,
                fingerprint: entry.fingerprint,
                leased_at,
            });
        };

        for entry in skipped {
            state.waiting.push(entry);
        }
        Ok(result)
    }

    async fn set_result(&self, lease: Lease, ok: i8) -> Result<()> {
        let mut state = self.state.lock();
        let Some(entry) = state.pending.remove(&lease.fingerprint) else {
            return Ok(());
        };
        if !is_success(ok) {
            state.failure.insert(lease.fingerprint, entry.request);
        }
        Ok(())
    }

    async fn check_status(&self) -> Result<QueueStatus> {
        let mut state = self.state.lock();
        let now = Utc::now();

        let stale: Vec<Fingerprint> = state
            .pending
            .iter()
            .filter_map(|(fp, entry)| {
                let age = now.signed_duration_since(entry.leased_at);
                let expired = age
                    .to_std()
                    .map(|d| d >= self.pending_threshold)
                    .unwrap_or(true);
                expired.then_some(*fp)
            })
            .collect();

        for fp in stale {
            if let Some(entry) = state.pending.remove(&fp) {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.requests.insert(fp, entry.request);
                state.waiting.push(HeapEntry {
                    priority: entry.priority,
                    seq,
                    fingerprint: fp,
                });
            }
        }

        Ok(QueueStatus {
            waiting: state.requests.len(),
            pending: state.pending.len(),
            failure: state.failure.len(),
        })
    }

    async fn failure_to_waiting(&self) -> Result<usize> {
        let mut state = self.state.lock();
        let failed: Vec<(Fingerprint, Request)> = state.failure.drain().collect();
        let count = failed.len();
        for (fp, request) in failed {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.waiting.push(HeapEntry {
                priority: request.priority,
                seq,
                fingerprint: fp,
            });
            state.requests.insert(fp, request);
        }
        Ok(count)
    }

    async fn clean_queue(&self) -> Result<()> {
        let mut state = self.state.lock();
        *state = State::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::outcome;

    fn req(url: &str, priority: i64) -> Request {
        Request::builder(url).unwrap().priority(priority).build()
    }

    #[tokio::test]
    async fn get_returns_highest_priority_newest_first() {
        let queue = InMemorySchedulerQueue::default();
        queue
            .add(vec![
                req("https://example.com/low", 0),
                req("https://example.com/high-a", 5),
                req("https://example.com/high-b", 5),
            ])
            .await
            .unwrap();

        let first = queue.get(&PrioritySelector::Any).await.unwrap().unwrap();
        assert_eq!(first.request.url.path(), "/high-b", "newest among equal priority wins");

        let second = queue.get(&PrioritySelector::Any).await.unwrap().unwrap();
        assert_eq!(second.request.url.path(), "/high-a");
    }

    #[tokio::test]
    async fn success_clears_lease_without_requeue() {
        let queue = InMemorySchedulerQueue::default();
        queue.add(vec![req("https://example.com/a", 0)]).await.unwrap();
        let lease = queue.get(&PrioritySelector::Any).await.unwrap().unwrap();
        queue.set_result(lease, outcome::SUCCESS).await.unwrap();
        let status = queue.check_status().await.unwrap();
        assert!(status.is_empty());
        assert_eq!(status.failure, 0);
    }

    #[tokio::test]
    async fn failure_quarantines_until_requeued() {
        let queue = InMemorySchedulerQueue::default();
        queue.add(vec![req("https://example.com/a", 0)]).await.unwrap();
        let lease = queue.get(&PrioritySelector::Any).await.unwrap().unwrap();
        queue.set_result(lease, outcome::TERMINAL).await.unwrap();

        let status = queue.check_status().await.unwrap();
        assert!(status.is_empty(), "quarantined failures don't count as outstanding work");
        assert_eq!(status.failure, 1);

        let moved = queue.failure_to_waiting().await.unwrap();
        assert_eq!(moved, 1);
        assert!(queue.get(&PrioritySelector::Any).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_add_while_freshly_leased_is_dropped() {
        let queue = InMemorySchedulerQueue::new(Duration::from_secs(30));
        queue.add(vec![req("https://example.com/a", 0)]).await.unwrap();
        let _lease = queue.get(&PrioritySelector::Any).await.unwrap().unwrap();

        let added = queue.add(vec![req("https://example.com/a", 0)]).await.unwrap();
        assert_eq!(added, 0, "a fresh lease suppresses re-adding the same fingerprint");
    }

    #[tokio::test]
    async fn stale_lease_is_superseded_on_add() {
        let queue = InMemorySchedulerQueue::new(Duration::from_millis(1));
        queue.add(vec![req("https://example.com/a", 0)]).await.unwrap();
        let _lease = queue.get(&PrioritySelector::Any).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        let added = queue.add(vec![req("https://example.com/a", 0)]).await.unwrap();
        assert_eq!(added, 1, "a stale lease no longer suppresses re-adding");
    }

    #[tokio::test]
    async fn get_skips_entries_not_matching_the_selector() {
        let queue = InMemorySchedulerQueue::default();
        queue
            .add(vec![req("https://example.com/low", 1), req("https://example.com/high", 5)])
            .await
            .unwrap();

        let lease = queue.get(&PrioritySelector::Exactly(1)).await.unwrap().unwrap();
        assert_eq!(lease.request.url.path(), "/low");

        assert!(queue.get(&PrioritySelector::Exactly(9)).await.unwrap().is_none());

        let lease = queue.get(&PrioritySelector::OneOf(vec![5, 9])).await.unwrap().unwrap();
        assert_eq!(lease.request.url.path(), "/high");
    }
}
