use tracing::{debug, info};

use crate::dedup::DedupFilter;
use crate::error::Result;
use crate::queue::{Lease, PrioritySelector, QueueStatus, SchedulerQueue};
use crate::request::Request;
use crate::stats::StatsCollector;

/// Composes a dedup filter, stats collector and scheduler queue into the
/// single entry point the engine talks to (C5 in the component breakdown).
///
/// Dedup happens here, not in the queue: a request is checked against the
/// filter before being handed to the queue, and only requests the queue
/// actually accepted are recorded as seen — mirroring the reference
/// implementation calling `dupefilter.add(fp)` only for newly enqueued,
/// non-`dont_filter` requests.
pub struct Scheduler<Q, D, S> {
    queue: Q,
    dedup: D,
    stats: S,
}

impl<Q: SchedulerQueue, D: DedupFilter, S: StatsCollector> Scheduler<Q, D, S> {
    pub fn new(queue: Q, dedup: D, stats: S) -> Self {
        Self { queue, dedup, stats }
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    /// Filters out already-seen requests (unless `dont_filter`), enqueues
    /// the rest, and records their fingerprints as seen. Returns the number
    /// actually enqueued.
    pub async fn add(&self, requests: Vec<Request>) -> Result<usize> {
        let mut accepted = Vec::with_capacity(requests.len());
        let mut fingerprints = Vec::with_capacity(requests.len());

        for request in requests {
            let fp = request.fingerprint();
            if !request.dont_filter && self.dedup.contains(fp).await? {
                debug!(fingerprint = %fp, "dropping duplicate request");
                continue;
            }
            self.stats
                .inc_value(&format!("request/priority_count/{}", request.priority), 1.0)
                .await?;
            fingerprints.push((fp, request.dont_filter));
            accepted.push(request);
        }

        let enqueued = self.queue.add(accepted).await?;
        for (fp, dont_filter) in fingerprints {
            if !dont_filter {
                self.dedup.add(fp).await?;
            }
        }

        self.stats.inc_value("queue/request_count", enqueued as f64).await?;
        Ok(enqueued)
    }

    pub async fn get(&self, priority: &PrioritySelector) -> Result<Option<Lease>> {
        let lease = self.queue.get(priority).await?;
        if lease.is_some() {
            self.stats.inc_value("queue/response_count", 1.0).await?;
        }
        Ok(lease)
    }

    pub async fn set_result(&self, lease: Lease, ok: i8) -> Result<()> {
        self.stats
            .inc_value(&format!("queue/response_count/priority_{}/{}", lease.request.priority, ok), 1.0)
            .await?;
        self.queue.set_result(lease, ok).await
    }

    pub async fn check_status(&self) -> Result<QueueStatus> {
        self.queue.check_status().await
    }

    pub async fn failure_to_waiting(&self) -> Result<usize> {
        let moved = self.queue.failure_to_waiting().await?;
        if moved > 0 {
            info!(moved, "requeued quarantined requests");
        }
        Ok(moved)
    }

    pub async fn close(&self) -> Result<()> {
        self.stats.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::InMemoryDedupFilter;
    use crate::queue::in_memory::InMemorySchedulerQueue;
    use crate::response::outcome;
    use crate::stats::InMemoryStatsCollector;

    fn scheduler() -> Scheduler<InMemorySchedulerQueue, InMemoryDedupFilter, InMemoryStatsCollector> {
        Scheduler::new(
            InMemorySchedulerQueue::default(),
            InMemoryDedupFilter::new(),
            InMemoryStatsCollector::new(),
        )
    }

    #[tokio::test]
    async fn duplicate_request_is_filtered_before_reaching_the_queue() {
        let sched = scheduler();
        let req = Request::builder("https://example.com/a").unwrap().build();
        assert_eq!(sched.add(vec![req.clone()]).await.unwrap(), 1);
        assert_eq!(sched.add(vec![req]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dont_filter_bypasses_dedup() {
        let sched = scheduler();
        let req = Request::builder("https://example.com/a")
            .unwrap()
            .dont_filter(true)
            .build();
        assert_eq!(sched.add(vec![req.clone()]).await.unwrap(), 1);
        let lease = sched.get(&PrioritySelector::Any).await.unwrap().unwrap();
        sched.set_result(lease, outcome::SUCCESS).await.unwrap();
        // dont_filter requests are never recorded as seen, so a second submission
        // still reaches the queue.
        assert_eq!(sched.add(vec![req]).await.unwrap(), 1);
    }
}
