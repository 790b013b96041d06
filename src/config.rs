use std::time::Duration;

use crate::queue::PrioritySelector;

/// Tunables for an [`Engine`](crate::engine::Engine) run.
///
/// Mirrors the shape of a daemon config: every field here governs *engine*
/// behavior, never spider business logic. Loading these from a file or the
/// environment is left to the caller; the engine only ever accepts an
/// already-built `EngineConfig`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on concurrently in-flight downloads.
    pub worker_numbers: usize,
    /// Minimum spacing, per producer tick, between dispatch rounds.
    pub download_delay: Duration,
    /// Age at which a leased request is swept back into the waiting set.
    pub pending_threshold: Duration,
    /// If true, the producer never exits on an empty queue; it keeps polling.
    pub run_forever: bool,
    /// Batch size used when draining seed requests into the queue.
    pub push_number: usize,
    /// Consecutive empty producer rounds before the engine begins shutdown.
    pub max_empty_rounds: u32,
    /// Default `retry_times` applied to requests that don't set their own.
    pub retry_times: u32,
    /// Default `retry_delay` applied to requests that don't set their own.
    pub retry_delay: Duration,
    /// Hard wall-clock deadline for a single request's download+callback path.
    pub process_task_timeout: Duration,
    /// Which priorities the producer is willing to lease on each `get`.
    pub priority: PrioritySelector,
    /// If true, `Engine::load` drains the failure quarantine back into the
    /// waiting set before seeding — an operational escape hatch for resuming
    /// a run that was previously interrupted mid-failure-backlog.
    pub failure_to_waiting: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_numbers: 8,
            download_delay: Duration::from_millis(0),
            pending_threshold: Duration::from_secs(30),
            run_forever: false,
            push_number: 50,
            max_empty_rounds: 10,
            retry_times: 3,
            retry_delay: Duration::from_secs(1),
            process_task_timeout: Duration::from_secs(600),
            priority: PrioritySelector::Any,
            failure_to_waiting: false,
        }
    }
}
