//! The scheduler queue: a priority-ordered, lease-tracked work buffer.
//!
//! `add`/`get`/`set_result`/`check_status`/`failure_to_waiting`/`clean_queue`
//! form the full contract every backing store (in-memory, Redis, ...)
//! implements identically from the engine's point of view.

pub mod in_memory;
#[cfg(feature = "redis-queue")]
pub mod redis_backed;

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::request::{Fingerprint, Request};
use crate::response::outcome;

/// A request currently leased out to a worker. Returned by [`SchedulerQueue::get`]
/// and consumed by [`SchedulerQueue::set_result`] — the type system makes it
/// impossible to report a result for a request nobody leased.
#[derive(Debug, Clone)]
pub struct Lease {
    pub request: Request,
    pub fingerprint: Fingerprint,
    pub leased_at: DateTime<Utc>,
}

/// Snapshot of queue occupancy, used by the engine's producer loop to decide
/// when to stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatus {
    pub waiting: usize,
    pub pending: usize,
    pub failure: usize,
}

impl QueueStatus {
    /// Mirrors the reference implementation's emptiness test: failure-quarantined
    /// requests don't count as outstanding work.
    pub fn is_empty(&self) -> bool {
        self.waiting == 0 && self.pending == 0
    }
}

/// Which priorities [`SchedulerQueue::get`] is willing to lease: every
/// priority (`nil` in the reference implementation), exactly one, or any of
/// a set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrioritySelector {
    #[default]
    Any,
    Exactly(i64),
    OneOf(Vec<i64>),
}

impl PrioritySelector {
    pub fn matches(&self, priority: i64) -> bool {
        match self {
            PrioritySelector::Any => true,
            PrioritySelector::Exactly(p) => *p == priority,
            PrioritySelector::OneOf(candidates) => candidates.contains(&priority),
        }
    }

    /// Score ranges to probe, in order, when asking Redis's `ZREVRANGEBYSCORE`
    /// for a match — one range for `Any`, one exact-value range per candidate
    /// otherwise.
    pub(crate) fn score_ranges(&self) -> Vec<(String, String)> {
        match self {
            PrioritySelector::Any => vec![("-inf".to_string(), "+inf".to_string())],
            PrioritySelector::Exactly(p) => vec![(p.to_string(), p.to_string())],
            PrioritySelector::OneOf(candidates) => candidates.iter().map(|p| (p.to_string(), p.to_string())).collect(),
        }
    }
}

pub trait SchedulerQueue: Send + Sync {
    /// Enqueues new requests. A request whose fingerprint is already leased
    /// (present in the pending set, and leased recently) is silently dropped;
    /// one whose lease has gone stale is accepted and overrides the old lease.
    /// Returns the number actually enqueued.
    fn add(&self, requests: Vec<Request>) -> impl Future<Output = Result<usize>> + Send;

    /// Leases the single highest-priority waiting request matching
    /// `priority`, newest first within a priority band. `None` if no waiting
    /// entry matches the selector.
    fn get(&self, priority: &PrioritySelector) -> impl Future<Output = Result<Option<Lease>>> + Send;

    /// Records the outcome of a leased request. Success clears the lease;
    /// any non-success outcome moves the request into the failure quarantine,
    /// where it stays until [`SchedulerQueue::failure_to_waiting`] is called.
    fn set_result(&self, lease: Lease, ok: i8) -> impl Future<Output = Result<()>> + Send;

    /// Current occupancy; as a side effect, sweeps any pending lease older
    /// than this queue's configured pending-threshold back into the waiting
    /// set (timeout recovery).
    fn check_status(&self) -> impl Future<Output = Result<QueueStatus>> + Send;

    /// Moves every quarantined (failed) request back into the waiting set.
    /// Returns the number moved.
    fn failure_to_waiting(&self) -> impl Future<Output = Result<usize>> + Send;

    /// Drops all state: waiting, pending and failure sets.
    fn clean_queue(&self) -> impl Future<Output = Result<()>> + Send;
}

pub(crate) fn is_success(ok: i8) -> bool {
    ok == outcome::SUCCESS
}
