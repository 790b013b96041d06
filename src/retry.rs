use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{CrawlError, Result};
use crate::request::Request;
use crate::response::{outcome, Response};
use crate::stats::StatsCollector;

/// A value the retry loop can inspect and, on exhaustion, force terminal.
/// Implemented directly for [`Response`] and, by delegation, for any tuple
/// that carries one (e.g. a response plus the parse results it produced),
/// so the loop can wrap either "just download" or "download and parse".
pub trait RetryOutcome {
    fn ok(&self) -> i8;
    fn error_kind(&self) -> Option<&str>;
    fn mark_terminal(&mut self);
}

impl RetryOutcome for Response {
    fn ok(&self) -> i8 {
        self.ok
    }
    fn error_kind(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.kind.as_str())
    }
    fn mark_terminal(&mut self) {
        self.ok = outcome::TERMINAL;
    }
}

impl<U> RetryOutcome for (Response, U) {
    fn ok(&self) -> i8 {
        self.0.ok
    }
    fn error_kind(&self) -> Option<&str> {
        self.0.error.as_ref().map(|e| e.kind.as_str())
    }
    fn mark_terminal(&mut self) {
        self.0.ok = outcome::TERMINAL;
    }
}

/// Repeatedly runs `attempt` (download + parse for one request) until it
/// succeeds, is declared terminal, or exhausts `request.retry_times`.
///
/// Unlike the scheduler queue's lease/requeue path, this loop never touches
/// the queue: a transient failure is retried in place by sleeping
/// `request.retry_delay` and calling `attempt` again, exactly as the
/// reference implementation's retry decorator does. Only the final
/// outcome (success, or an exhausted/terminal failure) is ever reported
/// back to the scheduler.
pub async fn with_retry<F, Fut, T>(request: &Request, stats: &impl StatsCollector, mut attempt: F) -> T
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    T: RetryOutcome,
{
    let mut retries = 0u32;
    loop {
        let mut result = attempt(retries).await;

        if result.ok() == outcome::SUCCESS {
            return result;
        }

        if retries >= request.retry_times {
            warn!(url = %request.url, retries, "too many retries, giving up");
            result.mark_terminal();
            return result;
        }

        if result.ok() == outcome::TERMINAL {
            return result;
        }

        let kind = result.error_kind().map(|s| s.to_string());
        if let Some(kind) = kind {
            let _ = stats.inc_value(&format!("requests/retries/{kind}"), 1.0).await;
        }

        retries += 1;
        debug!(url = %request.url, retries, "retrying after transient failure");
        tokio::time::sleep(request.retry_delay).await;
    }
}

/// Wraps a download+parse task with a hard wall-clock deadline. A timed-out
/// task is abandoned, not re-enqueued — the caller decides what to report
/// back to the scheduler (the reference implementation simply logs and lets
/// the request fall out of `pending` until the queue's own sweep recovers
/// it; here callers get the error directly to make that decision themselves).
pub async fn with_timeout<Fut, T>(duration: Duration, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(CrawlError::DownloadError(format!("task exceeded {duration:?} timeout"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseError;
    use crate::stats::InMemoryStatsCollector;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> Request {
        Request::builder("https://example.com")
            .unwrap()
            .retry_times(2)
            .retry_delay(Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn succeeds_immediately_without_retrying() {
        let stats = InMemoryStatsCollector::new();
        let req = request();
        let calls = AtomicU32::new(0);
        let response = with_retry(&req, &stats, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Response::new("https://example.com", 200, vec![]) }
        })
        .await;
        assert_eq!(response.ok, outcome::SUCCESS);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_failure_returns_immediately() {
        let stats = InMemoryStatsCollector::new();
        let req = request();
        let calls = AtomicU32::new(0);
        let response = with_retry(&req, &stats, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Response::failed("https://example.com", outcome::TERMINAL, ResponseError::new("fatal", ""))
            }
        })
        .await;
        assert_eq!(response.ok, outcome::TERMINAL);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_retry_then_become_terminal() {
        let stats = InMemoryStatsCollector::new();
        let req = request();
        let response = with_retry(&req, &stats, |_| async {
            Response::failed("https://example.com", outcome::TRANSIENT, ResponseError::new("timeout", ""))
        })
        .await;
        assert_eq!(response.ok, outcome::TERMINAL, "exhausted retries forces terminal");
        assert_eq!(
            stats.get_value("requests/retries/timeout").await.unwrap(),
            Some(2.0),
            "retry_times=2 means exactly two retry-stat increments before giving up"
        );
    }

    #[tokio::test]
    async fn timeout_abandons_the_task() {
        let result: Result<()> = with_timeout(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(result.is_err());
    }
}
