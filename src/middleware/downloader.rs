use async_trait::async_trait;
use tracing::error;

use crate::downloader::Downloader;
use crate::error::{CrawlError, Result};
use crate::request::Request;
use crate::response::Response;

/// A value a downloader middleware hook may substitute for the normal flow:
/// a freshly-built response (short-circuits straight to the spider chain),
/// or a brand-new request (short-circuits back to the scheduler).
pub enum DownloadOutcome {
    Response(Response),
    Reschedule(Request),
}

#[async_trait]
pub trait DownloaderMiddleware: Send + Sync {
    /// Runs before the downloader is invoked. Returning `Some` short-circuits
    /// the remaining `process_request` hooks and skips the actual fetch.
    async fn process_request(&self, _request: &Request) -> Result<Option<DownloadOutcome>> {
        Ok(None)
    }

    /// Runs after a response (from the downloader or an earlier hook)
    /// becomes available. Returning a different response replaces it for the
    /// next hook; returning `Reschedule` short-circuits the remaining hooks.
    async fn process_response(&self, _request: &Request, response: Response) -> Result<DownloadOutcome> {
        Ok(DownloadOutcome::Response(response))
    }

    /// Runs if the downloader (or an earlier hook) raised. Returning `Some`
    /// swallows the error and substitutes the outcome; `None` lets the next
    /// hook try, and if none handle it the original error propagates.
    async fn process_exception(&self, _request: &Request, _error: &CrawlError) -> Result<Option<DownloadOutcome>> {
        Ok(None)
    }
}

/// Runs the downloader middleware chain around a [`Downloader`], in
/// registration order for every hook (the downloader chain, unlike the
/// spider chain, does not reverse response/exception hooks).
#[derive(Default)]
pub struct DownloaderMiddlewareChain {
    middlewares: Vec<Box<dyn DownloaderMiddleware>>,
}

impl DownloaderMiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Box<dyn DownloaderMiddleware>) {
        self.middlewares.push(middleware);
    }

    pub async fn download(&self, downloader: &dyn Downloader, request: &Request) -> Result<DownloadOutcome> {
        for mw in &self.middlewares {
            if let Some(outcome) = mw.process_request(request).await? {
                return Ok(outcome);
            }
        }

        let fetch_result = downloader.fetch(request).await;
        let mut response = match fetch_result {
            Ok(response) => response,
            Err(e) => return self.run_exception_chain(request, e).await,
        };

        for mw in &self.middlewares {
            match mw.process_response(request, response).await? {
                DownloadOutcome::Response(next) => response = next,
                reschedule @ DownloadOutcome::Reschedule(_) => return Ok(reschedule),
            }
        }

        Ok(DownloadOutcome::Response(response))
    }

    async fn run_exception_chain(&self, request: &Request, error: CrawlError) -> Result<DownloadOutcome> {
        for mw in &self.middlewares {
            if let Some(outcome) = mw.process_exception(request, &error).await? {
                return Ok(outcome);
            }
        }
        error!(url = %request.url, %error, "unhandled download exception");
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct InjectHeader;

    #[async_trait]
    impl DownloaderMiddleware for InjectHeader {
        async fn process_response(&self, _request: &Request, mut response: Response) -> Result<DownloadOutcome> {
            response.headers.insert("x-seen".into(), "yes".into());
            Ok(DownloadOutcome::Response(response))
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl DownloaderMiddleware for ShortCircuit {
        async fn process_request(&self, _request: &Request) -> Result<Option<DownloadOutcome>> {
            Ok(Some(DownloadOutcome::Response(Response::new("https://cache.example", 200, b"cached".to_vec()))))
        }
    }

    #[tokio::test]
    async fn response_middleware_runs_in_order() {
        use crate::downloader::MockDownloader;

        let mock = MockDownloader::new();
        mock.queue_response("GET", "/a", Response::new("https://example.com/a", 200, b"ok".to_vec()));
        let mut chain = DownloaderMiddlewareChain::new();
        chain.push(Box::new(InjectHeader));

        let req = Request::builder("https://example.com/a").unwrap().build();
        let outcome = chain.download(&mock, &req).await.unwrap();
        let DownloadOutcome::Response(response) = outcome else {
            panic!("expected a response");
        };
        assert_eq!(response.headers.get("x-seen").unwrap(), "yes");
    }

    #[tokio::test]
    async fn request_middleware_short_circuits_the_fetch() {
        use crate::downloader::MockDownloader;

        let mock = MockDownloader::new();
        let mut chain = DownloaderMiddlewareChain::new();
        chain.push(Box::new(ShortCircuit));

        let req = Request::builder("https://example.com/a").unwrap().build();
        let outcome = chain.download(&mock, &req).await.unwrap();
        let DownloadOutcome::Response(response) = outcome else {
            panic!("expected a response");
        };
        assert_eq!(response.url, "https://cache.example");
        assert_eq!(mock.call_count(), 0, "the downloader itself must never run");
    }
}
