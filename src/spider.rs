use async_trait::async_trait;

use crate::error::{CrawlError, Result};
use crate::item::Item;
use crate::middleware::downloader::DownloadOutcome;
use crate::middleware::ParseOutput;
use crate::request::Request;
use crate::response::Response;

/// The contract a crawler author implements: seed generation plus a set of
/// named callbacks the engine dispatches a response to by name.
///
/// `name` identifies the spider for namespacing stats/queue keys when a
/// Redis-backed deployment runs several spiders against one Redis instance.
#[async_trait]
pub trait Spider: Send + Sync {
    fn name(&self) -> &str;

    /// Initial requests fed to the scheduler before the engine starts
    /// dispatching. Called once, at `Engine::load` time.
    async fn start_requests(&self) -> Result<Vec<Request>>;

    /// Dispatches a response to the callback it named. `None` means the
    /// spider has no callback with that name — the engine turns this into
    /// `CrawlError::InvalidCallback` and fails the request terminally.
    async fn dispatch(&self, callback: &str, request: &Request, response: &Response) -> Result<Vec<ParseOutput>>;

    /// Runs once before `start_requests`, for any async setup (opening a
    /// database handle, warming a cache, ...). Default is a no-op.
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    /// Runs once after the engine has drained the queue and is shutting
    /// down. Default is a no-op.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Runs once per finished attempt whose final `response.ok` was success.
    /// Default is a no-op.
    async fn process_succeed(&self, _request: &Request, _response: &Response) -> Result<()> {
        Ok(())
    }

    /// Runs once per finished attempt whose final `response.ok` was not
    /// success. Default is a no-op.
    async fn process_failed(&self, _request: &Request, _response: &Response) -> Result<()> {
        Ok(())
    }

    /// The spider's own item hook, run before the registered item pipeline
    /// chain. Default passes the item through unchanged.
    async fn process_item(&self, item: Item) -> Result<Item> {
        Ok(item)
    }

    /// The spider's own per-request hook, run as the first step of the
    /// downloader middleware's request phase — ahead of every registered
    /// `DownloaderMiddleware`. Default is a no-op (proceed to download).
    async fn process_request(&self, _request: &Request) -> Result<Option<DownloadOutcome>> {
        Ok(None)
    }
}

/// Convenience for implementations of [`Spider::dispatch`]: returns
/// `InvalidCallback` formatted the way the engine expects.
pub fn unknown_callback(name: &str) -> CrawlError {
    CrawlError::InvalidCallback(name.to_string())
}
