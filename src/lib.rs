//! An asynchronous crawl engine.
//!
//! A [`Spider`] produces seed requests and named callbacks; an [`Engine`]
//! drives those requests through a pluggable [`SchedulerQueue`], a
//! [`Downloader`], and three middleware chains (download, spider, item
//! pipeline), retrying transient failures in place and quarantining
//! terminal ones.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use hoopa_rs::{
//!     config::EngineConfig,
//!     dedup::InMemoryDedupFilter,
//!     downloader::ReqwestDownloader,
//!     engine::Engine,
//!     error::Result,
//!     item::Item,
//!     middleware::ParseOutput,
//!     queue::in_memory::InMemorySchedulerQueue,
//!     request::Request,
//!     response::Response,
//!     scheduler::Scheduler,
//!     spider::Spider,
//!     stats::InMemoryStatsCollector,
//! };
//!
//! struct Quotes;
//!
//! #[async_trait]
//! impl Spider for Quotes {
//!     fn name(&self) -> &str { "quotes" }
//!
//!     async fn start_requests(&self) -> Result<Vec<Request>> {
//!         Ok(vec![Request::builder("https://quotes.toscrape.com")?.build()])
//!     }
//!
//!     async fn dispatch(&self, _callback: &str, _request: &Request, response: &Response) -> Result<Vec<ParseOutput>> {
//!         Ok(vec![ParseOutput::Item(Item::new("page").with("status", response.status))])
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let scheduler = Scheduler::new(
//!         InMemorySchedulerQueue::default(),
//!         InMemoryDedupFilter::new(),
//!         InMemoryStatsCollector::new(),
//!     );
//!     let engine = Arc::new(Engine::new(
//!         scheduler,
//!         Arc::new(Quotes),
//!         Arc::new(ReqwestDownloader::new()),
//!         EngineConfig::default(),
//!     ));
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod downloader;
pub mod engine;
pub mod error;
pub mod item;
pub mod middleware;
pub mod queue;
pub mod registry;
pub mod request;
pub mod response;
pub mod retry;
pub mod scheduler;
pub mod spider;
pub mod stats;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{CrawlError, Result};
pub use item::Item;
pub use request::Request;
pub use response::Response;
pub use scheduler::Scheduler;
pub use spider::Spider;
