//! The three middleware chains: downloader, spider, and item pipeline.
//!
//! Each chain runs its hooks in the order middleware were registered, except
//! the spider chain's post-parse hooks, which run newest-registered-first
//! (an "onion" ordering inherited from the reference implementation, where
//! request-side hooks are appended but response/exception-side hooks are
//! prepended).

pub mod downloader;
pub mod pipeline;
pub mod spider;

pub use downloader::{DownloaderMiddleware, DownloaderMiddlewareChain};
pub use pipeline::{ItemPipeline, ItemPipelineChain};
pub use spider::{ParseOutput, SpiderMiddleware, SpiderMiddlewareChain};
