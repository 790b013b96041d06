use thiserror::Error;

/// Result type used throughout the crawl engine.
pub type Result<T> = std::result::Result<T, CrawlError>;

/// The error taxonomy for the crawl engine.
///
/// Contract-violation variants (`InvalidOutput`, `InvalidCallback`, ...) are raised by
/// the middleware chains and the engine itself when user-supplied hooks break the
/// return-type contracts documented on each trait; they are programming errors, not
/// transient conditions, and are never retried.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A request's URL failed to parse or was not absolute.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// A request named a callback the spider does not expose.
    #[error("invalid callback: {0}")]
    InvalidCallback(String),

    /// A callback returned something other than a request, item, or iterable of either.
    #[error("invalid callback result: {0}")]
    InvalidCallbackResult(String),

    /// A middleware hook returned a value outside its documented contract.
    #[error("invalid middleware output: {0}")]
    InvalidOutput(String),

    /// The downloader failed to complete a request.
    #[error("download error: {0}")]
    DownloadError(String),

    /// A callback raised while parsing a response.
    #[error("parse error: {0}")]
    ParseError(String),

    /// A spider middleware hook raised and no other hook swallowed it.
    #[error("spider hook error: {0}")]
    SpiderHookError(String),

    /// A caller misused the public API (bad configuration, unknown plugin name, ...).
    #[error("usage error: {0}")]
    UsageError(String),

    /// The scheduler queue's backing store failed.
    #[error("queue error: {0}")]
    Queue(String),

    #[cfg(feature = "redis-queue")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
