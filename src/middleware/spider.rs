use async_trait::async_trait;
use tracing::warn;

use crate::error::{CrawlError, Result};
use crate::item::Item;
use crate::request::Request;
use crate::response::Response;

/// What a spider callback yields: either more work or a scraped record.
#[derive(Debug, Clone)]
pub enum ParseOutput {
    Request(Request),
    Item(Item),
}

#[async_trait]
pub trait SpiderMiddleware: Send + Sync {
    /// Vetoes the parse entirely when it returns `false`. Runs before the
    /// callback, in registration order.
    async fn process_request(&self, _request: &Request, _response: &Response) -> Result<bool> {
        Ok(true)
    }

    /// Runs once per value the callback yielded, in reverse registration
    /// order. Returning `Some` replaces the value for the next hook (and
    /// for the final result if no further hook replaces it again);
    /// returning `None` drops it.
    async fn process_response(
        &self,
        _request: &Request,
        _response: &Response,
        result: ParseOutput,
    ) -> Result<Option<ParseOutput>> {
        Ok(Some(result))
    }

    /// Runs if the callback raised, in reverse registration order.
    /// Returning `true` swallows the exception.
    async fn process_exception(&self, _request: &Request, _response: &Response, _error: &CrawlError) -> Result<bool> {
        Ok(false)
    }
}

/// Runs the spider middleware chain around a spider callback's raw output.
/// `process_request` hooks run in registration order (a veto chain);
/// `process_response`/`process_exception` run in *reverse* registration
/// order, the onion pattern inherited from the reference implementation.
#[derive(Default)]
pub struct SpiderMiddlewareChain {
    middlewares: Vec<Box<dyn SpiderMiddleware>>,
}

impl SpiderMiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Box<dyn SpiderMiddleware>) {
        self.middlewares.push(middleware);
    }

    /// `false` means the parse must not run at all.
    pub async fn before_parse(&self, request: &Request, response: &Response) -> Result<bool> {
        for mw in &self.middlewares {
            if !mw.process_request(request, response).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Feeds each raw callback result through the reversed post-parse chain.
    pub async fn after_parse(
        &self,
        request: &Request,
        response: &Response,
        raw: Vec<ParseOutput>,
    ) -> Result<Vec<ParseOutput>> {
        let mut finished = Vec::with_capacity(raw.len());
        for item in raw {
            let mut current = Some(item);
            for mw in self.middlewares.iter().rev() {
                let taken = current.take().expect("current is Some until dropped");
                current = mw.process_response(request, response, taken).await?;
                if current.is_none() {
                    break;
                }
            }
            if let Some(item) = current {
                finished.push(item);
            }
        }
        Ok(finished)
    }

    /// Runs when the callback itself raised while parsing. Swallows the
    /// error if any hook claims it; otherwise surfaces it as a hook-level
    /// failure, matching the reference implementation re-raising when no
    /// registered `process_exception` returns truthy.
    pub async fn on_exception(&self, request: &Request, response: &Response, error: CrawlError) -> Result<()> {
        for mw in self.middlewares.iter().rev() {
            if mw.process_exception(request, response, &error).await? {
                return Ok(());
            }
        }
        warn!(url = %request.url, %error, "unhandled spider callback exception");
        Err(CrawlError::SpiderHookError(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropItems;

    #[async_trait]
    impl SpiderMiddleware for DropItems {
        async fn process_response(
            &self,
            _request: &Request,
            _response: &Response,
            result: ParseOutput,
        ) -> Result<Option<ParseOutput>> {
            match result {
                ParseOutput::Item(_) => Ok(None),
                other => Ok(Some(other)),
            }
        }
    }

    struct Veto;

    #[async_trait]
    impl SpiderMiddleware for Veto {
        async fn process_request(&self, _request: &Request, _response: &Response) -> Result<bool> {
            Ok(false)
        }
    }

    fn req() -> Request {
        Request::builder("https://example.com").unwrap().build()
    }
    fn resp() -> Response {
        Response::new("https://example.com", 200, vec![])
    }

    #[tokio::test]
    async fn veto_stops_the_parse() {
        let mut chain = SpiderMiddlewareChain::new();
        chain.push(Box::new(Veto));
        assert!(!chain.before_parse(&req(), &resp()).await.unwrap());
    }

    #[tokio::test]
    async fn post_parse_hooks_can_drop_results() {
        let mut chain = SpiderMiddlewareChain::new();
        chain.push(Box::new(DropItems));
        let raw = vec![
            ParseOutput::Item(Item::new("x")),
            ParseOutput::Request(req()),
        ];
        let finished = chain.after_parse(&req(), &resp(), raw).await.unwrap();
        assert_eq!(finished.len(), 1);
        assert!(matches!(finished[0], ParseOutput::Request(_)));
    }

    #[tokio::test]
    async fn unhandled_exception_becomes_spider_hook_error() {
        let chain = SpiderMiddlewareChain::new();
        let err = chain
            .on_exception(&req(), &resp(), CrawlError::ParseError("boom".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::SpiderHookError(_)));
    }
}
