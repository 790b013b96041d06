use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::dedup::DedupFilter;
use crate::downloader::Downloader;
use crate::error::Result;
use crate::item::Item;
use crate::middleware::downloader::DownloadOutcome;
use crate::middleware::{DownloaderMiddlewareChain, ItemPipelineChain, ParseOutput, SpiderMiddlewareChain};
use crate::queue::{Lease, SchedulerQueue};
use crate::request::Request;
use crate::response::{outcome, Response, ResponseError};
use crate::retry::{with_retry, with_timeout};
use crate::scheduler::Scheduler;
use crate::spider::Spider;
use crate::stats::StatsCollector;

/// The orchestrator: seeds the scheduler, runs a producer that leases work
/// and a bounded pool of workers that run it, and coordinates shutdown once
/// the queue has been empty for long enough.
pub struct Engine<Q, Dd, St> {
    scheduler: Scheduler<Q, Dd, St>,
    spider: Arc<dyn Spider>,
    downloader: Arc<dyn Downloader>,
    downloader_middleware: DownloaderMiddlewareChain,
    spider_middleware: SpiderMiddlewareChain,
    item_pipeline: ItemPipelineChain,
    config: EngineConfig,
}

impl<Q, Dd, St> Engine<Q, Dd, St>
where
    Q: SchedulerQueue + 'static,
    Dd: DedupFilter + 'static,
    St: StatsCollector + 'static,
{
    pub fn new(
        scheduler: Scheduler<Q, Dd, St>,
        spider: Arc<dyn Spider>,
        downloader: Arc<dyn Downloader>,
        config: EngineConfig,
    ) -> Self {
        Self {
            scheduler,
            spider,
            downloader,
            downloader_middleware: DownloaderMiddlewareChain::new(),
            spider_middleware: SpiderMiddlewareChain::new(),
            item_pipeline: ItemPipelineChain::new(),
            config,
        }
    }

    pub fn downloader_middleware_mut(&mut self) -> &mut DownloaderMiddlewareChain {
        &mut self.downloader_middleware
    }

    pub fn spider_middleware_mut(&mut self) -> &mut SpiderMiddlewareChain {
        &mut self.spider_middleware
    }

    pub fn item_pipeline_mut(&mut self) -> &mut ItemPipelineChain {
        &mut self.item_pipeline
    }

    /// Opens the spider and seeds the scheduler with `start_requests`, in
    /// batches of `config.push_number` — the only part of the run loop that
    /// isn't steady-state producer/worker behavior.
    pub async fn load(&self) -> Result<()> {
        info!(spider = self.spider.name(), "loading engine");
        self.spider.open().await?;

        if self.config.failure_to_waiting {
            self.scheduler.failure_to_waiting().await?;
        }

        let seeds = self.spider.start_requests().await?;
        for batch in seeds.chunks(self.config.push_number) {
            self.scheduler.add(batch.to_vec()).await?;
        }
        Ok(())
    }

    /// Runs until the queue has been empty for `max_empty_rounds` consecutive
    /// producer ticks (or forever, if `config.run_forever`), then drains
    /// in-flight workers and closes the spider and scheduler.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        self.load().await?;

        let (tx, mut rx) = mpsc::channel::<Lease>(self.config.worker_numbers.max(1));
        let producer_engine = self.clone();
        let producer = tokio::spawn(async move { producer_engine.produce(tx).await });

        let mut workers: JoinSet<()> = JoinSet::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let worker_cap = self.config.worker_numbers.max(1) * 3;

        while let Some(lease) = rx.recv().await {
            while in_flight.load(Ordering::SeqCst) >= worker_cap {
                workers.join_next().await;
            }

            in_flight.fetch_add(1, Ordering::SeqCst);
            let engine = self.clone();
            let flight_counter = in_flight.clone();
            workers.spawn(async move {
                let _guard = scopeguard::guard((), move |_| {
                    flight_counter.fetch_sub(1, Ordering::SeqCst);
                });
                if let Err(e) = engine.process_one(lease).await {
                    error!(%e, "request processing failed");
                }
            });
        }

        while workers.join_next().await.is_some() {}
        let _ = producer.await;

        self.spider.close().await?;
        self.scheduler.close().await?;
        info!("engine shut down");
        Ok(())
    }

    async fn produce(&self, tx: mpsc::Sender<Lease>) {
        let mut empty_rounds = 0u32;
        loop {
            let tick_start = Instant::now();

            match self.scheduler.get(&self.config.priority).await {
                Ok(Some(lease)) => {
                    empty_rounds = 0;
                    if tx.send(lease).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    empty_rounds += 1;
                    match self.scheduler.check_status().await {
                        Ok(status) if !self.config.run_forever && status.is_empty() => {
                            if empty_rounds >= self.config.max_empty_rounds {
                                debug!(empty_rounds, "queue drained, stopping producer");
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => error!(%e, "check_status failed"),
                    }
                }
                Err(e) => error!(%e, "scheduler.get failed"),
            }

            let elapsed = tick_start.elapsed();
            let sleep_for = self
                .config
                .download_delay
                .saturating_sub(elapsed)
                .max(Duration::from_millis(10));
            tokio::time::sleep(sleep_for).await;
        }
    }

    async fn process_one(&self, lease: Lease) -> Result<()> {
        let request = lease.request.clone();

        let outcome = with_timeout(self.config.process_task_timeout, self.attempt_with_retry(&request)).await;

        match outcome {
            Ok((response, outputs)) => {
                let ok = response.ok;
                self.scheduler.set_result(lease, ok).await?;
                if ok == outcome::SUCCESS {
                    self.spider.process_succeed(&request, &response).await?;
                } else {
                    self.spider.process_failed(&request, &response).await?;
                }
                self.dispatch(outputs).await?;
            }
            Err(e) => {
                error!(url = %request.url, %e, "task abandoned after timeout");
                self.scheduler.set_result(lease, outcome::TERMINAL).await?;
                let response = Response::failed(request.url.as_str(), outcome::TERMINAL, ResponseError::new("timeout", e.to_string()));
                self.spider.process_failed(&request, &response).await?;
            }
        }
        Ok(())
    }

    async fn attempt_with_retry(&self, request: &Request) -> Result<(Response, Vec<ParseOutput>)> {
        let stats = self.scheduler.stats();
        Ok(with_retry(request, stats, |_attempt| self.attempt_once(request)).await)
    }

    async fn attempt_once(&self, request: &Request) -> (Response, Vec<ParseOutput>) {
        let spider_outcome = match self.spider.process_request(request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                return (
                    Response::failed(request.url.as_str(), outcome::TRANSIENT, ResponseError::new("spider_hook_error", e.to_string())),
                    Vec::new(),
                )
            }
        };

        let download_outcome = match spider_outcome {
            Some(outcome) => Ok(outcome),
            None => self.downloader_middleware.download(self.downloader.as_ref(), request).await,
        };

        let response = match download_outcome {
            Ok(DownloadOutcome::Response(response)) => response,
            Ok(DownloadOutcome::Reschedule(new_request)) => {
                let mut placeholder = Response::new(request.url.as_str(), -1, Vec::new());
                placeholder.ok = outcome::SUCCESS;
                return (placeholder, vec![ParseOutput::Request(new_request)]);
            }
            Err(e) => {
                return (
                    Response::failed(request.url.as_str(), outcome::TRANSIENT, ResponseError::new("download_error", e.to_string())),
                    Vec::new(),
                )
            }
        };

        if response.ok != outcome::SUCCESS {
            return (response, Vec::new());
        }

        match self.run_callback(request, &response).await {
            Ok(outputs) => (response, outputs),
            Err(e) => {
                let mut failed = response;
                failed.ok = outcome::TRANSIENT;
                failed.error = Some(ResponseError::new("callback_error", e.to_string()));
                (failed, Vec::new())
            }
        }
    }

    async fn run_callback(&self, request: &Request, response: &Response) -> Result<Vec<ParseOutput>> {
        if !self.spider_middleware.before_parse(request, response).await? {
            return Ok(Vec::new());
        }

        let raw = match self.spider.dispatch(&request.callback, request, response).await {
            Ok(raw) => raw,
            Err(e) => {
                self.spider_middleware.on_exception(request, response, e).await?;
                return Ok(Vec::new());
            }
        };

        self.spider_middleware.after_parse(request, response, raw).await
    }

    async fn dispatch(&self, outputs: Vec<ParseOutput>) -> Result<()> {
        let mut new_requests = Vec::new();
        let mut items = Vec::new();
        for output in outputs {
            match output {
                ParseOutput::Request(r) => new_requests.push(r),
                ParseOutput::Item(item) => items.push(item),
            }
        }

        if !new_requests.is_empty() {
            self.scheduler.add(new_requests).await?;
        }
        for item in items {
            self.process_item(item).await?;
        }
        Ok(())
    }

    async fn process_item(&self, item: Item) -> Result<()> {
        let item = self.spider.process_item(item).await?;
        if self.item_pipeline.process(item).await?.is_none() {
            debug!("item dropped by pipeline");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::InMemoryDedupFilter;
    use crate::downloader::MockDownloader;
    use crate::queue::in_memory::InMemorySchedulerQueue;
    use crate::response::Response;
    use crate::stats::InMemoryStatsCollector;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct EchoSpider {
        seeds: Vec<Request>,
    }

    #[async_trait]
    impl Spider for EchoSpider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn start_requests(&self) -> Result<Vec<Request>> {
            Ok(self.seeds.clone())
        }

        async fn dispatch(&self, callback: &str, _request: &Request, response: &Response) -> Result<Vec<ParseOutput>> {
            match callback {
                "parse" => Ok(vec![ParseOutput::Item(Item::new("page").with("status", response.status))]),
                other => Err(crate::spider::unknown_callback(other)),
            }
        }
    }

    struct CollectPipeline {
        seen: Arc<StdMutex<Vec<Item>>>,
    }

    #[async_trait]
    impl crate::middleware::ItemPipeline for CollectPipeline {
        async fn process_item(&self, item: Item) -> Result<Option<Item>> {
            self.seen.lock().unwrap().push(item.clone());
            Ok(Some(item))
        }
    }

    fn make_engine(
        seeds: Vec<Request>,
        seen: Arc<StdMutex<Vec<Item>>>,
    ) -> (Arc<Engine<InMemorySchedulerQueue, InMemoryDedupFilter, InMemoryStatsCollector>>, Arc<MockDownloader>) {
        let scheduler = Scheduler::new(
            InMemorySchedulerQueue::default(),
            InMemoryDedupFilter::new(),
            InMemoryStatsCollector::new(),
        );
        let downloader = Arc::new(MockDownloader::new());
        let spider = Arc::new(EchoSpider { seeds });
        let mut config = EngineConfig::default();
        config.max_empty_rounds = 2;
        config.download_delay = Duration::from_millis(0);

        let mut engine = Engine::new(scheduler, spider, downloader.clone(), config);
        engine.item_pipeline_mut().push(Box::new(CollectPipeline { seen }));
        (Arc::new(engine), downloader)
    }

    #[tokio::test]
    async fn end_to_end_single_request_produces_one_item() {
        let seed = Request::builder("https://example.com/a").unwrap().build();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let (engine, downloader) = make_engine(vec![seed], seen.clone());
        downloader.queue_response("GET", "/a", Response::new("https://example.com/a", 200, b"ok".to_vec()));

        engine.run().await.unwrap();

        let items = seen.lock().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].get("status").unwrap(), 200);
    }

    #[tokio::test]
    async fn unknown_callback_fails_without_crashing_the_engine() {
        let seed = Request::builder("https://example.com/a")
            .unwrap()
            .callback("does_not_exist")
            .build();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let (engine, downloader) = make_engine(vec![seed], seen.clone());
        downloader.queue_response("GET", "/a", Response::new("https://example.com/a", 200, b"ok".to_vec()));

        engine.run().await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }
}
