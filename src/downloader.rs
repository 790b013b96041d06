use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{CrawlError, Result};
use crate::request::Request;
use crate::response::{outcome, Response, ResponseError};

/// Maps a [`Request`] to a [`Response`]. The only external collaborator the
/// engine depends on directly; everything else (retry, middleware, parsing)
/// wraps this.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Default downloader, backed by `reqwest`.
pub struct ReqwestDownloader {
    client: reqwest::Client,
}

impl ReqwestDownloader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .expect("reqwest client configuration is static and always valid"),
        }
    }
}

impl Default for ReqwestDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Downloader for ReqwestDownloader {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| CrawlError::InvalidUrl(format!("bad method {}: {e}", request.method)))?;

        let mut builder = self.client.request(method, request.url.clone());

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(json) = &request.json {
            builder = builder.json(json);
        } else if let Some(data) = &request.data {
            builder = builder.form(data);
        }

        let result = builder.send().await;
        let http_response = match result {
            Ok(r) => r,
            Err(e) => {
                let transient = e.is_timeout() || e.is_connect();
                return Ok(Response::failed(
                    request.url.as_str(),
                    if transient { outcome::TRANSIENT } else { outcome::TERMINAL },
                    ResponseError::new("download_error", e.to_string()),
                ));
            }
        };

        let status = http_response.status().as_u16() as i32;
        let url = http_response.url().to_string();
        let headers: HashMap<String, String> = http_response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();

        let body = http_response.bytes().await.map_err(CrawlError::Http)?.to_vec();

        let mut response = Response::new(url, status, body);
        response.headers = headers;
        Ok(response)
    }
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub url: String,
    pub method: String,
}

/// A queue of canned responses keyed by `"{method} {path}"`, grounded on the
/// reference implementation's test fixture of the same shape.
#[derive(Default)]
pub struct MockDownloader {
    responses: Mutex<HashMap<String, Vec<Response>>>,
    calls: Mutex<Vec<MockCall>>,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_response(&self, method: &str, path: &str, response: Response) {
        self.responses
            .lock()
            .entry(format!("{} {}", method.to_uppercase(), path))
            .or_default()
            .push(response);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Downloader for MockDownloader {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.lock().push(MockCall {
            url: request.url.to_string(),
            method: request.method.clone(),
        });

        let key = format!("{} {}", request.method.to_uppercase(), request.url.path());
        let mut responses = self.responses.lock();
        let queue = responses.entry(key).or_default();
        if queue.is_empty() {
            return Err(CrawlError::DownloadError(format!("no mock response queued for {}", request.url)));
        }
        Ok(if queue.len() == 1 {
            queue[0].clone()
        } else {
            queue.remove(0)
        })
    }
}

pub type SharedDownloader = Arc<dyn Downloader>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_downloader_serves_queued_response_then_errors() {
        let mock = MockDownloader::new();
        mock.queue_response("GET", "/a", Response::new("https://example.com/a", 200, b"ok".to_vec()));

        let req = Request::builder("https://example.com/a").unwrap().build();
        let resp = mock.fetch(&req).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn mock_downloader_errors_without_a_queued_response() {
        let mock = MockDownloader::new();
        let req = Request::builder("https://example.com/missing").unwrap().build();
        assert!(mock.fetch(&req).await.is_err());
    }
}
