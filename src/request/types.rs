use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{CrawlError, Result};
use super::Fingerprint;

/// A unit of crawl work.
///
/// Mirrors the wire-serializable request record: every field here round-trips
/// through `serde_json` so a request can cross a process boundary (a Redis
/// queue, a message broker). Session handles and broker acknowledgement
/// tokens are deliberately kept outside this struct — they are per-process
/// resources attached by the downloader/queue at dispatch time, never
/// serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(with = "url_serde")]
    pub url: Url,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub json: Option<Value>,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
    #[serde(default = "default_callback")]
    pub callback: String,
    #[serde(default)]
    pub dont_filter: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    #[serde(default = "default_retry_delay", with = "duration_secs")]
    pub retry_delay: Duration,
    #[serde(default)]
    pub client_kwargs: HashMap<String, Value>,
    /// Catch-all for keys this version doesn't recognize, so a request
    /// round-trips through `serde_json` unchanged even when produced by a
    /// newer client.
    #[serde(flatten)]
    pub http_kwargs: HashMap<String, Value>,
}

fn default_method() -> String {
    "GET".to_string()
}
fn default_callback() -> String {
    "parse".to_string()
}
fn default_retry_times() -> u32 {
    3
}
fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

impl Request {
    pub fn builder(url: &str) -> Result<RequestBuilder> {
        RequestBuilder::new(url)
    }

    /// `method ‖ canonicalized_url ‖ str(data) ‖ str(json)`, hashed with MD5.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::compute(&self.method, &self.url, self.data.as_ref(), self.json.as_ref())
    }

    /// Produces the next attempt of this request after a transient failure,
    /// bumping `retries` and leaving everything else untouched.
    pub fn into_retry(mut self) -> Request {
        self.retries += 1;
        self
    }
}

/// Builder mirroring the reference implementation's keyword-argument
/// constructor: everything but `url` is optional and defaulted.
pub struct RequestBuilder {
    inner: Request,
}

impl RequestBuilder {
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| CrawlError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(Self {
            inner: Request {
                url,
                method: default_method(),
                headers: HashMap::new(),
                params: HashMap::new(),
                data: None,
                json: None,
                cookies: HashMap::new(),
                meta: HashMap::new(),
                callback: default_callback(),
                dont_filter: false,
                priority: 0,
                retries: 0,
                retry_times: default_retry_times(),
                retry_delay: default_retry_delay(),
                client_kwargs: HashMap::new(),
                http_kwargs: HashMap::new(),
            },
        })
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.inner.method = method.into().to_uppercase();
        self
    }

    pub fn callback(mut self, name: impl Into<String>) -> Self {
        self.inner.callback = name.into();
        self
    }

    pub fn priority(mut self, priority: i64) -> Self {
        self.inner.priority = priority;
        self
    }

    pub fn dont_filter(mut self, value: bool) -> Self {
        self.inner.dont_filter = value;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.headers.insert(key.into(), value.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.inner.meta.insert(key.into(), value);
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.inner.json = Some(value);
        self
    }

    pub fn data(mut self, value: Value) -> Self {
        self.inner.data = Some(value);
        self
    }

    pub fn retry_times(mut self, times: u32) -> Self {
        self.inner.retry_times = times;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.inner.retry_delay = delay;
        self
    }

    pub fn build(self) -> Request {
        self.inner
    }
}

mod url_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use url::Url;

    pub fn serialize<S: Serializer>(url: &Url, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(url.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Url, D::Error> {
        let raw = String::deserialize(d)?;
        Url::parse(&raw).map_err(serde::de::Error::custom)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let req = Request::builder("https://example.com").unwrap().build();
        assert_eq!(req.method, "GET");
        assert_eq!(req.callback, "parse");
        assert_eq!(req.retry_times, 3);
        assert_eq!(req.retries, 0);
        assert!(!req.dont_filter);
    }

    #[test]
    fn round_trips_through_json() {
        let req = Request::builder("https://example.com/x?q=1")
            .unwrap()
            .method("post")
            .json(serde_json::json!({"a": 1}))
            .build();
        let encoded = serde_json::to_string(&req).unwrap();
        let decoded: Request = serde_json::from_str(&encoded).unwrap();
        assert_eq!(req.fingerprint(), decoded.fingerprint());
        assert_eq!(decoded.method, "POST");
    }

    #[test]
    fn into_retry_increments_without_changing_identity() {
        let req = Request::builder("https://example.com").unwrap().build();
        let fp_before = req.fingerprint();
        let retried = req.into_retry();
        assert_eq!(retried.retries, 1);
        assert_eq!(retried.fingerprint(), fp_before);
    }

    #[test]
    fn unknown_keys_round_trip_via_http_kwargs() {
        let raw = serde_json::json!({
            "url": "https://example.com/x",
            "allow_redirects": false,
            "ssl": "verify",
        });
        let decoded: Request = serde_json::from_value(raw).unwrap();
        assert_eq!(decoded.http_kwargs.get("allow_redirects"), Some(&serde_json::json!(false)));
        assert_eq!(decoded.http_kwargs.get("ssl"), Some(&serde_json::json!("verify")));

        let encoded = serde_json::to_value(&decoded).unwrap();
        assert_eq!(encoded["allow_redirects"], serde_json::json!(false));
        assert_eq!(encoded["ssl"], serde_json::json!("verify"));
    }
}
