use std::collections::HashMap;
use std::future::Future;

use parking_lot::RwLock;

use crate::error::Result;

/// A single counter store keyed by string, mirroring the reference
/// implementation's `inc_value`/`max_value`/`min_value` API over a plain dict.
pub trait StatsCollector: Send + Sync {
    fn get_value(&self, key: &str) -> impl Future<Output = Result<Option<f64>>> + Send;
    fn set_value(&self, key: &str, value: f64) -> impl Future<Output = Result<()>> + Send;
    fn inc_value(&self, key: &str, count: f64) -> impl Future<Output = Result<()>> + Send;
    fn max_value(&self, key: &str, value: f64) -> impl Future<Output = Result<()>> + Send;
    fn min_value(&self, key: &str, value: f64) -> impl Future<Output = Result<()>> + Send;
    fn get_stats(&self) -> impl Future<Output = Result<HashMap<String, f64>>> + Send;
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Default)]
pub struct InMemoryStatsCollector {
    stats: RwLock<HashMap<String, f64>>,
}

impl InMemoryStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatsCollector for InMemoryStatsCollector {
    async fn get_value(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.stats.read().get(key).copied())
    }

    async fn set_value(&self, key: &str, value: f64) -> Result<()> {
        self.stats.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn inc_value(&self, key: &str, count: f64) -> Result<()> {
        *self.stats.write().entry(key.to_string()).or_insert(0.0) += count;
        Ok(())
    }

    async fn max_value(&self, key: &str, value: f64) -> Result<()> {
        let mut stats = self.stats.write();
        let entry = stats.entry(key.to_string()).or_insert(value);
        if value > *entry {
            *entry = value;
        }
        Ok(())
    }

    async fn min_value(&self, key: &str, value: f64) -> Result<()> {
        let mut stats = self.stats.write();
        let entry = stats.entry(key.to_string()).or_insert(value);
        if value < *entry {
            *entry = value;
        }
        Ok(())
    }

    async fn get_stats(&self) -> Result<HashMap<String, f64>> {
        Ok(self.stats.read().clone())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// No-op collector for callers that don't care about metrics, matching the
/// reference implementation's `DummyStatsCollector`.
#[derive(Debug, Default)]
pub struct NullStatsCollector;

impl StatsCollector for NullStatsCollector {
    async fn get_value(&self, _key: &str) -> Result<Option<f64>> {
        Ok(None)
    }
    async fn set_value(&self, _key: &str, _value: f64) -> Result<()> {
        Ok(())
    }
    async fn inc_value(&self, _key: &str, _count: f64) -> Result<()> {
        Ok(())
    }
    async fn max_value(&self, _key: &str, _value: f64) -> Result<()> {
        Ok(())
    }
    async fn min_value(&self, _key: &str, _value: f64) -> Result<()> {
        Ok(())
    }
    async fn get_stats(&self) -> Result<HashMap<String, f64>> {
        Ok(HashMap::new())
    }
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "redis-queue")]
pub mod redis_backed {
    use redis::AsyncCommands;

    use super::*;

    /// Stats collector backed by a Redis hash, keyed `<namespace>:stats`.
    /// Redis has no native HMAX/HMIN, so `max_value`/`min_value` read before
    /// writing, same as the reference implementation.
    pub struct RedisStatsCollector {
        client: redis::Client,
        key: String,
    }

    impl RedisStatsCollector {
        pub fn new(client: redis::Client, namespace: &str) -> Self {
            Self {
                client,
                key: format!("{namespace}:stats"),
            }
        }

        async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
            Ok(self.client.get_multiplexed_async_connection().await?)
        }
    }

    impl StatsCollector for RedisStatsCollector {
        async fn get_value(&self, key: &str) -> Result<Option<f64>> {
            let mut conn = self.conn().await?;
            let raw: Option<f64> = conn.hget(&self.key, key).await?;
            Ok(raw)
        }

        async fn set_value(&self, key: &str, value: f64) -> Result<()> {
            let mut conn = self.conn().await?;
            let _: () = conn.hset(&self.key, key, value).await?;
            Ok(())
        }

        async fn inc_value(&self, key: &str, count: f64) -> Result<()> {
            let mut conn = self.conn().await?;
            let _: f64 = conn.hincr(&self.key, key, count).await?;
            Ok(())
        }

        async fn max_value(&self, key: &str, value: f64) -> Result<()> {
            let current = self.get_value(key).await?.unwrap_or(value);
            if value > current {
                self.set_value(key, value).await?;
            }
            Ok(())
        }

        async fn min_value(&self, key: &str, value: f64) -> Result<()> {
            let current = self.get_value(key).await?.unwrap_or(value);
            if value < current {
                self.set_value(key, value).await?;
            }
            Ok(())
        }

        async fn get_stats(&self) -> Result<HashMap<String, f64>> {
            let mut conn = self.conn().await?;
            let raw: HashMap<String, f64> = conn.hgetall(&self.key).await?;
            Ok(raw)
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inc_and_max_min() {
        let stats = InMemoryStatsCollector::new();
        stats.inc_value("requests", 1.0).await.unwrap();
        stats.inc_value("requests", 2.0).await.unwrap();
        assert_eq!(stats.get_value("requests").await.unwrap(), Some(3.0));

        stats.max_value("peak", 5.0).await.unwrap();
        stats.max_value("peak", 3.0).await.unwrap();
        assert_eq!(stats.get_value("peak").await.unwrap(), Some(5.0));

        stats.min_value("start_time", 10.0).await.unwrap();
        stats.min_value("start_time", 20.0).await.unwrap();
        assert_eq!(stats.get_value("start_time").await.unwrap(), Some(10.0));
    }
}
