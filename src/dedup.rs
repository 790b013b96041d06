use std::future::Future;

use dashmap::DashSet;

use crate::error::Result;
use crate::request::Fingerprint;

/// Set-membership test over request fingerprints.
///
/// The reference implementation's filter returns "not seen" (`true` means
/// proceed); this trait inverts that to the more idiomatic `contains`/`add`
/// split so callers don't have to remember a double negative.
pub trait DedupFilter: Send + Sync {
    /// True if this fingerprint has already been recorded.
    fn contains(&self, fp: Fingerprint) -> impl Future<Output = Result<bool>> + Send;

    /// Records a fingerprint as seen. Idempotent.
    fn add(&self, fp: Fingerprint) -> impl Future<Output = Result<()>> + Send;

    /// Drops all recorded fingerprints, used when a queue is reset.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Default)]
pub struct InMemoryDedupFilter {
    seen: DashSet<Fingerprint>,
}

impl InMemoryDedupFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DedupFilter for InMemoryDedupFilter {
    async fn contains(&self, fp: Fingerprint) -> Result<bool> {
        Ok(self.seen.contains(&fp))
    }

    async fn add(&self, fp: Fingerprint) -> Result<()> {
        self.seen.insert(fp);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.seen.clear();
        Ok(())
    }
}

#[cfg(feature = "redis-queue")]
pub mod redis_backed {
    use redis::AsyncCommands;

    use super::*;

    /// Dedup filter backed by a Redis set, keyed `<namespace>:dupefilter`,
    /// using `SISMEMBER`/`SADD` as the reference implementation does.
    pub struct RedisDedupFilter {
        client: redis::Client,
        key: String,
    }

    impl RedisDedupFilter {
        pub fn new(client: redis::Client, namespace: &str) -> Self {
            Self {
                client,
                key: format!("{namespace}:dupefilter"),
            }
        }

        async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
            Ok(self.client.get_multiplexed_async_connection().await?)
        }
    }

    impl DedupFilter for RedisDedupFilter {
        async fn contains(&self, fp: Fingerprint) -> Result<bool> {
            let mut conn = self.conn().await?;
            let is_member: bool = conn.sismember(&self.key, fp.as_hex()).await?;
            Ok(is_member)
        }

        async fn add(&self, fp: Fingerprint) -> Result<()> {
            let mut conn = self.conn().await?;
            let _: () = conn.sadd(&self.key, fp.as_hex()).await?;
            Ok(())
        }

        async fn clear(&self) -> Result<()> {
            let mut conn = self.conn().await?;
            let _: () = conn.del(&self.key).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn fp(n: u8) -> Fingerprint {
        let url = Url::parse(&format!("https://example.com/{n}")).unwrap();
        Fingerprint::compute("GET", &url, None, None)
    }

    #[tokio::test]
    async fn unseen_then_seen() {
        let filter = InMemoryDedupFilter::new();
        let a = fp(1);
        assert!(!filter.contains(a).await.unwrap());
        filter.add(a).await.unwrap();
        assert!(filter.contains(a).await.unwrap());
    }

    #[tokio::test]
    async fn clear_resets_state() {
        let filter = InMemoryDedupFilter::new();
        let a = fp(2);
        filter.add(a).await.unwrap();
        filter.clear().await.unwrap();
        assert!(!filter.contains(a).await.unwrap());
    }
}
