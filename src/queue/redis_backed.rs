use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::{AsyncCommands, Script};
use tracing::warn;

use crate::error::Result;
use crate::request::Request;

use super::{is_success, Lease, PrioritySelector, QueueStatus, SchedulerQueue};

/// `ZREVRANGEBYSCORE` + `ZREM` + `HSET` in one round trip: pop the highest
/// scored (highest priority, newest-inserted-first among ties because Redis
/// breaks score ties by lexicographic member order and fingerprints are
/// inserted as opaque strings at increasing priority scores) member off
/// `waiting` and record its lease time in `pending`. `min`/`max` (`ARGV[1]`/
/// `ARGV[2]`) bound the score range probed, letting the caller narrow the
/// search to a single priority without a separate script per selector.
const GET_SCRIPT: &str = r#"
redis.replicate_commands()
local waiting_key = KEYS[1]
local pending_key = KEYS[2]
local min = ARGV[1]
local max = ARGV[2]
local result = redis.call('zrevrangebyscore', waiting_key, max, min, 'LIMIT', 0, 1)
if result and #result > 0 then
    redis.call('zrem', waiting_key, result[1])
    redis.call('hset', pending_key, result[1], redis.call('TIME')[1])
    return result[1]
end
return nil
"#;

/// Adds members to `waiting` unless they're already leased and the lease is
/// still fresh (age below `threshold`, passed as `ARGV[1]`), ported from the
/// reference implementation's `add` script with the hardcoded age check
/// promoted to a parameter.
const ADD_SCRIPT: &str = r#"
redis.replicate_commands()
local waiting_key = KEYS[1]
local pending_key = KEYS[2]
local threshold = tonumber(ARGV[1])
local now = tonumber(redis.call('TIME')[1])
local add_count = 0
for i = 2, #ARGV, 2 do
    local fp = ARGV[i]
    local priority = tonumber(ARGV[i + 1])
    local leased_at = redis.call('hget', pending_key, fp)
    if (leased_at and now - tonumber(leased_at) >= threshold) or (not leased_at) then
        redis.call('zadd', waiting_key, priority, fp)
        redis.call('hdel', pending_key, fp)
        add_count = add_count + 1
    end
end
return add_count
"#;

/// Running counters folded into the periodic heartbeat write.
#[derive(Debug, Default)]
struct HeartbeatStats {
    task_count: AtomicU64,
    task_success: AtomicU64,
    task_failure: AtomicU64,
}

#[derive(serde::Serialize)]
struct HeartbeatPayload {
    #[serde(rename = "T")]
    task_count: u64,
    #[serde(rename = "S")]
    task_success: u64,
    #[serde(rename = "F")]
    task_failure: u64,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const HEARTBEAT_TTL_SECS: u64 = 20;

/// Scheduler queue backed by a Redis sorted set (`waiting`) plus two hashes
/// (`pending`, `failure`), for coordinating multiple crawler processes over
/// one shared queue.
pub struct RedisSchedulerQueue {
    client: redis::Client,
    namespace: String,
    pending_threshold: Duration,
    get_script: Script,
    add_script: Script,
    stats: Arc<HeartbeatStats>,
}

impl RedisSchedulerQueue {
    pub fn new(client: redis::Client, namespace: impl Into<String>, pending_threshold: Duration) -> Self {
        let queue = Self {
            client,
            namespace: namespace.into(),
            pending_threshold,
            get_script: Script::new(GET_SCRIPT),
            add_script: Script::new(ADD_SCRIPT),
            stats: Arc::new(HeartbeatStats::default()),
        };
        queue.spawn_heartbeat();
        queue
    }

    fn waiting_key(&self) -> String {
        format!("{}:waiting", self.namespace)
    }
    fn pending_key(&self) -> String {
        format!("{}:pending", self.namespace)
    }
    fn failure_key(&self) -> String {
        format!("{}:failure", self.namespace)
    }
    fn requests_key(&self) -> String {
        format!("{}:requests", self.namespace)
    }
    fn client_key(&self) -> String {
        let pid = std::process::id();
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        format!("{}:client:{}#{}", self.namespace, host, pid)
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Every [`HEARTBEAT_INTERVAL`], writes a JSON summary of this process's
    /// task counters under `<namespace>:client:<host>#<pid>`, expiring after
    /// [`HEARTBEAT_TTL_SECS`] so a crashed process's key disappears rather
    /// than lying around as a false "still alive" signal.
    fn spawn_heartbeat(&self) {
        let client = self.client.clone();
        let key = self.client_key();
        let stats = self.stats.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                let payload = HeartbeatPayload {
                    task_count: stats.task_count.load(Ordering::Relaxed),
                    task_success: stats.task_success.load(Ordering::Relaxed),
                    task_failure: stats.task_failure.load(Ordering::Relaxed),
                };
                let body = match serde_json::to_string(&payload) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(%e, "failed to encode heartbeat payload");
                        continue;
                    }
                };
                let conn = client.get_multiplexed_async_connection().await;
                match conn {
                    Ok(mut conn) => {
                        let result: std::result::Result<(), redis::RedisError> =
                            conn.set_ex(&key, body, HEARTBEAT_TTL_SECS).await;
                        if let Err(e) = result {
                            warn!(%e, %key, "failed to write heartbeat");
                        }
                    }
                    Err(e) => warn!(%e, "failed to connect to redis for heartbeat"),
                }
            }
        });
    }
}

impl SchedulerQueue for RedisSchedulerQueue {
    async fn add(&self, requests: Vec<Request>) -> Result<usize> {
        if requests.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;

        // Persist request bodies first so a concurrent `get` never observes a
        // fingerprint in `waiting` without a matching payload.
        let mut pipe = redis::pipe();
        let mut fps = Vec::with_capacity(requests.len());
        for request in &requests {
            let fp = request.fingerprint();
            let payload = serde_json::to_string(request)?;
            pipe.hset(self.requests_key(), fp.as_hex(), payload);
            fps.push(fp);
        }
        let _: () = pipe.query_async(&mut conn).await?;

        let waiting_key = self.waiting_key();
        let pending_key = self.pending_key();
        let mut invocation = self.add_script.key(waiting_key);
        invocation.key(pending_key);
        invocation.arg(self.pending_threshold.as_secs());
        for (request, fp) in requests.iter().zip(&fps) {
            invocation.arg(fp.as_hex()).arg(request.priority);
        }

        let added: usize = invocation.invoke_async(&mut conn).await?;
        Ok(added)
    }

    async fn get(&self, priority: &PrioritySelector) -> Result<Option<Lease>> {
        let mut conn = self.conn().await?;

        let mut fp_hex = None;
        for (min, max) in priority.score_ranges() {
            let hit: Option<String> = self
                .get_script
                .key(self.waiting_key())
                .key(self.pending_key())
                .arg(min)
                .arg(max)
                .invoke_async(&mut conn)
                .await?;
            if hit.is_some() {
                fp_hex = hit;
                break;
            }
        }

        let Some(fp_hex) = fp_hex else {
            return Ok(None);
        };

        let payload: Option<String> = conn.hget(self.requests_key(), &fp_hex).await?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let request: Request = serde_json::from_str(&payload)?;
        let fingerprint = request.fingerprint();
        self.stats.task_count.fetch_add(1, Ordering::Relaxed);

        Ok(Some(Lease {
            request,
            fingerprint,
            leased_at: chrono::Utc::now(),
        }))
    }

    async fn set_result(&self, lease: Lease, ok: i8) -> Result<()> {
        let mut conn = self.conn().await?;
        let fp_hex = lease.fingerprint.as_hex();
        if is_success(ok) {
            self.stats.task_success.fetch_add(1, Ordering::Relaxed);
            let _: () = conn.hdel(self.pending_key(), &fp_hex).await?;
        } else {
            self.stats.task_failure.fetch_add(1, Ordering::Relaxed);
            let payload = serde_json::to_string(&lease.request)?;
            let mut pipe = redis::pipe();
            pipe.hdel(self.pending_key(), &fp_hex);
            pipe.hset(self.failure_key(), &fp_hex, payload);
            let _: () = pipe.query_async(&mut conn).await?;
        }
        Ok(())
    }

    async fn check_status(&self) -> Result<QueueStatus> {
        let mut conn = self.conn().await?;

        let stale_cutoff = chrono::Utc::now().timestamp() - self.pending_threshold.as_secs() as i64;
        let pending_all: std::collections::HashMap<String, i64> = conn.hgetall(self.pending_key()).await?;
        for (fp_hex, leased_at) in pending_all {
            if leased_at < stale_cutoff {
                if let Some(payload) = conn.hget::<_, _, Option<String>>(self.requests_key(), &fp_hex).await? {
                    let request: Request = serde_json::from_str(&payload)?;
                    let mut pipe = redis::pipe();
                    pipe.zadd(self.waiting_key(), &fp_hex, request.priority);
                    pipe.hdel(self.pending_key(), &fp_hex);
                    let _: () = pipe.query_async(&mut conn).await?;
                }
            }
        }

        let waiting: usize = conn.zcard(self.waiting_key()).await?;
        let pending: usize = conn.hlen(self.pending_key()).await?;
        let failure: usize = conn.hlen(self.failure_key()).await?;
        Ok(QueueStatus { waiting, pending, failure })
    }

    async fn failure_to_waiting(&self) -> Result<usize> {
        let mut conn = self.conn().await?;
        let failed: std::collections::HashMap<String, String> = conn.hgetall(self.failure_key()).await?;
        let count = failed.len();
        if count == 0 {
            return Ok(0);
        }

        let mut pipe = redis::pipe();
        for (fp_hex, payload) in &failed {
            let request: Request = serde_json::from_str(payload)?;
            pipe.zadd(self.waiting_key(), fp_hex, request.priority);
        }
        pipe.del(self.failure_key());
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(count)
    }

    async fn clean_queue(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .del(&[
                self.waiting_key(),
                self.pending_key(),
                self.failure_key(),
                self.requests_key(),
            ])
            .await?;
        Ok(())
    }
}
