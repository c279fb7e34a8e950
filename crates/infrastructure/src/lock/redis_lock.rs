use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};
use scrape_core::traits::LockCoordinator;
use scrape_core::{SchedulerError, SchedulerResult};
use tracing::debug;

/// 仅当值仍等于持有者时删除
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// 仅当值仍等于持有者时延长过期时间
const REFRESH_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

fn lock_error(action: &str, err: redis::RedisError) -> SchedulerError {
    SchedulerError::LockCoordinator(format!("Redis {action} failed: {err}"))
}

/// 基于 Redis `SET NX PX` 的锁协调器，可跨进程共享
#[derive(Clone)]
pub struct RedisLockCoordinator {
    conn: ConnectionManager,
    key_prefix: String,
    release_script: Script,
    refresh_script: Script,
}

impl RedisLockCoordinator {
    pub async fn connect(url: &str, key_prefix: &str) -> SchedulerResult<Self> {
        let client = Client::open(url).map_err(|e| lock_error("client", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| lock_error("connect", e))?;
        debug!("Connected Redis lock coordinator at {}", url);

        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
            release_script: Script::new(RELEASE_SCRIPT),
            refresh_script: Script::new(REFRESH_SCRIPT),
        })
    }

    fn key(&self, source_name: &str) -> String {
        format!("{}{}", self.key_prefix, source_name)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait]
impl LockCoordinator for RedisLockCoordinator {
    async fn acquire(
        &self,
        source_name: &str,
        holder: &str,
        ttl: Duration,
    ) -> SchedulerResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.key(source_name))
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| lock_error("SET NX", e))?;
        Ok(reply.is_some())
    }

    async fn release(&self, source_name: &str, holder: &str) -> SchedulerResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .release_script
            .key(self.key(source_name))
            .arg(holder)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| lock_error("release", e))?;
        Ok(deleted == 1)
    }

    async fn refresh(
        &self,
        source_name: &str,
        holder: &str,
        ttl: Duration,
    ) -> SchedulerResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .refresh_script
            .key(self.key(source_name))
            .arg(holder)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| lock_error("refresh", e))?;
        Ok(extended == 1)
    }

    async fn current_holder(&self, source_name: &str) -> SchedulerResult<Option<String>> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(self.key(source_name))
            .query_async(&mut conn)
            .await
            .map_err(|e| lock_error("GET", e))
    }
}
