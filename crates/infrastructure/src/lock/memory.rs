use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use scrape_core::traits::LockCoordinator;
use scrape_core::SchedulerResult;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct LockEntry {
    holder: String,
    expires_at: Instant,
}

impl LockEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// 进程内锁协调器
///
/// 只能协调同一进程内的执行器，适用于单机部署与测试。
/// 过期时间基于 `tokio::time::Instant`，测试中可以用暂停时钟推进。
#[derive(Debug, Default)]
pub struct InMemoryLockCoordinator {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryLockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockCoordinator for InMemoryLockCoordinator {
    async fn acquire(
        &self,
        source_name: &str,
        holder: &str,
        ttl: Duration,
    ) -> SchedulerResult<bool> {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;

        if let Some(entry) = locks.get(source_name) {
            if entry.is_live(now) {
                debug!(source_name, holder = %entry.holder, "lock held");
                return Ok(false);
            }
        }

        locks.insert(
            source_name.to_string(),
            LockEntry {
                holder: holder.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, source_name: &str, holder: &str) -> SchedulerResult<bool> {
        let mut locks = self.locks.lock().await;
        match locks.get(source_name) {
            Some(entry) if entry.holder == holder => {
                locks.remove(source_name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn refresh(
        &self,
        source_name: &str,
        holder: &str,
        ttl: Duration,
    ) -> SchedulerResult<bool> {
        let now = Instant::now();
        let mut locks = self.locks.lock().await;
        match locks.get_mut(source_name) {
            Some(entry) if entry.holder == holder && entry.is_live(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn current_holder(&self, source_name: &str) -> SchedulerResult<Option<String>> {
        let now = Instant::now();
        let locks = self.locks.lock().await;
        Ok(locks
            .get(source_name)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.holder.clone()))
    }
}
