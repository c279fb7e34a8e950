use std::time::Duration;

use async_trait::async_trait;

use crate::SchedulerResult;

/// 按抓取源加锁的互斥协调器
///
/// 锁值记录持有者（通常是 `run_id`），并带有过期时间，
/// 崩溃的执行器不释放锁时由 TTL 自动回收。
///
/// 获取失败不是错误：`Ok(false)` 表示已有其他运行持有该源，调用方应跳过。
/// `Err` 只表示锁存储本身不可用。
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// 不存在未过期的锁时原子地创建并返回 `true`
    async fn acquire(&self, source_name: &str, holder: &str, ttl: Duration)
        -> SchedulerResult<bool>;

    /// 仅当锁仍由 `holder` 持有时删除，返回是否删除
    async fn release(&self, source_name: &str, holder: &str) -> SchedulerResult<bool>;

    /// 仅当锁仍由 `holder` 持有时延长 TTL，返回 `false` 表示锁已丢失
    async fn refresh(&self, source_name: &str, holder: &str, ttl: Duration)
        -> SchedulerResult<bool>;

    /// 当前持有者，锁不存在或已过期时为 `None`
    async fn current_holder(&self, source_name: &str) -> SchedulerResult<Option<String>>;
}
