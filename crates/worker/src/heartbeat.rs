use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scrape_core::traits::LockCoordinator;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// 运行期间的源锁续期任务
///
/// 由执行器在加锁后启动，运行结束时 `stop`。续期返回 `false` 说明锁已过期并可能
/// 被其他执行器取得，此时设置丢失标记，执行器在下一个单元前放弃剩余工作。
pub struct LockHeartbeat {
    lost: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl LockHeartbeat {
    pub fn spawn(
        lock_coordinator: Arc<dyn LockCoordinator>,
        source_name: String,
        holder: String,
        ttl: Duration,
        refresh_interval: Duration,
    ) -> Self {
        let lost = Arc::new(AtomicBool::new(false));
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let flag = lost.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + refresh_interval, refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match lock_coordinator.refresh(&source_name, &holder, ttl).await {
                            Ok(true) => debug!(source_name = %source_name, holder = %holder, "源锁已续期"),
                            Ok(false) => {
                                error!(source_name = %source_name, holder = %holder, "源锁已丢失");
                                flag.store(true, Ordering::SeqCst);
                                break;
                            }
                            Err(e) => {
                                // 后端暂时不可用，TTL 内的下一次续期仍有机会成功
                                warn!(source_name = %source_name, holder = %holder, "源锁续期失败: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Self {
            lost,
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// 停止续期并等待后台任务退出，返回锁是否在运行期间丢失
    pub async fn stop(mut self) -> bool {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!("续期任务异常退出: {}", e);
        }
        self.is_lost()
    }
}

impl Drop for LockHeartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrape_infrastructure::InMemoryLockCoordinator;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_refresh_keeps_lock_alive() {
        let locks = Arc::new(InMemoryLockCoordinator::new());
        assert!(locks.acquire("board", "run-1", TTL).await.unwrap());

        let heartbeat = LockHeartbeat::spawn(
            locks.clone(),
            "board".to_string(),
            "run-1".to_string(),
            TTL,
            Duration::from_secs(20),
        );

        // 超过两个 TTL 仍然持有
        for _ in 0..8 {
            tokio::time::sleep(Duration::from_secs(20)).await;
        }
        assert!(!heartbeat.is_lost());
        assert!(!locks.acquire("board", "run-2", TTL).await.unwrap());

        assert!(!heartbeat.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_lock_sets_flag() {
        let locks = Arc::new(InMemoryLockCoordinator::new());
        locks.acquire("board", "run-1", TTL).await.unwrap();

        let heartbeat = LockHeartbeat::spawn(
            locks.clone(),
            "board".to_string(),
            "run-1".to_string(),
            TTL,
            Duration::from_secs(20),
        );

        // 锁被强制释放后由其他运行取得
        locks.release("board", "run-1").await.unwrap();
        locks.acquire("board", "run-2", TTL).await.unwrap();

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(heartbeat.is_lost());
        assert!(heartbeat.stop().await);
    }
}
