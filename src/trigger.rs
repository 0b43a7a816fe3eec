//! 定时触发：秒级 cron 表达式 + 可选的启动即执行
//!
//! 每次触发都在独立任务里调用 execute()，停止调度器不会等待或取消正在执行的任务。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Local;
use rand::Rng;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::core::TaskOrchestrator;

/// cron 触发器
pub struct Trigger {
    scheduler: JobScheduler,
    job_id: Uuid,
}

impl Trigger {
    /// 注册 cron 任务并启动；表达式非法属于致命启动错误
    ///
    /// `jitter` 为触发后随机等待的上限，用于错开固定时刻。
    pub async fn start(
        orchestrator: Arc<TaskOrchestrator>,
        schedule: &str,
        jitter: Duration,
        run_on_start: bool,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        let job_orchestrator = Arc::clone(&orchestrator);
        let job = Job::new_async_tz(schedule, Local, move |_uuid, _lock| {
            let orchestrator = Arc::clone(&job_orchestrator);
            Box::pin(async move {
                tracing::info!("定时任务触发");
                tokio::spawn(async move {
                    let delay = random_delay(jitter);
                    if !delay.is_zero() {
                        tracing::info!("等待 {} 秒后开始执行", delay.as_secs());
                        tokio::time::sleep(delay).await;
                    }
                    orchestrator.execute().await;
                });
            })
        })
        .map_err(|e| anyhow!("添加定时任务失败 ({}): {}", schedule, e))?;

        let job_id = scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("添加定时任务失败: {}", e))?;
        scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {}", e))?;
        tracing::info!(schedule = %schedule, job_id = %job_id, "定时调度器已启动");

        if run_on_start {
            tracing::info!("启动时立即执行一次任务");
            tokio::spawn(async move { orchestrator.execute().await });
        }

        Ok(Self { scheduler, job_id })
    }

    /// 下一次触发时间
    pub async fn next_tick(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        let mut scheduler = self.scheduler.clone();
        scheduler.next_tick_for_job(self.job_id).await.ok().flatten()
    }

    /// 停止调度器；不影响已经开始的 execute()
    pub async fn stop(&self) {
        let mut scheduler = self.scheduler.clone();
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!("停止调度器失败: {}", e);
        } else {
            tracing::info!("定时调度器已停止");
        }
    }
}

fn random_delay(max: Duration) -> Duration {
    let secs = max.as_secs();
    if secs == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs(rand::thread_rng().gen_range(0..secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_delay_bounds() {
        assert_eq!(random_delay(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(random_delay(Duration::from_secs(120)) < Duration::from_secs(120));
        }
    }

    #[test]
    fn test_invalid_cron_rejected() {
        let job = Job::new_async_tz("not a cron", Local, |_uuid, _lock| Box::pin(async {}));
        assert!(job.is_err());
    }
}
