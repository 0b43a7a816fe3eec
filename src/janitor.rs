//! 进程清理：定期统计浏览器进程数，超过阈值时强制终止
//!
//! 与任务执行无关，只是防止残留进程堆积。平台相关的统计 / 终止放在
//! ProcessCensus 后面，阈值判断与单次复查逻辑与平台无关。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// 进程普查能力
#[async_trait]
pub trait ProcessCensus: Send + Sync {
    /// 当前存活的浏览器进程数
    async fn count(&self) -> std::io::Result<usize>;

    /// 强制终止所有浏览器进程
    async fn kill_all(&self) -> std::io::Result<()>;
}

/// 基于系统命令的实现（pgrep / pkill / tasklist / taskkill）
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCensus;

#[async_trait]
impl ProcessCensus for SystemCensus {
    async fn count(&self) -> std::io::Result<usize> {
        if cfg!(windows) {
            let output = Command::new("tasklist")
                .args(["/FI", "IMAGENAME eq chrome.exe", "/NH"])
                .output()
                .await?;
            Ok(String::from_utf8_lossy(&output.stdout).matches("chrome.exe").count())
        } else {
            let output = Command::new("pgrep").args(["-c", "chrom"]).output().await?;
            // pgrep 无匹配时退出码为 1 且输出 0
            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(stdout.trim().parse().unwrap_or(0))
        }
    }

    async fn kill_all(&self) -> std::io::Result<()> {
        tracing::info!("正在终止残留的Chrome进程...");
        let output = if cfg!(windows) {
            Command::new("taskkill")
                .args(["/F", "/IM", "chrome.exe", "/IM", "chromium.exe"])
                .output()
                .await?
        } else if cfg!(target_os = "macos") {
            let _ = Command::new("pkill")
                .args(["-9", "-f", "Google Chrome"])
                .output()
                .await;
            Command::new("pkill").args(["-9", "-f", "Chromium"]).output().await?
        } else {
            Command::new("pkill").args(["-9", "-f", "chrom"]).output().await?
        };

        if output.status.success() {
            tracing::info!("成功终止Chrome进程");
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("not found") && !stderr.contains("没有找到") && !stderr.trim().is_empty() {
                tracing::warn!("终止Chrome进程时出现错误: {}", stderr.trim());
            }
        }
        Ok(())
    }
}

/// 单次清理结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepOutcome {
    /// 统计失败，不做处理
    Unknown,
    /// 未超过阈值
    WithinLimit(usize),
    /// 超过阈值并已清理；after 为复查结果
    Killed { before: usize, after: Option<usize> },
}

/// 定期清理浏览器残留进程
pub struct ProcessJanitor {
    census: Arc<dyn ProcessCensus>,
    interval: Duration,
    threshold: usize,
    settle: Duration,
}

impl ProcessJanitor {
    pub fn new(census: Arc<dyn ProcessCensus>) -> Self {
        Self {
            census,
            interval: Duration::from_secs(30 * 60),
            threshold: 5,
            settle: Duration::from_secs(5),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// 统计一次；超过阈值则全部终止，等待片刻后复查一次
    pub async fn sweep(&self) -> SweepOutcome {
        let before = match self.census.count().await {
            Ok(n) => n,
            Err(e) => {
                tracing::info!("检查Chrome进程状态: 执行命令失败: {}", e);
                return SweepOutcome::Unknown;
            }
        };
        tracing::info!("检测到 {} 个Chrome相关进程", before);
        if before <= self.threshold {
            return SweepOutcome::WithinLimit(before);
        }

        tracing::warn!("Chrome进程数量({})超过阈值，执行清理...", before);
        if let Err(e) = self.census.kill_all().await {
            tracing::warn!("终止Chrome进程失败: {}", e);
        }
        tokio::time::sleep(self.settle).await;

        let after = self.census.count().await.ok();
        match after {
            Some(n) if n > self.threshold => {
                tracing::warn!("清理后仍有 {} 个Chrome相关进程", n)
            }
            Some(n) => tracing::info!("清理后剩余 {} 个Chrome相关进程", n),
            None => {}
        }
        SweepOutcome::Killed { before, after }
    }

    /// 立即检查一次，之后按间隔检查，直到 token 被取消
    pub async fn run(&self, stop: CancellationToken) {
        tracing::info!("开始监控Chrome进程...");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    tracing::info!("Chrome进程监控已停止");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    /// 退出前的最终清理：无条件终止
    pub async fn final_sweep(&self) {
        if let Err(e) = self.census.kill_all().await {
            tracing::warn!("终止Chrome进程失败: {}", e);
        }
    }
}
