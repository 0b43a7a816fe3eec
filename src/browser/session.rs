//! Worker Session 抽象：一次任务执行独占一个外部浏览器进程
//!
//! - WorkerSession：导航 / 登录 / 回帖 / 签到等高层步骤
//! - SessionFactory：创建会话（Chrome 或测试替身）
//! - run_bounded：阻塞动作放到 blocking 线程池并加硬超时
//! - SessionGuard：作用域内保证关闭，显式关闭与 Drop 关闭可叠加

use std::time::Duration;

use async_trait::async_trait;

use crate::core::WorkerError;

/// 单批动作的默认超时
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(60);

/// 列表页中定位到的帖子
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Post {
    pub title: String,
    /// 相对链接，拼接 base_url 得到完整地址
    pub href: String,
}

/// 一个活着的浏览器会话
#[async_trait]
pub trait WorkerSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), WorkerError>;

    /// 当前页登录状态区域的 HTML
    async fn login_marker(&mut self) -> Result<String, WorkerError>;

    /// 打开登录页并提交表单，等待登录后的标记出现
    async fn login(&mut self, login_url: &str) -> Result<(), WorkerError>;

    /// 导出当前会话凭据（序列化后的 cookies）
    async fn export_credentials(&mut self) -> Result<Vec<u8>, WorkerError>;

    /// 注入凭据并刷新当前页
    async fn import_credentials(&mut self, blob: &[u8]) -> Result<(), WorkerError>;

    async fn first_post(&mut self, listing_url: &str) -> Result<Post, WorkerError>;

    /// 在当前帖子页回帖，返回实际回复内容
    async fn reply(&mut self, content: &str) -> Result<String, WorkerError>;

    /// 签到，返回页面上的签到结果文本
    async fn check_in(&mut self, check_in_url: &str) -> Result<String, WorkerError>;

    async fn user_info(&mut self, user_info_url: &str) -> Result<String, WorkerError>;

    /// 关闭会话并释放进程；必须幂等
    fn close(&mut self);
}

/// 会话工厂
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self) -> Result<Box<dyn WorkerSession>, WorkerError>;
}

/// 在 blocking 线程池执行阻塞动作，超过 timeout 视为失败
///
/// 超时后后台线程不会被强制中止；调用方应同时给底层动作设置自身超时。
pub async fn run_bounded<T, F>(timeout: Duration, f: F) -> Result<T, WorkerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, WorkerError> + Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(WorkerError::Join(e.to_string())),
        Err(_) => Err(WorkerError::Timeout(timeout)),
    }
}

/// 作用域会话：离开作用域时若未关闭则关闭
pub struct SessionGuard {
    session: Box<dyn WorkerSession>,
    closed: bool,
}

impl SessionGuard {
    pub fn new(session: Box<dyn WorkerSession>) -> Self {
        Self {
            session,
            closed: false,
        }
    }

    pub fn session(&mut self) -> &mut dyn WorkerSession {
        self.session.as_mut()
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.session.close();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.closed {
            tracing::info!("关闭浏览器实例...");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSession {
        closes: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WorkerSession for CountingSession {
        async fn navigate(&mut self, _url: &str) -> Result<(), WorkerError> {
            Ok(())
        }
        async fn login_marker(&mut self) -> Result<String, WorkerError> {
            Ok(String::new())
        }
        async fn login(&mut self, _login_url: &str) -> Result<(), WorkerError> {
            Ok(())
        }
        async fn export_credentials(&mut self) -> Result<Vec<u8>, WorkerError> {
            Ok(Vec::new())
        }
        async fn import_credentials(&mut self, _blob: &[u8]) -> Result<(), WorkerError> {
            Ok(())
        }
        async fn first_post(&mut self, _listing_url: &str) -> Result<Post, WorkerError> {
            Err(WorkerError::Extract("none".into()))
        }
        async fn reply(&mut self, content: &str) -> Result<String, WorkerError> {
            Ok(content.to_string())
        }
        async fn check_in(&mut self, _url: &str) -> Result<String, WorkerError> {
            Ok(String::new())
        }
        async fn user_info(&mut self, _url: &str) -> Result<String, WorkerError> {
            Ok(String::new())
        }
        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_closes_once() {
        let closes = Arc::new(AtomicUsize::new(0));
        {
            let mut guard = SessionGuard::new(Box::new(CountingSession {
                closes: closes.clone(),
            }));
            guard.close();
            guard.close();
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        {
            let _guard = SessionGuard::new(Box::new(CountingSession {
                closes: closes.clone(),
            }));
        }
        assert_eq!(closes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_bounded_ok() {
        let value = run_bounded(Duration::from_secs(1), || Ok(42)).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_run_bounded_timeout() {
        let result: Result<(), _> = run_bounded(Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(WorkerError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_run_bounded_propagates_error() {
        let result: Result<(), _> = run_bounded(Duration::from_secs(1), || {
            Err(WorkerError::Browser("boom".into()))
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "boom");
    }
}
