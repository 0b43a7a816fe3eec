//! 错误类型与守卫跳过原因
//!
//! - WorkerError：浏览器会话 / 脚本步骤失败
//! - NotifyError：通知投递失败
//! - StepFailure：带步骤名的失败，Display 即重试原因（如 `回帖失败: timeout`）
//! - GuardSkip：不是错误，表示本次调用因重叠 / 冷却 / 今日已成功而跳过

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// 浏览器会话与页面脚本执行中的错误
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("No Chrome/Chromium executable found, set CHROME_PATH")]
    ExecutableNotFound,

    #[error("Action timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0}")]
    Browser(String),

    #[error("Extract failed: {0}")]
    Extract(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task join: {0}")]
    Join(String),

    /// 会话已关闭后仍被调用
    #[error("Session already closed")]
    Closed,
}

/// 通知发送错误（不在内部重试）
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error ({status}): {description}")]
    Api { status: u16, description: String },
}

/// 任务主体的各个步骤，label 是面向运维的失败说明
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    CreateWorker,
    OpenListing,
    Authenticate,
    LocatePost,
    OpenPost,
    Reply,
    CheckIn,
    FetchUserInfo,
    Notify,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::CreateWorker => "创建浏览器失败",
            Step::OpenListing => "导航回帖页失败",
            Step::Authenticate => "检查登陆状态出错",
            Step::LocatePost => "提取数据失败",
            Step::OpenPost => "打开帖子失败",
            Step::Reply => "回帖失败",
            Step::CheckIn => "签到失败",
            Step::FetchUserInfo => "获取用户信息失败",
            Step::Notify => "发送通知失败",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 某一步失败；Display 形如 `回帖失败: <cause>`，直接作为重试原因
#[derive(Error, Debug)]
#[error("{step}: {cause}")]
pub struct StepFailure {
    pub step: Step,
    pub cause: String,
}

impl StepFailure {
    pub fn new(step: Step, cause: impl fmt::Display) -> Self {
        Self {
            step,
            cause: cause.to_string(),
        }
    }
}

/// 入口守卫拒绝执行的原因
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardSkip {
    /// 已有一次执行在进行中
    InFlight,
    /// 距上次开始不足冷却时间
    CoolingDown(Duration),
    /// 今日已成功
    SucceededToday,
}

impl fmt::Display for GuardSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardSkip::InFlight => f.write_str("任务已在运行中，跳过本次执行"),
            GuardSkip::CoolingDown(elapsed) => write!(
                f,
                "距离上次执行仅 {}s，小于冷却时间，跳过本次执行",
                elapsed.as_secs()
            ),
            GuardSkip::SucceededToday => f.write_str("今天已经成功签到，跳过本次执行"),
        }
    }
}

/// 启动期配置错误（致命）
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
