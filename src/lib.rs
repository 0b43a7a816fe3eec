//! Daysign - 论坛每日签到守护进程
//!
//! 模块划分：
//! - **config**: 配置加载（TOML + .env + 环境变量）
//! - **core**: 任务编排、运行状态、重试句柄、错误类型、优雅关闭
//! - **browser**: 浏览器会话抽象与 Chrome 实现
//! - **credential**: cookies 凭据的保存、过期与复用
//! - **extract**: 页面 HTML 解析
//! - **janitor**: 残留浏览器进程清理
//! - **notify**: Telegram 通知
//! - **observability**: 日志初始化与旧日志清理
//! - **trigger**: cron 定时触发

pub mod browser;
pub mod config;
pub mod core;
pub mod credential;
pub mod extract;
pub mod janitor;
pub mod notify;
pub mod observability;
pub mod trigger;

pub use crate::core::{TaskOrchestrator, TaskSettings};
