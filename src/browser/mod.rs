//! 浏览器会话：抽象接口与 Chrome 实现
//!
//! Chrome 实现需启用 feature "browser"（默认开启）且系统已安装 Chrome/Chromium。

pub mod session;

#[cfg(feature = "browser")]
pub mod chrome;

pub use session::{run_bounded, Post, SessionFactory, SessionGuard, WorkerSession, ACTION_TIMEOUT};

#[cfg(feature = "browser")]
pub use chrome::{ChromeLauncher, LoginForm};
