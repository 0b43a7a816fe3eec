//! 应用配置：从 config/daysign.toml、.env 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再读显式指定的文件，最后用环境变量覆盖。
//! 环境变量沿用扁平命名（`BASE_URL`、`TELEGRAM_BOT_TOKEN`、`RETRY_INTERVAL` ...），
//! `.env` 文件会先合并进进程环境。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::ConfigError;

/// 默认 cron：每天 08:30:00（秒 分 时 日 月 周）
pub const DEFAULT_CRON: &str = "0 30 8 * * *";

/// 默认重试间隔
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// 两次执行开始之间的最小间隔
pub const RUN_COOLDOWN: Duration = Duration::from_secs(5 * 60);

/// 应用配置（扁平结构，对应环境变量名的小写形式）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub login_section: String,
    pub reply_section: String,
    pub check_in_section: String,
    pub user_info_section: String,

    pub telegram_bot_token: String,
    pub telegram_chat_id: i64,
    /// 自建 Telegram API 代理，未设置时用官方地址
    pub telegram_api_base: Option<String>,

    pub forum_username: String,
    pub forum_password: String,
    /// 安全问题下拉框的 value
    pub security_question: String,
    pub security_answer: String,

    pub enable_headless: bool,
    /// cron 触发后随机等待的上限（秒），0 表示不等待
    pub waiting_time: u64,
    pub cron_schedule: String,
    /// 分钟数或带单位的时长（如 `1h30m`）
    pub retry_interval: Option<String>,
    pub run_on_start: bool,
    pub chrome_path: Option<PathBuf>,
    pub force_kill_chrome: bool,

    pub cookie_path: PathBuf,
    pub log_dir: PathBuf,
    pub janitor_interval_minutes: u64,
    pub process_threshold: usize,
    /// 回帖内容候选，`|` 分隔；为空时用内置列表
    pub reply_contents: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            login_section: String::new(),
            reply_section: String::new(),
            check_in_section: String::new(),
            user_info_section: String::new(),
            telegram_bot_token: String::new(),
            telegram_chat_id: 0,
            telegram_api_base: None,
            forum_username: String::new(),
            forum_password: String::new(),
            security_question: String::new(),
            security_answer: String::new(),
            enable_headless: false,
            waiting_time: 0,
            cron_schedule: DEFAULT_CRON.to_string(),
            retry_interval: None,
            run_on_start: false,
            chrome_path: None,
            force_kill_chrome: false,
            cookie_path: PathBuf::from("./cookies"),
            log_dir: PathBuf::from("logs"),
            janitor_interval_minutes: 30,
            process_threshold: 5,
            reply_contents: None,
        }
    }
}

/// 内置回帖内容
pub const DEFAULT_REPLY_CONTENTS: &[&str] = &[
    "感谢楼主分享好片",
    "感谢分享！！",
    "谢谢分享！",
    "感谢分享感谢分享",
    "必需支持",
    "感谢分享啊",
    "封面还不错",
    "有点意思啊",
    "封面还不错，支持一波",
    "真不错啊",
    "不错不错",
    "终于等到你",
    "謝謝辛苦分享",
    "赏心悦目",
    "分享支持。",
    "這系列真有戲",
    "感谢大佬分享v",
    "看着不错",
    "感谢老板分享",
    "可以看看",
    "谢谢分享！！！",
    "妙不可言",
    "感谢分享这一部资源",
    "终于来了，等了好久了。",
    "确实不错。",
];

impl AppConfig {
    /// 解析后的重试间隔；无法解析时告警并回退到 30 分钟
    pub fn retry_interval(&self) -> Duration {
        match self.retry_interval.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_RETRY_INTERVAL,
            Some(raw) => parse_retry_interval(raw).unwrap_or_else(|| {
                tracing::warn!("无法解析重试间隔 '{}'，使用默认值30分钟", raw);
                DEFAULT_RETRY_INTERVAL
            }),
        }
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_minutes.max(1) * 60)
    }

    pub fn reply_pool(&self) -> Vec<String> {
        let custom: Vec<String> = self
            .reply_contents
            .as_deref()
            .unwrap_or("")
            .split('|')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if custom.is_empty() {
            DEFAULT_REPLY_CONTENTS.iter().map(|s| s.to_string()).collect()
        } else {
            custom
        }
    }

    fn url(&self, segment: &str) -> String {
        format!("{}{}", self.base_url, segment)
    }

    pub fn listing_url(&self) -> String {
        self.url(&self.reply_section)
    }

    pub fn login_url(&self) -> String {
        self.url(&self.login_section)
    }

    pub fn check_in_url(&self) -> String {
        self.url(&self.check_in_section)
    }

    pub fn user_info_url(&self) -> String {
        self.url(&self.user_info_section)
    }

    /// 启动期校验，失败即退出
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("BASE_URL is required".into()));
        }
        if self.telegram_bot_token.trim().is_empty() {
            return Err(ConfigError::Invalid("TELEGRAM_BOT_TOKEN is required".into()));
        }
        if self.telegram_chat_id == 0 {
            return Err(ConfigError::Invalid("TELEGRAM_CHAT_ID is required".into()));
        }
        if self.cron_schedule.trim().is_empty() {
            return Err(ConfigError::Invalid("CRON_SCHEDULE is empty".into()));
        }
        if self.retry_interval() < RUN_COOLDOWN {
            tracing::warn!(
                "重试间隔 {:?} 小于冷却时间 {:?}，重试将被冷却跳过",
                self.retry_interval(),
                RUN_COOLDOWN
            );
        }
        Ok(())
    }
}

/// 纯数字按分钟；否则按 `<数字><单位>` 组合解析，单位 h / m / s / ms
pub fn parse_retry_interval(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(minutes) = raw.parse::<u64>() {
        return minutes.checked_mul(60).map(Duration::from_secs);
    }

    let re = regex::Regex::new(r"(\d+(?:\.\d+)?)(ms|h|m|s)").ok()?;
    let mut total = 0f64;
    let mut consumed = 0usize;
    for cap in re.captures_iter(raw) {
        let whole = cap.get(0)?;
        if whole.start() != consumed {
            return None;
        }
        consumed = whole.end();
        let value: f64 = cap[1].parse().ok()?;
        total += match &cap[2] {
            "h" => value * 3600.0,
            "m" => value * 60.0,
            "s" => value,
            "ms" => value / 1000.0,
            _ => return None,
        };
    }
    if consumed == 0 || consumed != raw.len() {
        return None;
    }
    Duration::try_from_secs_f64(total).ok()
}

/// 把 .env 合并进进程环境；`path` 为空时从当前目录向上查找
///
/// 在日志初始化之前调用，返回实际加载的文件，由调用方在日志就绪后记录。
pub fn load_env_file(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    let loaded = match path {
        Some(path) => dotenvy::from_path(path).map(|_| path.to_path_buf()),
        None => dotenvy::dotenv(),
    };
    match loaded {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(ConfigError::Invalid(format!("加载 .env 文件失败: {e}"))),
    }
}

/// 加载配置（.env 需已由 load_env_file 合并）
///
/// 1. 查找 config/daysign.toml、daysign.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件
/// 3. 叠加进程环境变量
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/daysign", "daysign"] {
        if Path::new(&format!("{}.toml", name)).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(config::Environment::default());

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    Ok(cfg)
}
