//! 日志：控制台 + 按天滚动的日志文件，启动时清理 7 天前的旧日志

use std::path::Path;

use chrono::{Local, NaiveDate};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_PREFIX: &str = "daysign";
pub const LOG_SUFFIX: &str = "log";
pub const LOG_RETENTION_DAYS: i64 = 7;

/// 删除日志目录中日期早于 today - keep_days 的日志，返回删除数量
pub fn cleanup_old_logs(dir: &Path, today: NaiveDate, keep_days: i64) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let pattern = match regex::Regex::new(&format!(
        r"^{}\.(\d{{4}}-\d{{2}}-\d{{2}})\.{}$",
        LOG_PREFIX, LOG_SUFFIX
    )) {
        Ok(re) => re,
        Err(_) => return 0,
    };
    let cutoff = today - chrono::Duration::days(keep_days);

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(date) = pattern
            .captures(name)
            .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
        else {
            continue;
        };
        if date < cutoff && std::fs::remove_file(entry.path()).is_ok() {
            removed += 1;
        }
    }
    removed
}

/// 初始化日志；返回的 guard 需在进程生命周期内持有
pub fn init(log_dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let removed = cleanup_old_logs(log_dir, Local::now().date_naive(), LOG_RETENTION_DAYS);

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix(LOG_SUFFIX)
        .build(log_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    if removed > 0 {
        tracing::info!("共清理了 {} 个过期日志文件", removed);
    }
    Ok(guard)
}
