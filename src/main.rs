//! Daysign 入口：加载配置与日志，启动进程监控与定时触发，等待退出信号后依次清理。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use daysign::browser::{ChromeLauncher, LoginForm};
use daysign::config::{load_config, load_env_file};
use daysign::core::{OrchestratorDeps, ShutdownManager, SystemClock, TaskOrchestrator, TaskSettings};
use daysign::credential::CredentialStore;
use daysign::janitor::{ProcessJanitor, SystemCensus};
use daysign::notify::TelegramNotifier;
use daysign::observability;
use daysign::trigger::Trigger;

/// 关闭时等待在飞任务的上限
const SHUTDOWN_GRACE: Duration = Duration::from_secs(60);

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var_os("DAYSIGN_CONFIG").map(PathBuf::from)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file = load_env_file(None).context("Failed to load .env")?;
    let cfg = load_config(config_path_from_args()).context("Failed to load config")?;
    let _log_guard = observability::init(&cfg.log_dir).context("Failed to init logging")?;
    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "Loaded .env");
    }
    cfg.validate().context("Invalid config")?;

    tracing::info!("程序启动...");

    let census = Arc::new(SystemCensus);
    let launcher = ChromeLauncher::new(
        census.clone(),
        LoginForm {
            username: cfg.forum_username.clone(),
            password: cfg.forum_password.clone(),
            question: cfg.security_question.clone(),
            answer: cfg.security_answer.clone(),
        },
    )
    .headless(cfg.enable_headless)
    .chrome_path(cfg.chrome_path.clone())
    .force_kill(cfg.force_kill_chrome);

    let mut notifier = TelegramNotifier::new(cfg.telegram_bot_token.clone(), cfg.telegram_chat_id);
    if let Some(ref base) = cfg.telegram_api_base {
        notifier = notifier.with_api_base(base.clone());
    }

    let orchestrator = TaskOrchestrator::new(OrchestratorDeps {
        settings: TaskSettings::from_config(&cfg),
        sessions: Arc::new(launcher),
        credentials: CredentialStore::new(cfg.cookie_path.clone()),
        notifier: Arc::new(notifier),
        clock: Arc::new(SystemClock),
    });

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let janitor = Arc::new(
        ProcessJanitor::new(census)
            .with_interval(cfg.janitor_interval())
            .with_threshold(cfg.process_threshold),
    );
    let janitor_stop = shutdown.token().child_token();
    let janitor_task = {
        let janitor = Arc::clone(&janitor);
        let stop = janitor_stop.clone();
        tokio::spawn(async move { janitor.run(stop).await })
    };

    let trigger = Trigger::start(
        Arc::clone(&orchestrator),
        &cfg.cron_schedule,
        Duration::from_secs(cfg.waiting_time),
        cfg.run_on_start,
    )
    .await
    .context("Failed to start scheduler")?;
    if let Some(next) = trigger.next_tick().await {
        tracing::info!("下一次执行时间: {}", next.with_timezone(&chrono::Local));
    }

    tracing::info!("程序已启动，按Ctrl+C停止");
    let reason = shutdown.wait().await;
    tracing::info!("收到退出信号 ({})，正在清理资源...", reason);

    trigger.stop().await;
    if orchestrator.begin_shutdown() {
        tracing::info!("已取消待执行的重试");
    }
    janitor_stop.cancel();
    let _ = janitor_task.await;

    if !orchestrator.wait_idle(SHUTDOWN_GRACE).await {
        tracing::warn!("等待正在执行的任务超时，直接退出");
    }
    janitor.final_sweep().await;

    tracing::info!("程序已安全退出");
    Ok(())
}
