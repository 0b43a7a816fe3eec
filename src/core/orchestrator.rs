//! 任务编排器：单飞入口、每日成功去重、失败重试
//!
//! execute() 是唯一入口（cron、启动执行、重试定时器都调用它）：
//! 1. 锁内守卫：在飞 / 冷却 / 日期翻转 / 今日已成功，通过后置 in_flight
//! 2. 锁外执行主体：创建浏览器 → 回帖页 → 登录 → 找帖 → 回帖 → 签到 → 积分 → 通知
//! 3. 任一步失败即中止并 schedule_retry；全部成功记录今日成功
//!
//! 状态锁只在守卫与收尾时短暂持有，从不跨越 await。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::watch;

use crate::browser::{SessionFactory, SessionGuard};
use crate::config::{AppConfig, RUN_COOLDOWN};
use crate::core::retry::RetrySlot;
use crate::core::{Clock, GuardSkip, RunState, Step, StepFailure};
use crate::credential::CredentialStore;
use crate::notify::Notifier;

/// 任务主体需要的地址与参数
#[derive(Debug, Clone)]
pub struct TaskSettings {
    pub base_url: String,
    pub listing_url: String,
    pub login_url: String,
    pub check_in_url: String,
    pub user_info_url: String,
    pub retry_interval: Duration,
    pub cooldown: Duration,
    pub reply_pool: Vec<String>,
}

impl TaskSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            base_url: cfg.base_url.clone(),
            listing_url: cfg.listing_url(),
            login_url: cfg.login_url(),
            check_in_url: cfg.check_in_url(),
            user_info_url: cfg.user_info_url(),
            retry_interval: cfg.retry_interval(),
            cooldown: RUN_COOLDOWN,
            reply_pool: cfg.reply_pool(),
        }
    }
}

/// 编排器依赖的协作者
pub struct OrchestratorDeps {
    pub settings: TaskSettings,
    pub sessions: Arc<dyn SessionFactory>,
    pub credentials: CredentialStore,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

pub struct TaskOrchestrator {
    settings: TaskSettings,
    sessions: Arc<dyn SessionFactory>,
    credentials: CredentialStore,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    state: Mutex<RunState>,
    in_flight_tx: watch::Sender<bool>,
    retry: RetrySlot,
    /// 关闭开始后不再安排重试
    closing: AtomicBool,
}

/// 离开作用域时释放 in_flight
struct InFlightGuard<'a> {
    orchestrator: &'a TaskOrchestrator,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.orchestrator.lock_state().finish();
        self.orchestrator.in_flight_tx.send_replace(false);
    }
}

impl TaskOrchestrator {
    pub fn new(deps: OrchestratorDeps) -> Arc<Self> {
        let today = deps.clock.today();
        let (in_flight_tx, _) = watch::channel(false);
        Arc::new(Self {
            settings: deps.settings,
            sessions: deps.sessions,
            credentials: deps.credentials,
            notifier: deps.notifier,
            clock: deps.clock,
            state: Mutex::new(RunState::new(today)),
            in_flight_tx,
            retry: RetrySlot::new(),
            closing: AtomicBool::new(false),
        })
    }

    /// 执行一次完整任务；重叠、冷却、今日已成功或正在退出时直接返回
    pub async fn execute(self: &Arc<Self>) {
        if self.is_closing() {
            tracing::info!("程序正在退出，跳过本次执行");
            return;
        }
        let _in_flight = match self.begin() {
            Ok(guard) => guard,
            Err(GuardSkip::SucceededToday) => {
                tracing::debug!("{}", GuardSkip::SucceededToday);
                return;
            }
            Err(skip) => {
                tracing::info!("{}", skip);
                return;
            }
        };

        tracing::info!("开始执行任务...");
        match self.run_steps().await {
            Ok(()) => {
                let now = self.clock.now();
                self.lock_state().record_success(now);
                if self.retry.cancel() {
                    tracing::info!("任务成功，已取消待执行的重试");
                }
                tracing::info!("任务成功完成");
            }
            Err(failure) => {
                tracing::warn!(step = ?failure.step, "{}", failure);
                self.schedule_retry(&failure.to_string()).await;
            }
        }
    }

    /// 锁内守卫，通过后返回 in_flight 守卫
    fn begin(&self) -> Result<InFlightGuard<'_>, GuardSkip> {
        let now = self.clock.now();
        let mut state = self.lock_state();
        state.try_begin(now, self.settings.cooldown)?;
        self.in_flight_tx.send_replace(true);
        drop(state);
        Ok(InFlightGuard { orchestrator: self })
    }

    /// 任务主体：任一步失败立即返回，浏览器由 SessionGuard 保证关闭
    async fn run_steps(&self) -> Result<(), StepFailure> {
        let session = self
            .sessions
            .create()
            .await
            .map_err(|e| StepFailure::new(Step::CreateWorker, e))?;
        let mut guard = SessionGuard::new(session);
        let s = guard.session();
        let fail = |step: Step| move |e: crate::core::WorkerError| StepFailure::new(step, e);

        s.navigate(&self.settings.listing_url)
            .await
            .map_err(fail(Step::OpenListing))?;

        self.credentials
            .ensure_logged_in(&mut *s, &self.settings.login_url)
            .await
            .map_err(fail(Step::Authenticate))?;

        let post = s
            .first_post(&self.settings.listing_url)
            .await
            .map_err(fail(Step::LocatePost))?;
        tracing::info!(title = %post.title, href = %post.href, "找到帖子");

        let post_url = format!("{}{}", self.settings.base_url, post.href);
        s.navigate(&post_url).await.map_err(fail(Step::OpenPost))?;

        let content = self.pick_reply();
        let replied = s.reply(&content).await.map_err(fail(Step::Reply))?;
        let reply_info = format!("成功回复帖子: \n标题：{}, \n回帖：{}", post.title, replied);
        tracing::info!("{}", reply_info);

        let check_in = s
            .check_in(&self.settings.check_in_url)
            .await
            .map_err(fail(Step::CheckIn))?;
        tracing::info!("签到结果：{}", check_in);

        let user_info = s
            .user_info(&self.settings.user_info_url)
            .await
            .map_err(fail(Step::FetchUserInfo))?;

        let message = format!(
            "✅ daysign ✅\n时间: {}\n{}\n{}\n{}",
            self.timestamp(),
            reply_info,
            check_in,
            user_info
        );
        self.notifier
            .send(&message)
            .await
            .map_err(|e| StepFailure::new(Step::Notify, e))?;

        tracing::info!("任务完成，关闭浏览器...");
        guard.close();
        Ok(())
    }

    /// 安排一次重试并发送失败通知；今日已成功时跳过，正在退出时只通知不重试
    pub async fn schedule_retry(self: &Arc<Self>, reason: &str) {
        if self.is_closing() {
            tracing::warn!("任务失败，原因: {}，程序正在退出，不再重试", reason);
            let message = format!(
                "❌ 任务失败 ❌\n时间: {}\n原因: {}\n程序正在退出，不再重试",
                self.timestamp(),
                reason
            );
            if let Err(e) = self.notifier.send(&message).await {
                tracing::warn!("发送失败通知失败: {}", e);
            }
            return;
        }
        let today = self.clock.today();
        let already = self.lock_state().succeeded_on(today);
        if already {
            tracing::info!("今天已经成功签到，不重试: {}", reason);
            return;
        }

        let interval = self.settings.retry_interval;
        tracing::warn!("任务失败，原因: {}，将在 {:?} 后重试", reason, interval);
        self.arm_retry(interval);

        let message = format!(
            "❌ 任务失败 ❌\n时间: {}\n原因: {}\n将在 {}后重试",
            self.timestamp(),
            reason,
            describe_wait(interval)
        );
        if let Err(e) = self.notifier.send(&message).await {
            tracing::warn!("发送失败通知失败: {}", e);
        }
    }

    /// 启动新的一次性定时器，替换旧的
    fn arm_retry(self: &Arc<Self>, delay: Duration) {
        let generation = self.retry.next_generation();
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !orchestrator.retry.claim(generation) || orchestrator.is_closing() {
                return;
            }
            let today = orchestrator.clock.today();
            let already = orchestrator.lock_state().succeeded_on(today);
            if already {
                tracing::info!("定时重试前检测到今天已经成功签到，取消重试");
                return;
            }
            tracing::info!("开始重试任务...");
            orchestrator.execute().await;
        });
        self.retry.replace(generation, handle);
    }

    /// 进入关闭流程：取消待执行的重试，之后失败的任务也不会再安排重试
    pub fn begin_shutdown(&self) -> bool {
        self.closing.store(true, Ordering::SeqCst);
        self.retry.cancel()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn has_pending_retry(&self) -> bool {
        self.retry.is_pending()
    }

    pub fn snapshot(&self) -> RunState {
        self.lock_state().clone()
    }

    /// 等待正在执行的任务结束；超时返回 false
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.in_flight_tx.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|busy| !*busy)).await;
        matches!(waited, Ok(Ok(_)))
    }

    fn pick_reply(&self) -> String {
        let mut rng = rand::thread_rng();
        self.settings
            .reply_pool
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| "感谢分享！".to_string())
    }

    fn timestamp(&self) -> String {
        self.clock.now().format("%Y-%m-%d %H:%M:%S").to_string()
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 重试等待时长的展示文本：整分钟显示分钟，否则显示秒
fn describe_wait(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} 分钟", secs / 60)
    } else {
        format!("{} 秒", secs)
    }
}
