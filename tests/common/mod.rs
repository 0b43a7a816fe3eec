//! 集成测试共用的替身：假的浏览器会话 / 通知 / 时钟

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use tempfile::TempDir;

use daysign::browser::{Post, SessionFactory, WorkerSession};
use daysign::core::{
    ManualClock, NotifyError, OrchestratorDeps, TaskOrchestrator, TaskSettings, WorkerError,
};
use daysign::credential::CredentialStore;
use daysign::notify::Notifier;

pub const RETRY: Duration = Duration::from_secs(30 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailAt {
    Create,
    OpenListing,
    Login,
    LocatePost,
    Reply,
    CheckIn,
    UserInfo,
}

#[derive(Default)]
pub struct Recorder {
    pub create_calls: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub logins: AtomicUsize,
    pub replies: AtomicUsize,
    pub fail_at: Mutex<Option<FailAt>>,
    pub hold: Mutex<Duration>,
}

impl Recorder {
    fn fails_at(&self, at: FailAt) -> bool {
        *self.fail_at.lock().unwrap() == Some(at)
    }

    fn check(&self, at: FailAt) -> Result<(), WorkerError> {
        if self.fails_at(at) {
            Err(WorkerError::Browser("timeout".into()))
        } else {
            Ok(())
        }
    }
}

pub struct FakeFactory {
    pub recorder: Arc<Recorder>,
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn create(&self) -> Result<Box<dyn WorkerSession>, WorkerError> {
        self.recorder.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fails_at(FailAt::Create) {
            return Err(WorkerError::Launch("no chrome".into()));
        }
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.recorder.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.max_active.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            recorder: Arc::clone(&self.recorder),
            closed: false,
        }))
    }
}

pub struct FakeSession {
    recorder: Arc<Recorder>,
    closed: bool,
}

#[async_trait]
impl WorkerSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), WorkerError> {
        if url.ends_with("/thread") {
            self.recorder.check(FailAt::OpenListing)?;
        }
        Ok(())
    }

    async fn login_marker(&mut self) -> Result<String, WorkerError> {
        Ok("<div>欢迎 | 退出</div>".into())
    }

    async fn login(&mut self, _login_url: &str) -> Result<(), WorkerError> {
        self.recorder.check(FailAt::Login)?;
        self.recorder.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn export_credentials(&mut self) -> Result<Vec<u8>, WorkerError> {
        Ok(b"[]".to_vec())
    }

    async fn import_credentials(&mut self, _blob: &[u8]) -> Result<(), WorkerError> {
        Ok(())
    }

    async fn first_post(&mut self, _listing_url: &str) -> Result<Post, WorkerError> {
        self.recorder.check(FailAt::LocatePost)?;
        Ok(Post {
            title: "今日新帖".into(),
            href: "/read.php?tid=42".into(),
        })
    }

    async fn reply(&mut self, content: &str) -> Result<String, WorkerError> {
        let hold = *self.recorder.hold.lock().unwrap();
        if !hold.is_zero() {
            tokio::time::sleep(hold).await;
        }
        self.recorder.check(FailAt::Reply)?;
        self.recorder.replies.fetch_add(1, Ordering::SeqCst);
        Ok(content.to_string())
    }

    async fn check_in(&mut self, _url: &str) -> Result<String, WorkerError> {
        self.recorder.check(FailAt::CheckIn)?;
        Ok("签到成功，获得 5 金币".into())
    }

    async fn user_info(&mut self, _url: &str) -> Result<String, WorkerError> {
        self.recorder.check(FailAt::UserInfo)?;
        Ok("📊 用户积分信息 📊\n📌 金币: 120\n".into())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.recorder.closed.fetch_add(1, Ordering::SeqCst);
            self.recorder.active.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<String>>,
    pub failures_left: AtomicUsize,
}

impl FakeNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(NotifyError::Api {
                status: 502,
                description: "bad gateway".into(),
            });
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub recorder: Arc<Recorder>,
    pub notifier: Arc<FakeNotifier>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

pub fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let notifier = Arc::new(FakeNotifier::default());
    let clock = Arc::new(ManualClock::new(
        Local.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).unwrap(),
    ));

    let settings = TaskSettings {
        base_url: "https://forum.example".into(),
        listing_url: "https://forum.example/thread".into(),
        login_url: "https://forum.example/login".into(),
        check_in_url: "https://forum.example/checkin".into(),
        user_info_url: "https://forum.example/profile".into(),
        retry_interval: RETRY,
        cooldown: Duration::from_secs(5 * 60),
        reply_pool: vec!["感谢分享！！".into()],
    };

    let orchestrator = TaskOrchestrator::new(OrchestratorDeps {
        settings,
        sessions: Arc::new(FakeFactory {
            recorder: Arc::clone(&recorder),
        }),
        credentials: CredentialStore::new(dir.path().join("cookies")),
        notifier: notifier.clone(),
        clock: clock.clone(),
    });

    Harness {
        orchestrator,
        recorder,
        notifier,
        clock,
        dir,
    }
}

