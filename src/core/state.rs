//! 运行状态：RunState 与时钟抽象
//!
//! RunState 只由 TaskOrchestrator 持有，并由同一把锁保护；这里只放纯状态转换，
//! 不做任何 IO，便于单测。

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate};

use crate::core::GuardSkip;

/// 墙上时钟（日期翻转与冷却判断用）
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// 系统本地时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// 手动推进的时钟（测试用）
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }

    pub fn set(&self, to: DateTime<Local>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 任务运行状态（不持久化，进程重启即重置）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunState {
    pub in_flight: bool,
    pub last_run_at: Option<DateTime<Local>>,
    pub last_success_at: Option<DateTime<Local>>,
    pub success_date: Option<NaiveDate>,
    /// 仅当 success_date == 今天 时有效
    pub success_today: bool,
}

impl RunState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            in_flight: false,
            last_run_at: None,
            last_success_at: None,
            success_date: Some(today),
            success_today: false,
        }
    }

    /// 日期翻转：记录日期不是今天时清掉今日成功标记
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.success_date != Some(today) {
            self.success_today = false;
            self.success_date = Some(today);
        }
    }

    /// 入口守卫：通过则置 in_flight 并记录开始时间
    pub fn try_begin(&mut self, now: DateTime<Local>, cooldown: Duration) -> Result<(), GuardSkip> {
        if self.in_flight {
            return Err(GuardSkip::InFlight);
        }
        if let Some(last) = self.last_run_at {
            let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
            if elapsed < cooldown {
                return Err(GuardSkip::CoolingDown(elapsed));
            }
        }
        self.roll_over(now.date_naive());
        if self.success_today {
            return Err(GuardSkip::SucceededToday);
        }
        self.in_flight = true;
        self.last_run_at = Some(now);
        Ok(())
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn record_success(&mut self, now: DateTime<Local>) {
        self.last_success_at = Some(now);
        self.success_date = Some(now.date_naive());
        self.success_today = true;
    }

    /// 给定日期是否已成功（重试调度与触发时复查用）
    pub fn succeeded_on(&self, today: NaiveDate) -> bool {
        self.success_today && self.success_date == Some(today)
    }
}
