//! 重试句柄：任意时刻至多一个待触发的重试
//!
//! 新的重试会 abort 旧的；定时器到点后先 claim 自己（从槽里摘下句柄），
//! 之后的 cancel / replace 就不会打断正在运行的任务。

use std::sync::Mutex;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct SlotInner {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

/// 单槽重试句柄
#[derive(Debug, Default)]
pub struct RetrySlot {
    inner: Mutex<SlotInner>,
}

impl RetrySlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预留下一代编号，定时任务拿它在触发时 claim
    pub fn next_generation(&self) -> u64 {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.generation
    }

    /// 放入新句柄并 abort 旧句柄；generation 不是最新时直接 abort 新句柄
    pub fn replace(&self, generation: u64, handle: JoinHandle<()>) {
        let mut inner = self.lock();
        if generation != inner.generation {
            handle.abort();
            return;
        }
        if let Some(old) = inner.pending.replace(handle) {
            old.abort();
            tracing::debug!("Previous retry timer cancelled");
        }
    }

    /// 定时器触发时调用：若槽内仍是自己，则摘下（不 abort）并返回 true
    pub fn claim(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.pending.take();
            true
        } else {
            false
        }
    }

    /// 取消待触发的重试，返回是否真的取消了一个
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        inner.generation += 1;
        match inner.pending.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock()
            .pending
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn arm(slot: &Arc<RetrySlot>, fired: &Arc<AtomicUsize>, after: Duration) {
        let generation = slot.next_generation();
        let slot2 = Arc::clone(slot);
        let fired = Arc::clone(fired);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if slot2.claim(generation) {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        });
        slot.replace(generation, handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_cancels_previous() {
        let slot = Arc::new(RetrySlot::new());
        let fired = Arc::new(AtomicUsize::new(0));

        arm(&slot, &fired, Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(10)).await;
        arm(&slot, &fired, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(55)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let slot = Arc::new(RetrySlot::new());
        let fired = Arc::new(AtomicUsize::new(0));

        arm(&slot, &fired, Duration::from_secs(60));
        assert!(slot.is_pending());
        assert!(slot.cancel());
        assert!(!slot.cancel());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
