use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::debug;

use arcron_core::CronSchedule;

/// 定时轮条目句柄，对调用方不透明
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(u64);

pub type FireCallback =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// 定时轮：每个条目一个 tokio 任务，在到点时执行回调
///
/// 条目一律为一次性触发；到点后的续排由调用方负责。
/// 回调各自运行在独立任务上，天然支持并发触发。
pub struct CronWheel {
    entries: Mutex<HashMap<EntryId, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl CronWheel {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 在 schedule 的下一次触发时间安排一次性触发；无下次触发时间返回 None
    pub fn add_next_occurrence(
        &self,
        schedule: &CronSchedule,
        callback: FireCallback,
    ) -> Option<(EntryId, chrono::DateTime<Utc>)> {
        let next = schedule.upcoming()?;
        let delay = (next - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(0));
        let id = self.add_after(delay, callback);
        Some((id, next))
    }

    /// 延迟 delay 后触发一次
    pub fn add_after(&self, delay: Duration, callback: FireCallback) -> EntryId {
        let id = EntryId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback().await;
        });
        self.entries.lock().expect("entries poisoned").insert(id, handle);
        debug!("定时轮新增条目 {:?}，延迟 {:?}", id, delay);
        id
    }

    /// 取消并移除条目；条目不存在时无操作
    pub fn remove(&self, id: EntryId) {
        if let Some(handle) = self.entries.lock().expect("entries poisoned").remove(&id) {
            handle.abort();
            debug!("定时轮移除条目 {:?}", id);
        }
    }

    /// 仅从注册表摘除，不中止任务
    ///
    /// 触发回调内部续排时使用：此刻旧条目任务正是当前调用栈所在的任务。
    pub fn forget(&self, id: EntryId) {
        self.entries.lock().expect("entries poisoned").remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("entries poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 中止所有条目
    pub fn stop(&self) {
        let mut entries = self.entries.lock().expect("entries poisoned");
        for (_, handle) in entries.drain() {
            handle.abort();
        }
    }
}

impl Default for CronWheel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback(counter: Arc<AtomicUsize>) -> FireCallback {
        Arc::new(move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn test_one_shot_fires_exactly_once() {
        let wheel = CronWheel::new();
        let counter = Arc::new(AtomicUsize::new(0));
        wheel.add_after(Duration::from_millis(20), counting_callback(Arc::clone(&counter)));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_cancels_pending_entry() {
        let wheel = CronWheel::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = wheel.add_after(Duration::from_millis(50), counting_callback(Arc::clone(&counter)));
        wheel.remove(id);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(wheel.is_empty());
    }

    #[tokio::test]
    async fn test_forget_keeps_task_alive() {
        let wheel = CronWheel::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = wheel.add_after(Duration::from_millis(50), counting_callback(Arc::clone(&counter)));
        wheel.forget(id);
        assert!(wheel.is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_aborts_all_entries() {
        let wheel = CronWheel::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            wheel.add_after(Duration::from_millis(50), counting_callback(Arc::clone(&counter)));
        }
        wheel.stop();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_next_occurrence_schedules_future_instant() {
        let wheel = CronWheel::new();
        let schedule = CronSchedule::parse("* * * * * *").unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let (_, next) = wheel
            .add_next_occurrence(&schedule, counting_callback(Arc::clone(&counter)))
            .unwrap();
        assert!(next > Utc::now());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
