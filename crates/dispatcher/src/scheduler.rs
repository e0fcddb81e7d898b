use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use arcron_core::{
    Advisory, AdvisoryRepository, CronSchedule, ExecutionStatus, JobDefinition, JobType,
};
use arcron_errors::{ArcronError, ArcronResult};
use arcron_infrastructure::SystemMonitor;
use arcron_ml::AdvisoryEngine;
use arcron_worker::ExecutionManager;

use crate::wheel::{CronWheel, EntryId, FireCallback};

/// 调度器参数
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// 调整循环周期
    pub adjustment_interval: Duration,
    /// 建议生效所需的最低置信度
    pub min_confidence: f64,
    /// 建议生效所需的最小偏移（秒），严格大于
    pub min_shift_seconds: i64,
    /// 调整后触发延迟下限（秒）
    pub min_delay_seconds: u64,
    /// 停止时等待在途触发的宽限
    pub stop_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            adjustment_interval: Duration::from_secs(60),
            min_confidence: 0.3,
            min_shift_seconds: 5 * 60,
            min_delay_seconds: 60,
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// 被调度任务的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Adjusted,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Scheduled => "scheduled",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Adjusted => "adjusted",
        }
    }
}

struct ScheduledJob {
    definition: Arc<JobDefinition>,
    schedule: CronSchedule,
    entry: Option<EntryId>,
    next_fire: DateTime<Utc>,
    last_fire: Option<DateTime<Utc>>,
    run_count: u64,
    state: JobState,
    advisory: Option<Advisory>,
}

/// 单任务状态视图
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub state: JobState,
    pub next_fire: DateTime<Utc>,
    pub last_fire: Option<DateTime<Utc>>,
    pub run_count: u64,
}

/// 聚合状态视图
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub jobs_count: usize,
    pub jobs: BTreeMap<String, JobStatusView>,
}

/// 含当前建议的单任务详情
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    pub name: String,
    pub schedule: String,
    pub job_type: String,
    pub state: JobState,
    pub next_fire: DateTime<Utc>,
    pub last_fire: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub advisory: Option<Advisory>,
}

/// 预测调度器
///
/// 按基线CRON触发任务；两次触发之间由调整循环消费建议引擎的
/// 输出，通过闸门检查后把下一次触发挪向低负载时刻。每次触发后
/// 一律回到基线表达式续排，建议只影响最近的一次触发。
pub struct PredictiveScheduler {
    config: SchedulerConfig,
    definitions: Vec<JobDefinition>,
    executor: Arc<ExecutionManager>,
    engine: Arc<AdvisoryEngine>,
    monitor: Arc<SystemMonitor>,
    advisory_store: Option<Arc<dyn AdvisoryRepository>>,
    wheel: CronWheel,
    jobs: StdRwLock<HashMap<String, ScheduledJob>>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop_tx: StdMutex<Option<oneshot::Sender<()>>>,
    /// 触发回调经由弱引用回到调度器，避免条目与调度器互相持有
    weak_self: Weak<PredictiveScheduler>,
}

impl PredictiveScheduler {
    pub fn new(
        config: SchedulerConfig,
        definitions: Vec<JobDefinition>,
        executor: Arc<ExecutionManager>,
        engine: Arc<AdvisoryEngine>,
        monitor: Arc<SystemMonitor>,
        advisory_store: Option<Arc<dyn AdvisoryRepository>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            config,
            definitions,
            executor,
            engine,
            monitor,
            advisory_store,
            wheel: CronWheel::new(),
            jobs: StdRwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
            stop_tx: StdMutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// 把全部配置任务装入定时轮并启动调整循环；初始排班完成后返回
    pub async fn start(&self, mut shutdown_rx: broadcast::Receiver<()>) -> ArcronResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ArcronError::AlreadyRunning("调度器".to_string()));
        }

        info!("启动预测调度器");

        let definitions = self.definitions.clone();
        let mut scheduled = 0usize;
        for definition in definitions {
            match self.schedule_job(definition) {
                Ok(()) => scheduled += 1,
                Err(e) => error!("任务排班失败: {e}"),
            }
        }
        info!("已排班 {scheduled} 个任务");

        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.stop_tx.lock().expect("stop_tx poisoned") = Some(stop_tx);

        let weak = self.weak_self.clone();
        let adjustment_interval = self.config.adjustment_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = interval(adjustment_interval);
            // 首个 tick 立即完成，跳过
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(scheduler) = weak.upgrade() else { break };
                        scheduler.adjust_schedules().await;
                    }
                    _ = &mut stop_rx => break,
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("调整循环已退出");
        });
        *self.worker.lock().await = Some(handle);

        Ok(())
    }

    /// 停止：取消调整循环，等待在途触发收尾，随后清空定时轮
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("停止预测调度器");

        let stop_tx = self.stop_tx.lock().expect("stop_tx poisoned").take();
        if let Some(tx) = stop_tx {
            let _ = tx.send(());
        }
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }

        let deadline = tokio::time::Instant::now() + self.config.stop_grace;
        loop {
            let any_running = {
                let jobs = self.jobs.read().expect("jobs poisoned");
                jobs.values().any(|job| job.state == JobState::Running)
            };
            if !any_running || tokio::time::Instant::now() >= deadline {
                if any_running {
                    warn!("等待在途触发超时，强制停止");
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        self.wheel.stop();
    }

    fn schedule_job(&self, definition: JobDefinition) -> ArcronResult<()> {
        let name = definition.name.clone();
        let schedule = CronSchedule::parse(&definition.schedule)?;
        let callback = self.fire_callback(&name);
        let (entry, next_fire) = self
            .wheel
            .add_next_occurrence(&schedule, callback)
            .ok_or_else(|| {
                ArcronError::Scheduling(format!("任务 {name} 没有下一次触发时间"))
            })?;

        let mut jobs = self.jobs.write().expect("jobs poisoned");
        jobs.insert(
            name.clone(),
            ScheduledJob {
                definition: Arc::new(definition),
                schedule,
                entry: Some(entry),
                next_fire,
                last_fire: None,
                run_count: 0,
                state: JobState::Scheduled,
                advisory: None,
            },
        );
        info!("任务已排班: {name}，下次触发 {next_fire}");
        Ok(())
    }

    fn fire_callback(&self, name: &str) -> FireCallback {
        let weak = self.weak_self.clone();
        let name = name.to_string();
        Arc::new(move || {
            let weak = weak.clone();
            let name = name.clone();
            Box::pin(async move {
                if let Some(scheduler) = weak.upgrade() {
                    scheduler.fire(&name).await;
                }
            })
        })
    }

    /// 一次触发：执行任务并按基线表达式续排
    async fn fire(&self, name: &str) {
        {
            let mut jobs = self.jobs.write().expect("jobs poisoned");
            let Some(job) = jobs.get_mut(name) else {
                return;
            };
            if job.state == JobState::Running {
                warn!("任务 {name} 正在运行，跳过本次触发");
                return;
            }
            // 触发回调运行在旧条目自身的任务上，只摘除注册不 abort
            if let Some(entry) = job.entry.take() {
                self.wheel.forget(entry);
            }
            job.state = JobState::Running;
            job.last_fire = Some(Utc::now());
        }

        info!("触发任务: {name}");
        let result = self.executor.execute(name).await;

        let success = match &result {
            Ok(record) => record.status == ExecutionStatus::Completed,
            Err(_) => false,
        };
        match &result {
            Ok(record) if !success => {
                error!(
                    "任务 {name} 触发失败: {}",
                    record.error.as_deref().unwrap_or("unknown")
                );
            }
            Err(e) => error!("任务 {name} 触发失败: {e}"),
            _ => {}
        }

        {
            let mut jobs = self.jobs.write().expect("jobs poisoned");
            if let Some(job) = jobs.get_mut(name) {
                if success {
                    job.state = JobState::Completed;
                    job.run_count += 1;
                } else {
                    job.state = JobState::Failed;
                }
            }
        }

        self.reschedule(name);
    }

    /// 触发后续排：一律回到基线CRON表达式
    fn reschedule(&self, name: &str) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let mut jobs = self.jobs.write().expect("jobs poisoned");
        let Some(job) = jobs.get_mut(name) else {
            return;
        };
        if let Some(old) = job.entry.take() {
            self.wheel.remove(old);
        }
        let callback = self.fire_callback(name);
        match self.wheel.add_next_occurrence(&job.schedule, callback) {
            Some((entry, next_fire)) => {
                job.entry = Some(entry);
                job.next_fire = next_fire;
                job.state = JobState::Scheduled;
                debug!("任务 {name} 已续排，下次触发 {next_fire}");
            }
            None => {
                error!("任务 {name} 续排失败：没有下一次触发时间");
            }
        }
    }

    /// 调整循环的一次迭代：为每个非运行中任务取建议并按闸门调整
    async fn adjust_schedules(&self) {
        let Some(metrics) = self.monitor.latest() else {
            debug!("暂无指标快照，跳过调度调整");
            return;
        };

        let candidates: Vec<(String, JobType)> = {
            let jobs = self.jobs.read().expect("jobs poisoned");
            jobs.values()
                .filter(|job| job.state != JobState::Running)
                .map(|job| (job.definition.name.clone(), job.definition.job_type.clone()))
                .collect()
        };

        for (name, job_type) in candidates {
            let advisory = self.engine.predict(&name, &job_type, &metrics);

            if let Some(store) = &self.advisory_store {
                if let Err(e) = store.store_advisory(&advisory).await {
                    debug!("写入建议记录失败: {e}");
                }
            }

            let mut jobs = self.jobs.write().expect("jobs poisoned");
            let Some(job) = jobs.get_mut(&name) else {
                continue;
            };
            if job.state == JobState::Running {
                continue;
            }
            job.advisory = Some(advisory.clone());

            if !should_adjust(
                advisory.confidence,
                advisory.optimal_time,
                job.next_fire,
                &self.config,
            ) {
                continue;
            }

            // 一次性条目挪到建议时刻；触发后的续排会回到基线
            let now = Utc::now();
            let delay_seconds = (advisory.optimal_time - now)
                .num_seconds()
                .max(self.config.min_delay_seconds as i64) as u64;
            if let Some(old) = job.entry.take() {
                self.wheel.remove(old);
            }
            let entry = self
                .wheel
                .add_after(Duration::from_secs(delay_seconds), self.fire_callback(&name));
            job.entry = Some(entry);
            job.next_fire = now + chrono::Duration::seconds(delay_seconds as i64);
            job.state = JobState::Adjusted;

            info!(
                "任务 {name} 调整到 {}（原因: {}）",
                job.next_fire, advisory.reasoning
            );
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let jobs = self.jobs.read().expect("jobs poisoned");
        let views = jobs
            .iter()
            .map(|(name, job)| {
                (
                    name.clone(),
                    JobStatusView {
                        state: job.state,
                        next_fire: job.next_fire,
                        last_fire: job.last_fire,
                        run_count: job.run_count,
                    },
                )
            })
            .collect();
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            jobs_count: jobs.len(),
            jobs: views,
        }
    }

    pub fn job_status(&self, name: &str) -> Option<JobDetail> {
        let jobs = self.jobs.read().expect("jobs poisoned");
        jobs.get(name).map(|job| JobDetail {
            name: job.definition.name.clone(),
            schedule: job.definition.schedule.clone(),
            job_type: job.definition.job_type.as_str().to_string(),
            state: job.state,
            next_fire: job.next_fire,
            last_fire: job.last_fire,
            run_count: job.run_count,
            advisory: job.advisory.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// 调整闸门：置信度达标且建议时刻偏离下次触发超过阈值
fn should_adjust(
    confidence: f64,
    optimal_time: DateTime<Utc>,
    next_fire: DateTime<Utc>,
    config: &SchedulerConfig,
) -> bool {
    if confidence < config.min_confidence {
        return false;
    }
    let shift = (optimal_time - next_fire).num_seconds().abs();
    shift > config.min_shift_seconds
}
