use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use arcron_core::{ExecutionRepository, ExecutionStatus, JobDefinition, JobExecution};
use arcron_errors::{ArcronError, ArcronResult};

use crate::executor::{CommandOutcome, CommandRunner};

/// 执行管理器配置
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_concurrent_jobs: usize,
    pub job_queue_size: usize,
    /// 线性退避基数，第 n 次重试等待 n · backoff
    pub retry_backoff: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 10,
            job_queue_size: 100,
            retry_backoff: Duration::from_secs(30),
        }
    }
}

/// 名称到任务定义与执行状态的快照视图
#[derive(Debug, Clone)]
pub struct JobView {
    pub definition: JobDefinition,
    pub status: ExecutionStatus,
}

struct ManagedJob {
    definition: Arc<JobDefinition>,
    status: StdRwLock<ExecutionStatus>,
}

struct RetryRequest {
    job: Arc<JobDefinition>,
    retry_count: u32,
}

/// 执行管理器：在截止时间内运行任务命令，记录执行并驱动重试
///
/// 重试以队列重入队表达：失败的尝试向重试队列投递请求，
/// 专职任务睡过退避后再次调用执行，绝不在失败路径里递归。
pub struct ExecutionManager {
    store: Arc<dyn ExecutionRepository>,
    runner: CommandRunner,
    jobs: StdRwLock<HashMap<String, Arc<ManagedJob>>>,
    retry_tx: mpsc::Sender<RetryRequest>,
    retry_rx: StdMutex<Option<mpsc::Receiver<RetryRequest>>>,
    concurrency: Arc<Semaphore>,
    backoff: Duration,
    stopping: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop_tx: StdMutex<Option<oneshot::Sender<()>>>,
}

impl ExecutionManager {
    pub fn new(store: Arc<dyn ExecutionRepository>, config: ExecutorConfig) -> Self {
        let (retry_tx, retry_rx) = mpsc::channel(config.job_queue_size);
        Self {
            store,
            runner: CommandRunner::new(),
            jobs: StdRwLock::new(HashMap::new()),
            retry_tx,
            retry_rx: StdMutex::new(Some(retry_rx)),
            concurrency: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            backoff: config.retry_backoff,
            stopping: AtomicBool::new(false),
            worker: Mutex::new(None),
            stop_tx: StdMutex::new(None),
        }
    }

    /// 注册任务；名称或命令为空、名称重复时拒绝
    pub fn register(&self, definition: JobDefinition) -> ArcronResult<()> {
        definition.validate()?;

        let mut jobs = self.jobs.write().expect("jobs poisoned");
        if jobs.contains_key(&definition.name) {
            return Err(ArcronError::DuplicateJob {
                name: definition.name,
            });
        }
        let name = definition.name.clone();
        jobs.insert(
            name.clone(),
            Arc::new(ManagedJob {
                definition: Arc::new(definition),
                status: StdRwLock::new(ExecutionStatus::Pending),
            }),
        );
        debug!("任务已注册到执行管理器: {name}");
        Ok(())
    }

    /// 启动重试队列消费循环
    pub async fn start(
        self: Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> ArcronResult<()> {
        let mut retry_rx = self
            .retry_rx
            .lock()
            .expect("retry_rx poisoned")
            .take()
            .ok_or_else(|| ArcronError::AlreadyRunning("执行管理器".to_string()))?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.stop_tx.lock().expect("stop_tx poisoned") = Some(stop_tx);

        let manager = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    maybe = retry_rx.recv() => match maybe {
                        Some(request) => request,
                        None => break,
                    },
                    _ = &mut stop_rx => break,
                    _ = shutdown_rx.recv() => break,
                };

                let delay = manager.backoff * request.retry_count;
                info!(
                    "任务 {} 第 {} 次重试，退避 {:?}",
                    request.job.name, request.retry_count, delay
                );

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = &mut stop_rx => {
                        info!("停止期间放弃任务 {} 的重试", request.job.name);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        info!("关闭期间放弃任务 {} 的重试", request.job.name);
                        break;
                    }
                }

                if manager.stopping.load(Ordering::SeqCst) {
                    break;
                }
                if matches!(
                    manager.status(&request.job.name),
                    Ok(ExecutionStatus::Running)
                ) {
                    warn!("任务 {} 正在运行，跳过本次重试", request.job.name);
                    continue;
                }
                if let Err(e) = manager
                    .execute_attempt(&request.job, request.retry_count)
                    .await
                {
                    error!("任务 {} 重试执行失败: {e}", request.job.name);
                }
            }
            info!("重试队列消费循环已退出");
        });

        *self.worker.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let stop_tx = self.stop_tx.lock().expect("stop_tx poisoned").take();
        if let Some(tx) = stop_tx {
            let _ = tx.send(());
        }
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// 执行一次任务（首次尝试）；返回终态执行记录
    pub async fn execute(&self, name: &str) -> ArcronResult<JobExecution> {
        let job = {
            let jobs = self.jobs.read().expect("jobs poisoned");
            let managed = jobs
                .get(name)
                .ok_or_else(|| ArcronError::job_not_found(name))?;
            Arc::clone(&managed.definition)
        };
        self.execute_attempt(&job, 0).await
    }

    async fn execute_attempt(
        &self,
        job: &Arc<JobDefinition>,
        retry_count: u32,
    ) -> ArcronResult<JobExecution> {
        // 运行中拒绝重入，保证同一任务的尝试互不重叠
        {
            let jobs = self.jobs.read().expect("jobs poisoned");
            let managed = jobs
                .get(&job.name)
                .ok_or_else(|| ArcronError::job_not_found(&job.name))?;
            let mut status = managed.status.write().expect("status poisoned");
            if *status == ExecutionStatus::Running {
                return Err(ArcronError::JobAlreadyRunning {
                    name: job.name.clone(),
                });
            }
            *status = ExecutionStatus::Running;
        }

        let _permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|e| ArcronError::Internal(format!("并发闸关闭: {e}")))?;

        let mut execution = JobExecution::started(&job.name, &job.environment);
        execution.retry_count = retry_count;

        // 起始行写失败不阻止执行
        if let Err(e) = self.store.store_execution(&execution).await {
            warn!("写入执行起始记录失败: {e}");
        }

        info!("执行任务: {} (尝试 {})", job.name, retry_count);

        let outcome = match self.runner.run(job).await {
            Ok(outcome) => outcome,
            Err(e) => CommandOutcome {
                success: false,
                exit_code: None,
                output: String::new(),
                error: Some(e.to_string()),
                timed_out: false,
            },
        };

        let will_retry = !outcome.success
            && retry_count < job.retries
            && !self.stopping.load(Ordering::SeqCst);

        let final_status = if outcome.success {
            ExecutionStatus::Completed
        } else if will_retry {
            ExecutionStatus::Retrying
        } else {
            ExecutionStatus::Failed
        };

        execution.finish(
            final_status,
            outcome.exit_code,
            outcome.output,
            outcome.error.clone(),
        );

        self.set_status(&job.name, final_status);

        if outcome.success {
            info!(
                "任务 {} 执行成功，耗时 {:.2} 秒",
                job.name, execution.duration_seconds
            );
        } else {
            error!(
                "任务 {} 执行失败: {}",
                job.name,
                outcome.error.as_deref().unwrap_or("unknown")
            );
        }

        // 终态行写失败上抛给调用方
        self.store.store_execution(&execution).await?;

        if will_retry {
            let request = RetryRequest {
                job: Arc::clone(job),
                retry_count: retry_count + 1,
            };
            if self.retry_tx.try_send(request).is_err() {
                warn!("重试队列已满，放弃任务 {} 的重试", job.name);
            }
        }

        Ok(execution)
    }

    fn set_status(&self, name: &str, status: ExecutionStatus) {
        if let Some(managed) = self.jobs.read().expect("jobs poisoned").get(name) {
            *managed.status.write().expect("status poisoned") = status;
        }
    }

    pub fn status(&self, name: &str) -> ArcronResult<ExecutionStatus> {
        let jobs = self.jobs.read().expect("jobs poisoned");
        let managed = jobs
            .get(name)
            .ok_or_else(|| ArcronError::job_not_found(name))?;
        let status = *managed.status.read().expect("status poisoned");
        Ok(status)
    }

    pub fn get_definition(&self, name: &str) -> Option<Arc<JobDefinition>> {
        self.jobs
            .read()
            .expect("jobs poisoned")
            .get(name)
            .map(|managed| Arc::clone(&managed.definition))
    }

    pub fn list_all(&self) -> Vec<JobView> {
        let jobs = self.jobs.read().expect("jobs poisoned");
        let mut views: Vec<JobView> = jobs
            .values()
            .map(|managed| JobView {
                definition: (*managed.definition).clone(),
                status: *managed.status.read().expect("status poisoned"),
            })
            .collect();
        views.sort_by(|a, b| a.definition.name.cmp(&b.definition.name));
        views
    }

    pub async fn history(&self, name: &str, limit: i64) -> ArcronResult<Vec<JobExecution>> {
        self.store.get_executions(name, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;

    /// 记录所有写入的内存仓库，按 id upsert 并保留写入顺序
    struct RecordingStore {
        rows: StdMutex<StdHashMap<String, JobExecution>>,
        writes: StdMutex<Vec<JobExecution>>,
    }

    impl RecordingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                rows: StdMutex::new(StdHashMap::new()),
                writes: StdMutex::new(Vec::new()),
            })
        }

        fn terminal_rows(&self) -> Vec<JobExecution> {
            let mut rows: Vec<JobExecution> = self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|e| e.end_time.is_some())
                .cloned()
                .collect();
            rows.sort_by_key(|e| e.start_time);
            rows
        }
    }

    #[async_trait]
    impl ExecutionRepository for RecordingStore {
        async fn store_execution(&self, execution: &JobExecution) -> ArcronResult<()> {
            self.rows
                .lock()
                .unwrap()
                .insert(execution.id.clone(), execution.clone());
            self.writes.lock().unwrap().push(execution.clone());
            Ok(())
        }

        async fn get_executions(
            &self,
            job_name: &str,
            limit: i64,
        ) -> ArcronResult<Vec<JobExecution>> {
            let mut rows: Vec<JobExecution> = self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|e| e.job_name == job_name)
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
            rows.truncate(limit as usize);
            Ok(rows)
        }

        async fn get_job_stats(&self, _job_name: &str) -> ArcronResult<arcron_core::JobStats> {
            Ok(arcron_core::JobStats::default())
        }
    }

    fn job(name: &str, command: &str, retries: u32) -> JobDefinition {
        JobDefinition {
            name: name.to_string(),
            command: command.to_string(),
            job_type: arcron_core::JobType::Light,
            schedule: "0 0 * * * *".to_string(),
            timeout_seconds: 10,
            retries,
            environment: StdHashMap::new(),
            priority: 0,
        }
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            max_concurrent_jobs: 4,
            job_queue_size: 16,
            retry_backoff: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_empty() {
        let manager = ExecutionManager::new(RecordingStore::new(), fast_config());
        manager.register(job("a", "true", 0)).unwrap();
        assert!(matches!(
            manager.register(job("a", "true", 0)),
            Err(ArcronError::DuplicateJob { .. })
        ));
        assert!(manager.register(job("", "true", 0)).is_err());
        assert!(manager.register(job("b", "", 0)).is_err());
    }

    #[tokio::test]
    async fn test_execute_records_start_and_terminal_rows() {
        let store = RecordingStore::new();
        let manager = ExecutionManager::new(Arc::clone(&store) as Arc<dyn ExecutionRepository>, fast_config());
        manager.register(job("hello", "echo hi", 0)).unwrap();

        let execution = manager.execute("hello").await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.exit_code, Some(0));
        assert!(execution.output.contains("hi"));

        let writes = store.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].status, ExecutionStatus::Running);
        assert_eq!(writes[0].id, writes[1].id);
        assert_eq!(writes[1].status, ExecutionStatus::Completed);

        assert_eq!(manager.status("hello").unwrap(), ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_retry_chain_orders_attempts() {
        let store = RecordingStore::new();
        let manager = Arc::new(ExecutionManager::new(
            Arc::clone(&store) as Arc<dyn ExecutionRepository>,
            fast_config(),
        ));
        manager.register(job("flaky", "false", 2)).unwrap();

        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::clone(&manager).start(shutdown_tx.subscribe()).await.unwrap();

        let first = manager.execute("flaky").await.unwrap();
        assert_eq!(first.status, ExecutionStatus::Retrying);
        assert_eq!(first.retry_count, 0);

        // 等重试链跑完：退避 100ms + 200ms
        tokio::time::sleep(Duration::from_millis(800)).await;

        let rows = store.terminal_rows();
        assert_eq!(rows.len(), 3);
        let ordinals: Vec<u32> = rows.iter().map(|e| e.retry_count).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(rows[2].status, ExecutionStatus::Failed);
        assert!(rows[0].start_time < rows[1].start_time);
        assert!(rows[1].start_time < rows[2].start_time);

        // 尝试之间至少间隔对应的退避
        let gap1 = (rows[1].start_time - rows[0].start_time).num_milliseconds();
        let gap2 = (rows[2].start_time - rows[1].start_time).num_milliseconds();
        assert!(gap1 >= 100);
        assert!(gap2 >= 200);

        assert_eq!(manager.status("flaky").unwrap(), ExecutionStatus::Failed);
        manager.stop().await;
    }

    #[tokio::test]
    async fn test_reentry_while_running_is_refused() {
        let store = RecordingStore::new();
        let manager = Arc::new(ExecutionManager::new(
            Arc::clone(&store) as Arc<dyn ExecutionRepository>,
            fast_config(),
        ));
        manager.register(job("slow", "sleep 2", 0)).unwrap();

        let background = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.execute("slow").await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = manager.execute("slow").await.unwrap_err();
        assert!(matches!(err, ArcronError::JobAlreadyRunning { .. }));

        background.abort();
    }

    #[tokio::test]
    async fn test_history_returns_most_recent_first() {
        let store = RecordingStore::new();
        let manager = ExecutionManager::new(Arc::clone(&store) as Arc<dyn ExecutionRepository>, fast_config());
        manager.register(job("h", "echo 1", 0)).unwrap();

        manager.execute("h").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.execute("h").await.unwrap();

        let history = manager.history("h", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].start_time >= history[1].start_time);
    }
}
