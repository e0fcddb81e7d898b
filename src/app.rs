use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::time::interval;
use tracing::{error, info, warn};

use arcron_api::ApiState;
use arcron_config::AppConfig;
use arcron_core::{AdvisoryRepository, ExecutionRepository, MetricsRepository};
use arcron_dispatcher::{PredictiveScheduler, SchedulerConfig};
use arcron_infrastructure::{
    DatabaseManager, SqliteAdvisoryRepository, SqliteExecutionRepository, SqliteMetricsRepository,
    SystemMonitor,
};
use arcron_ml::{AdvisoryEngine, AnomalyDetector, LoadForecaster, SeasonalityDetector};
use arcron_worker::{ExecutionManager, ExecutorConfig};

use crate::shutdown::ShutdownManager;

/// 异常巡检周期
const ANOMALY_CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// 保留清理周期
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// 主应用：装配核心组件并驱动其生命周期
pub struct Application {
    config: AppConfig,
    db: Arc<DatabaseManager>,
    execution_repo: Arc<dyn ExecutionRepository>,
    metrics_repo: Arc<dyn MetricsRepository>,
    monitor: Arc<SystemMonitor>,
    engine: Arc<AdvisoryEngine>,
    executor: Arc<ExecutionManager>,
    scheduler: Arc<PredictiveScheduler>,
    seasonality: Arc<SeasonalityDetector>,
    anomaly: Arc<AnomalyDetector>,
    forecaster: Arc<LoadForecaster>,
    started_at: Instant,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用，任务数 {}", config.jobs.len());

        // 存储初始化失败视为致命
        let db = Arc::new(
            DatabaseManager::new(&config.database)
                .await
                .context("初始化存储失败")?,
        );

        let execution_repo: Arc<dyn ExecutionRepository> =
            Arc::new(SqliteExecutionRepository::new(db.pool().clone()));
        let metrics_repo: Arc<dyn MetricsRepository> =
            Arc::new(SqliteMetricsRepository::new(db.pool().clone()));
        let advisory_repo: Arc<dyn AdvisoryRepository> =
            Arc::new(SqliteAdvisoryRepository::new(db.pool().clone()));

        let monitor = Arc::new(SystemMonitor::new(Duration::from_secs(
            config.advanced.metrics_interval_seconds,
        )));
        let engine = Arc::new(AdvisoryEngine::new(Duration::from_secs(
            config.ml.update_interval_hours * 3600,
        )));

        let executor = Arc::new(ExecutionManager::new(
            Arc::clone(&execution_repo),
            ExecutorConfig {
                max_concurrent_jobs: config.advanced.max_concurrent_jobs,
                job_queue_size: config.advanced.job_queue_size,
                ..ExecutorConfig::default()
            },
        ));
        for job in &config.jobs {
            executor
                .register(job.clone())
                .with_context(|| format!("注册任务 {} 失败", job.name))?;
        }

        let scheduler = PredictiveScheduler::new(
            SchedulerConfig::default(),
            config.jobs.clone(),
            Arc::clone(&executor),
            Arc::clone(&engine),
            Arc::clone(&monitor),
            Some(Arc::clone(&advisory_repo)),
        );

        let seasonality = Arc::new(SeasonalityDetector::new(Arc::clone(&metrics_repo)));
        let anomaly = Arc::new(AnomalyDetector::new(Arc::clone(&metrics_repo)));
        let forecaster = Arc::new(LoadForecaster::new(Arc::clone(&metrics_repo)));

        Ok(Self {
            config,
            db,
            execution_repo,
            metrics_repo,
            monitor,
            engine,
            executor,
            scheduler,
            seasonality,
            anomaly,
            forecaster,
            started_at: Instant::now(),
        })
    }

    /// 启动全部组件并阻塞到关闭信号；随后按依赖逆序停机
    pub async fn run(&self, shutdown: &ShutdownManager) -> Result<()> {
        self.monitor
            .start(shutdown.subscribe().await)
            .await
            .context("启动系统监控失败")?;
        self.engine
            .start(shutdown.subscribe().await)
            .await
            .context("启动建议引擎失败")?;
        Arc::clone(&self.executor)
            .start(shutdown.subscribe().await)
            .await
            .context("启动执行管理器失败")?;
        self.scheduler
            .start(shutdown.subscribe().await)
            .await
            .context("启动调度器失败")?;

        self.spawn_metrics_pump(shutdown).await;
        self.spawn_anomaly_watch(shutdown).await;
        self.spawn_retention_sweep(shutdown).await;

        let api_state = ApiState {
            scheduler: Arc::clone(&self.scheduler),
            executor: Arc::clone(&self.executor),
            engine: Arc::clone(&self.engine),
            monitor: Arc::clone(&self.monitor),
            execution_store: Arc::clone(&self.execution_repo),
            metrics_store: Arc::clone(&self.metrics_repo),
            seasonality: Arc::clone(&self.seasonality),
            anomaly: Arc::clone(&self.anomaly),
            forecaster: Arc::clone(&self.forecaster),
            started_at: self.started_at,
        };
        let addr: SocketAddr = format!(
            "{}:{}",
            resolve_host(&self.config.server.host),
            self.config.server.port
        )
        .parse()
        .context("解析API监听地址失败")?;
        let api_shutdown = shutdown.subscribe().await;
        let api_handle = tokio::spawn(async move {
            if let Err(e) = arcron_api::serve(api_state, addr, api_shutdown).await {
                error!("API服务退出: {e}");
            }
        });

        info!("全部组件已启动");

        let mut shutdown_rx = shutdown.subscribe().await;
        let _ = shutdown_rx.recv().await;

        info!("开始停机");
        self.scheduler.stop().await;
        self.executor.stop().await;
        self.engine.stop().await;
        self.monitor.stop().await;
        let _ = api_handle.await;
        self.db.close().await;
        info!("停机完成");
        Ok(())
    }

    /// 把采样流灌入存储；写失败记日志后丢弃该快照
    async fn spawn_metrics_pump(&self, shutdown: &ShutdownManager) {
        let Some(mut stream) = self.monitor.take_stream() else {
            warn!("指标流已被占用，跳过持久化泵");
            return;
        };
        let metrics_repo = Arc::clone(&self.metrics_repo);
        let mut shutdown_rx = shutdown.subscribe().await;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = stream.recv() => match maybe {
                        Some(metrics) => {
                            if let Err(e) = metrics_repo.store_metrics(&metrics).await {
                                warn!("写入指标快照失败: {e}");
                            }
                        }
                        None => break,
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("指标持久化泵已退出");
        });
    }

    /// 周期性对照基线巡检最新快照，异常记入日志供告警协作方消费
    async fn spawn_anomaly_watch(&self, shutdown: &ShutdownManager) {
        let anomaly = Arc::clone(&self.anomaly);
        let monitor = Arc::clone(&self.monitor);
        let mut shutdown_rx = shutdown.subscribe().await;
        tokio::spawn(async move {
            let mut ticker = interval(ANOMALY_CHECK_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(metrics) = monitor.latest() else { continue };
                        match anomaly.detect(&metrics).await {
                            Ok(anomalies) => {
                                for a in anomalies {
                                    warn!(
                                        "检测到异常: channel={} severity={} {}",
                                        a.channel,
                                        a.severity.as_str(),
                                        a.description
                                    );
                                }
                            }
                            Err(e) => warn!("异常检测失败: {e}"),
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("异常巡检已退出");
        });
    }

    /// 周期性删除超过保留窗口的历史行
    async fn spawn_retention_sweep(&self, shutdown: &ShutdownManager) {
        let db = Arc::clone(&self.db);
        let cleanup_after = chrono::Duration::hours(self.config.advanced.cleanup_after_hours as i64);
        let mut shutdown_rx = shutdown.subscribe().await;
        tokio::spawn(async move {
            let mut ticker = interval(RETENTION_SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = db.retention_sweep(cleanup_after).await {
                            warn!("保留清理失败: {e}");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("保留清理循环已退出");
        });
    }
}

/// "localhost" 直接交给解析器会落到DNS，这里固定为回环地址
fn resolve_host(host: &str) -> &str {
    if host == "localhost" {
        "127.0.0.1"
    } else {
        host
    }
}
