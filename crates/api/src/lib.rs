//! HTTP API 服务
//!
//! 核心组件的类型化状态记录在这里翻译为线格式。
//! WebSocket、仪表盘静态资源与 Prometheus 暴露不在本层范围。

pub mod handlers;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use arcron_core::{ExecutionRepository, MetricsRepository};
use arcron_dispatcher::PredictiveScheduler;
use arcron_errors::{ArcronError, ArcronResult};
use arcron_infrastructure::SystemMonitor;
use arcron_ml::{AdvisoryEngine, AnomalyDetector, LoadForecaster, SeasonalityDetector};
use arcron_worker::ExecutionManager;

/// 路由共享状态
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<PredictiveScheduler>,
    pub executor: Arc<ExecutionManager>,
    pub engine: Arc<AdvisoryEngine>,
    pub monitor: Arc<SystemMonitor>,
    pub execution_store: Arc<dyn ExecutionRepository>,
    pub metrics_store: Arc<dyn MetricsRepository>,
    pub seasonality: Arc<SeasonalityDetector>,
    pub anomaly: Arc<AnomalyDetector>,
    pub forecaster: Arc<LoadForecaster>,
    /// 进程启动时刻，uptime 的基准
    pub started_at: Instant,
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/scheduler/status", get(handlers::scheduler_status))
        .route(
            "/api/v1/scheduler/jobs/:name/status",
            get(handlers::scheduler_job_status),
        )
        .route("/api/v1/jobs", get(handlers::list_jobs))
        .route("/api/v1/jobs/:name/executions", get(handlers::job_executions))
        .route("/api/v1/jobs/:name/statistics", get(handlers::job_statistics))
        .route("/api/v1/metrics", get(handlers::query_metrics))
        .route("/api/v1/metrics/realtime", get(handlers::realtime_metrics))
        .route("/api/v1/ml/status", get(handlers::ml_status))
        .route("/api/v1/ml/predict/:name", get(handlers::ml_predict))
        .route("/api/v1/ml/seasonality/:name", get(handlers::ml_seasonality))
        .route("/api/v1/ml/anomalies", get(handlers::ml_anomalies))
        .route("/api/v1/ml/forecast", get(handlers::ml_forecast))
        .with_state(state)
}

/// 启动HTTP服务，收到关闭信号后优雅退出
pub async fn serve(
    state: ApiState,
    addr: SocketAddr,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> ArcronResult<()> {
    let router = create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ArcronError::Internal(format!("绑定 {addr} 失败: {e}")))?;

    info!("API服务监听 {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
        .map_err(|e| ArcronError::Internal(format!("API服务异常退出: {e}")))
}
