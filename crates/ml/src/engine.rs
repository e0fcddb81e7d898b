use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use arcron_core::{Advisory, JobType, SystemMetrics};
use arcron_errors::{ArcronError, ArcronResult};

/// 特征槽位数：CPU、内存、磁盘MB、网络MB、load1、时、星期、偏置
pub const FEATURE_COUNT: usize = 8;

/// 基线权重：负载特征取负（偏好更低负载），时间特征置零
const BASELINE_WEIGHTS: [f64; FEATURE_COUNT] = [-0.1, -0.1, -0.05, -0.05, -0.1, 0.0, 0.0, 0.0];

#[derive(Debug, Clone)]
struct LinearModel {
    weights: [f64; FEATURE_COUNT],
    trained: bool,
}

impl LinearModel {
    fn untrained() -> Self {
        Self {
            weights: [0.0; FEATURE_COUNT],
            trained: false,
        }
    }

    /// 延迟分钟数 = sigmoid(Σ wᵢ·fᵢ) · 60
    fn predict_delay_minutes(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let score: f64 = features
            .iter()
            .zip(self.weights.iter())
            .map(|(f, w)| f * w)
            .sum();
        sigmoid(score) * 60.0
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// 引擎状态视图
#[derive(Debug, Clone, Serialize)]
pub struct MlStatus {
    pub running: bool,
    pub model_trained: bool,
    pub last_training: Option<DateTime<Utc>>,
    pub features: usize,
}

/// 建议引擎：由当前快照产出每任务的调度建议
pub struct AdvisoryEngine {
    update_interval: Duration,
    model: Arc<RwLock<LinearModel>>,
    last_training: Arc<RwLock<Option<DateTime<Utc>>>>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop_tx: StdMutex<Option<oneshot::Sender<()>>>,
}

impl AdvisoryEngine {
    pub fn new(update_interval: Duration) -> Self {
        Self {
            update_interval,
            model: Arc::new(RwLock::new(LinearModel::untrained())),
            last_training: Arc::new(RwLock::new(None)),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
            stop_tx: StdMutex::new(None),
        }
    }

    /// 启动周期性重训练钩子；已在运行时返回错误
    pub async fn start(&self, mut shutdown_rx: broadcast::Receiver<()>) -> ArcronResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ArcronError::AlreadyRunning("建议引擎".to_string()));
        }

        info!("启动建议引擎，重训练间隔 {:?}", self.update_interval);

        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.stop_tx.lock().expect("stop_tx poisoned") = Some(stop_tx);

        let update_interval = self.update_interval;
        let model = Arc::clone(&self.model);
        let last_training = Arc::clone(&self.last_training);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(update_interval);
            // 首个 tick 立即完成，跳过以避免启动即重训练
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = train_model(&model, &last_training) {
                            warn!("模型重训练失败: {e}");
                        }
                    }
                    _ = &mut stop_rx => break,
                    _ = shutdown_rx.recv() => break,
                }
            }
            info!("建议引擎已停止");
        });

        *self.worker.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) {
        let stop_tx = self.stop_tx.lock().expect("stop_tx poisoned").take();
        if let Some(tx) = stop_tx {
            let _ = tx.send(());
        }
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// 重训练：未安装权重时装入基线向量，并刷新 last_training
    pub fn train(&self) -> ArcronResult<()> {
        train_model(&self.model, &self.last_training)
    }

    /// 直接安装权重向量并标记已训练
    pub fn install_weights(&self, weights: [f64; FEATURE_COUNT]) {
        let mut model = self.model.write().expect("model poisoned");
        model.weights = weights;
        model.trained = true;
    }

    pub fn is_trained(&self) -> bool {
        self.model.read().expect("model poisoned").trained
    }

    /// 产出调度建议；除调试日志外无副作用
    pub fn predict(
        &self,
        job_name: &str,
        job_type: &JobType,
        metrics: &SystemMetrics,
    ) -> Advisory {
        let model = self.model.read().expect("model poisoned");
        if model.trained {
            let features = extract_features(metrics, Utc::now());
            let delay_minutes = model.predict_delay_minutes(&features);
            debug!(
                "线性模型预测: job={job_name} delay={delay_minutes:.1}min"
            );
            Advisory {
                job_name: job_name.to_string(),
                optimal_time: Utc::now() + chrono::Duration::seconds((delay_minutes * 60.0) as i64),
                confidence: 0.7,
                reasoning: format!("Linear model prediction over {FEATURE_COUNT} features"),
                expected_load: delay_minutes,
            }
        } else {
            predict_with_heuristics(job_name, job_type, metrics)
        }
    }

    pub fn status(&self) -> MlStatus {
        MlStatus {
            running: self.running.load(Ordering::SeqCst),
            model_trained: self.is_trained(),
            last_training: *self.last_training.read().expect("last_training poisoned"),
            features: FEATURE_COUNT,
        }
    }
}

fn train_model(
    model: &RwLock<LinearModel>,
    last_training: &RwLock<Option<DateTime<Utc>>>,
) -> ArcronResult<()> {
    debug!("执行模型重训练");
    {
        let mut model = model.write().expect("model poisoned");
        if !model.trained {
            model.weights = BASELINE_WEIGHTS;
            model.trained = true;
            info!("模型已安装基线权重");
        }
    }
    *last_training.write().expect("last_training poisoned") = Some(Utc::now());
    Ok(())
}

/// 固定顺序的特征向量
fn extract_features(metrics: &SystemMetrics, now: DateTime<Utc>) -> [f64; FEATURE_COUNT] {
    [
        metrics.cpu_usage,
        metrics.memory_usage,
        metrics.disk_io_mb(),
        metrics.network_io_mb(),
        metrics.load_avg.load1,
        now.hour() as f64,
        now.weekday().num_days_from_sunday() as f64,
        1.0,
    ]
}

/// 启发式档位；置信度固定 0.5
fn predict_with_heuristics(job_name: &str, job_type: &JobType, metrics: &SystemMetrics) -> Advisory {
    let (delay_minutes, reasoning) = match job_type {
        JobType::ResourceIntensive => {
            if metrics.cpu_usage > 80.0 || metrics.memory_usage > 80.0 {
                (
                    30,
                    "High system load detected, delaying resource-intensive job",
                )
            } else if metrics.cpu_usage > 60.0 || metrics.memory_usage > 60.0 {
                (
                    15,
                    "Moderate system load, slight delay for resource-intensive job",
                )
            } else {
                (5, "Low system load, minimal delay for resource-intensive job")
            }
        }
        JobType::Light => {
            if metrics.cpu_usage > 90.0 || metrics.memory_usage > 90.0 {
                (10, "Very high system load, delaying light job")
            } else {
                (1, "System load acceptable for light job")
            }
        }
        JobType::Other(_) => (5, "Unknown job type, using default delay"),
    };

    Advisory {
        job_name: job_name.to_string(),
        optimal_time: Utc::now() + chrono::Duration::minutes(delay_minutes),
        confidence: 0.5,
        reasoning: reasoning.to_string(),
        expected_load: delay_minutes as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics_with_load(cpu: f64, memory: f64) -> SystemMetrics {
        let mut m = SystemMetrics::empty_at(Utc::now());
        m.cpu_usage = cpu;
        m.memory_usage = memory;
        m
    }

    #[test]
    fn test_heuristic_high_load_defers_half_hour() {
        let engine = AdvisoryEngine::new(Duration::from_secs(3600));
        let advisory = engine.predict(
            "backup",
            &JobType::ResourceIntensive,
            &metrics_with_load(85.0, 85.0),
        );
        let delta = advisory.optimal_time - Utc::now();
        assert!((delta.num_minutes() - 30).abs() <= 1);
        assert!(advisory.reasoning.contains("High system load"));
        assert!((advisory.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_heuristic_tiers() {
        let engine = AdvisoryEngine::new(Duration::from_secs(3600));

        let moderate = engine.predict(
            "backup",
            &JobType::ResourceIntensive,
            &metrics_with_load(70.0, 10.0),
        );
        assert!(moderate.reasoning.contains("Moderate system load"));
        assert_eq!(moderate.expected_load, 15.0);

        let low = engine.predict(
            "backup",
            &JobType::ResourceIntensive,
            &metrics_with_load(20.0, 20.0),
        );
        assert!(low.reasoning.contains("Low system load"));
        assert_eq!(low.expected_load, 5.0);

        let light_busy = engine.predict("logrotate", &JobType::Light, &metrics_with_load(95.0, 10.0));
        assert_eq!(light_busy.expected_load, 10.0);

        let light_idle = engine.predict("logrotate", &JobType::Light, &metrics_with_load(5.0, 5.0));
        assert_eq!(light_idle.expected_load, 1.0);

        let unknown = engine.predict(
            "etl",
            &JobType::Other("etl".to_string()),
            &metrics_with_load(50.0, 50.0),
        );
        assert!(unknown.reasoning.contains("Unknown job type"));
    }

    #[test]
    fn test_zero_weights_yield_thirty_minute_delay() {
        let engine = AdvisoryEngine::new(Duration::from_secs(3600));
        engine.install_weights([0.0; FEATURE_COUNT]);

        let advisory = engine.predict(
            "backup",
            &JobType::ResourceIntensive,
            &metrics_with_load(85.0, 85.0),
        );
        // sigmoid(0) · 60 = 30 分钟
        assert!((advisory.expected_load - 30.0).abs() < 1e-9);
        assert!((advisory.confidence - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_train_installs_baseline_once() {
        let engine = AdvisoryEngine::new(Duration::from_secs(3600));
        assert!(!engine.is_trained());
        engine.train().unwrap();
        assert!(engine.is_trained());
        let status = engine.status();
        assert!(status.model_trained);
        assert!(status.last_training.is_some());
        assert_eq!(status.features, FEATURE_COUNT);
    }

    #[test]
    fn test_baseline_weights_shorten_delay_under_load() {
        let engine = AdvisoryEngine::new(Duration::from_secs(3600));
        engine.train().unwrap();
        // 负权重下高负载得分更低，延迟趋向 0
        let advisory = engine.predict(
            "backup",
            &JobType::ResourceIntensive,
            &metrics_with_load(90.0, 90.0),
        );
        assert!(advisory.expected_load < 30.0);
    }
}
