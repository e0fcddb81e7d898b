//! 系统指标采集
//!
//! CPU/内存/负载/网络走 sysinfo，磁盘IO计数与连接数在 Linux 上直读 /proc。
//! 单个数据源失败记日志并以零值填充，快照仍然发出。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sysinfo::{Networks, System};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

use arcron_core::{DiskIo, LoadAverage, NetworkIo, SystemMetrics};
use arcron_errors::{ArcronError, ArcronResult};

/// 指标流容量；写满时丢弃新快照，仅更新 latest
const STREAM_CAPACITY: usize = 100;

/// 系统监控器：固定间隔产出指标快照
pub struct SystemMonitor {
    interval: Duration,
    latest_tx: watch::Sender<Option<SystemMetrics>>,
    latest_rx: watch::Receiver<Option<SystemMetrics>>,
    stream_tx: mpsc::Sender<SystemMetrics>,
    stream_rx: StdMutex<Option<mpsc::Receiver<SystemMetrics>>>,
    dropped: Arc<AtomicU64>,
    running: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    stop_tx: StdMutex<Option<oneshot::Sender<()>>>,
}

impl SystemMonitor {
    pub fn new(sample_interval: Duration) -> Self {
        let (latest_tx, latest_rx) = watch::channel(None);
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_CAPACITY);
        Self {
            interval: sample_interval,
            latest_tx,
            latest_rx,
            stream_tx,
            stream_rx: StdMutex::new(Some(stream_rx)),
            dropped: Arc::new(AtomicU64::new(0)),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
            stop_tx: StdMutex::new(None),
        }
    }

    /// 启动采样循环；已在运行时返回错误
    pub async fn start(&self, mut shutdown_rx: broadcast::Receiver<()>) -> ArcronResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ArcronError::AlreadyRunning("系统监控器".to_string()));
        }

        info!("启动系统指标采集，间隔 {:?}", self.interval);

        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.stop_tx.lock().expect("stop_tx poisoned") = Some(stop_tx);

        let latest_tx = self.latest_tx.clone();
        let stream_tx = self.stream_tx.clone();
        let sample_interval = self.interval;
        let dropped = Arc::clone(&self.dropped);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(sample_interval);
            let mut collector = Collector::new();
            let mut last_timestamp: Option<DateTime<Utc>> = None;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let metrics = collector.collect(&mut last_timestamp);
                        let _ = latest_tx.send_replace(Some(metrics.clone()));
                        if let Err(mpsc::error::TrySendError::Full(_)) = stream_tx.try_send(metrics) {
                            dropped.fetch_add(1, Ordering::Relaxed);
                            debug!("指标流已满，丢弃本次快照");
                        }
                    }
                    _ = &mut stop_rx => {
                        debug!("系统监控器收到停止请求");
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("系统监控器收到关闭信号");
                        break;
                    }
                }
            }
            info!("系统指标采集已停止");
        });

        *self.worker.lock().await = Some(handle);
        Ok(())
    }

    /// 幂等停止；返回前保证采集循环已退出
    pub async fn stop(&self) {
        let stop_tx = self.stop_tx.lock().expect("stop_tx poisoned").take();
        if let Some(tx) = stop_tx {
            let _ = tx.send(());
        }
        if let Some(handle) = self.worker.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("等待采集循环退出失败: {e}");
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// 最近一次快照；无锁读取，读者可接受轻微陈旧
    pub fn latest(&self) -> Option<SystemMetrics> {
        self.latest_rx.borrow().clone()
    }

    /// 取走快照流接收端；单消费者，只能取一次
    pub fn take_stream(&self) -> Option<mpsc::Receiver<SystemMetrics>> {
        self.stream_rx.lock().expect("stream_rx poisoned").take()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// 各指标源的实际采集器，持有 sysinfo 句柄
struct Collector {
    sys: System,
    networks: Networks,
}

impl Collector {
    fn new() -> Self {
        Self {
            sys: System::new(),
            networks: Networks::new_with_refreshed_list(),
        }
    }

    /// 采集一次快照；时间戳保证单调不减
    fn collect(&mut self, last_timestamp: &mut Option<DateTime<Utc>>) -> SystemMetrics {
        let mut now = Utc::now();
        if let Some(last) = *last_timestamp {
            if now < last {
                now = last;
            }
        }
        *last_timestamp = Some(now);

        let mut metrics = SystemMetrics::empty_at(now);

        self.sys.refresh_cpu();
        metrics.cpu_usage = self.sys.global_cpu_info().cpu_usage() as f64;

        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total > 0 {
            metrics.memory_usage = self.sys.used_memory() as f64 / total as f64 * 100.0;
        }

        let load = System::load_average();
        metrics.load_avg = LoadAverage {
            load1: load.one,
            load5: load.five,
            load15: load.fifteen,
        };

        self.networks.refresh();
        let mut net = NetworkIo::default();
        for (_name, data) in &self.networks {
            net.bytes_sent += data.total_transmitted();
            net.bytes_recv += data.total_received();
            net.packets_sent += data.total_packets_transmitted();
            net.packets_recv += data.total_packets_received();
        }
        net.connections = match count_tcp_connections() {
            Ok(n) => n,
            Err(e) => {
                warn!("读取连接数失败: {e}");
                0
            }
        };
        metrics.network_io = net;

        metrics.disk_io = match collect_disk_io() {
            Ok(io) => io,
            Err(e) => {
                warn!("读取磁盘IO计数失败: {e}");
                DiskIo::default()
            }
        };

        metrics
    }
}

/// 跨块设备求和的磁盘IO计数，来自 /proc/diskstats
#[cfg(target_os = "linux")]
fn collect_disk_io() -> std::io::Result<DiskIo> {
    const SECTOR_SIZE: u64 = 512;

    let content = std::fs::read_to_string("/proc/diskstats")?;
    let mut io = DiskIo::default();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        // 跳过虚拟设备与分区，仅统计整盘
        if name.starts_with("loop") || name.starts_with("ram") || name.starts_with("dm-") {
            continue;
        }
        let parse = |i: usize| fields[i].parse::<u64>().unwrap_or(0);
        io.read_count += parse(3);
        io.read_bytes += parse(5) * SECTOR_SIZE;
        io.write_count += parse(7);
        io.write_bytes += parse(9) * SECTOR_SIZE;
    }
    Ok(io)
}

#[cfg(not(target_os = "linux"))]
fn collect_disk_io() -> std::io::Result<DiskIo> {
    Ok(DiskIo::default())
}

/// 打开的TCP连接数，来自 /proc/net/tcp{,6}
#[cfg(target_os = "linux")]
fn count_tcp_connections() -> std::io::Result<i64> {
    let mut count = 0i64;
    for path in ["/proc/net/tcp", "/proc/net/tcp6"] {
        if let Ok(content) = std::fs::read_to_string(path) {
            // 首行为表头
            count += content.lines().skip(1).count() as i64;
        }
    }
    Ok(count)
}

#[cfg(not(target_os = "linux"))]
fn count_tcp_connections() -> std::io::Result<i64> {
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_is_none_before_start() {
        let monitor = SystemMonitor::new(Duration::from_secs(5));
        assert!(monitor.latest().is_none());
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_double_start_is_refused() {
        let monitor = SystemMonitor::new(Duration::from_secs(60));
        let (shutdown_tx, _) = broadcast::channel(1);
        monitor.start(shutdown_tx.subscribe()).await.unwrap();
        let err = monitor.start(shutdown_tx.subscribe()).await.unwrap_err();
        assert!(matches!(err, ArcronError::AlreadyRunning(_)));
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let monitor = SystemMonitor::new(Duration::from_millis(50));
        let (shutdown_tx, _) = broadcast::channel(1);
        monitor.start(shutdown_tx.subscribe()).await.unwrap();
        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn test_emits_snapshot_with_monotonic_timestamps() {
        let monitor = SystemMonitor::new(Duration::from_millis(20));
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut stream = monitor.take_stream().expect("stream available once");
        monitor.start(shutdown_tx.subscribe()).await.unwrap();

        let first = stream.recv().await.expect("snapshot");
        let second = stream.recv().await.expect("snapshot");
        assert!(second.timestamp >= first.timestamp);
        assert!(monitor.latest().is_some());

        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_stream_taken_only_once() {
        let monitor = SystemMonitor::new(Duration::from_secs(5));
        assert!(monitor.take_stream().is_some());
        assert!(monitor.take_stream().is_none());
    }
}
