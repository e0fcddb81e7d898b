use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 磁盘IO计数器，跨块设备求和
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_count: u64,
    pub write_count: u64,
    pub io_util: f64,
}

/// 网络IO计数器
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkIo {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub connections: i64,
}

/// 系统平均负载
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
}

/// 一次采样得到的系统指标快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    /// CPU 利用率百分比
    pub cpu_usage: f64,
    /// 内存利用率百分比
    pub memory_usage: f64,
    pub disk_io: DiskIo,
    pub network_io: NetworkIo,
    pub load_avg: LoadAverage,
}

impl SystemMetrics {
    pub fn empty_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cpu_usage: 0.0,
            memory_usage: 0.0,
            disk_io: DiskIo::default(),
            network_io: NetworkIo::default(),
            load_avg: LoadAverage::default(),
        }
    }

    /// 组合负载 = (CPU% + 内存%) / 2，季节性、异常与预测共用的标量
    pub fn combined_load(&self) -> f64 {
        (self.cpu_usage + self.memory_usage) / 2.0
    }

    pub fn disk_io_mb(&self) -> f64 {
        (self.disk_io.read_bytes + self.disk_io.write_bytes) as f64 / 1024.0 / 1024.0
    }

    pub fn network_io_mb(&self) -> f64 {
        (self.network_io.bytes_sent + self.network_io.bytes_recv) as f64 / 1024.0 / 1024.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_load() {
        let mut m = SystemMetrics::empty_at(Utc::now());
        m.cpu_usage = 80.0;
        m.memory_usage = 40.0;
        assert!((m.combined_load() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_io_mb_conversion() {
        let mut m = SystemMetrics::empty_at(Utc::now());
        m.disk_io.read_bytes = 3 * 1024 * 1024;
        m.disk_io.write_bytes = 1024 * 1024;
        m.network_io.bytes_sent = 512 * 1024;
        m.network_io.bytes_recv = 512 * 1024;
        assert!((m.disk_io_mb() - 4.0).abs() < f64::EPSILON);
        assert!((m.network_io_mb() - 1.0).abs() < f64::EPSILON);
    }
}
