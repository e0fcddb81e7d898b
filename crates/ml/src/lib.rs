//! 调度建议引擎
//!
//! 两级预测：启发式档位始终可用，线性模型在基线权重安装后接管。
//! 另含季节性检测、异常检测与短时负载预测。

pub mod anomaly;
pub mod engine;
pub mod forecast;
pub mod seasonality;

pub use anomaly::AnomalyDetector;
pub use engine::{AdvisoryEngine, MlStatus};
pub use forecast::LoadForecaster;
pub use seasonality::SeasonalityDetector;
