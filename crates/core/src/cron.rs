use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use arcron_errors::{ArcronError, ArcronResult};

/// CRON表达式解析与下次触发时间计算
///
/// 表达式为带秒列的六字段形式 (sec min hour dom mon dow)；
/// 经典五字段表达式在解析前补一个 `0` 秒列。
#[derive(Debug, Clone)]
pub struct CronSchedule {
    schedule: Schedule,
    expression: String,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> ArcronResult<Self> {
        let normalized = normalize_expression(expr);
        let schedule =
            Schedule::from_str(&normalized).map_err(|e| ArcronError::InvalidCron {
                expr: expr.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            schedule,
            expression: normalized,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// 严格晚于 after 的下一次触发时间
    pub fn next_occurrence(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    pub fn upcoming(&self) -> Option<DateTime<Utc>> {
        self.next_occurrence(Utc::now())
    }

    pub fn validate(expr: &str) -> ArcronResult<()> {
        Self::parse(expr).map(|_| ())
    }
}

/// 五字段表达式补秒列；其余原样返回
fn normalize_expression(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_six_field() {
        let schedule = CronSchedule::parse("*/5 * * * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let next = schedule.next_occurrence(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 5).unwrap());
    }

    #[test]
    fn test_five_field_gets_seconds_column() {
        let schedule = CronSchedule::parse("0 2 * * *").unwrap();
        assert_eq!(schedule.expression(), "0 0 2 * * *");
        let after = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
        let next = schedule.next_occurrence(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 10, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_expression() {
        let err = CronSchedule::parse("not a cron").unwrap_err();
        assert!(matches!(
            err,
            arcron_errors::ArcronError::InvalidCron { .. }
        ));
    }

    #[test]
    fn test_next_occurrence_strictly_future() {
        let schedule = CronSchedule::parse("0 0 * * * *").unwrap();
        let on_the_hour = Utc.with_ymd_and_hms(2025, 1, 1, 5, 0, 0).unwrap();
        let next = schedule.next_occurrence(on_the_hour).unwrap();
        assert!(next > on_the_hour);
    }
}
