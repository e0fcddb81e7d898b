use std::collections::HashMap;

use arcron_errors::{ArcronError, ArcronResult};
use serde::{Deserialize, Serialize};

/// 任务类别，影响启发式建议的延迟档位
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    ResourceIntensive,
    Light,
    Other(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::ResourceIntensive => "resource-intensive",
            JobType::Light => "light",
            JobType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for JobType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "resource-intensive" => JobType::ResourceIntensive,
            "light" => JobType::Light,
            _ => JobType::Other(s),
        }
    }
}

impl From<JobType> for String {
    fn from(t: JobType) -> Self {
        t.as_str().to_string()
    }
}

impl Default for JobType {
    fn default() -> Self {
        JobType::Other(String::new())
    }
}

/// 任务定义，加载后不可变，调度器以只读方式共享
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub name: String,
    pub command: String,
    #[serde(rename = "type", default)]
    pub job_type: JobType,
    pub schedule: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub environment: HashMap<String, String>,
    #[serde(default)]
    pub priority: i32,
}

fn default_timeout_seconds() -> u64 {
    300
}

impl JobDefinition {
    pub fn validate(&self) -> ArcronResult<()> {
        if self.name.is_empty() {
            return Err(ArcronError::InvalidJobDefinition(
                "任务名称不能为空".to_string(),
            ));
        }
        if self.command.is_empty() {
            return Err(ArcronError::InvalidJobDefinition(format!(
                "任务 {} 的命令不能为空",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_type_round_trip() {
        assert_eq!(
            JobType::from("resource-intensive".to_string()),
            JobType::ResourceIntensive
        );
        assert_eq!(JobType::from("light".to_string()), JobType::Light);
        assert_eq!(
            JobType::from("etl".to_string()),
            JobType::Other("etl".to_string())
        );
        assert_eq!(JobType::ResourceIntensive.as_str(), "resource-intensive");
    }

    #[test]
    fn test_validate_rejects_empty_fields() {
        let job = JobDefinition {
            name: String::new(),
            command: "echo hi".to_string(),
            job_type: JobType::Light,
            schedule: "0 0 * * * *".to_string(),
            timeout_seconds: 60,
            retries: 0,
            environment: HashMap::new(),
            priority: 0,
        };
        assert!(job.validate().is_err());

        let job = JobDefinition {
            name: "backup".to_string(),
            command: String::new(),
            ..job
        };
        assert!(job.validate().is_err());
    }
}
