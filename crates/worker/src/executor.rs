use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use arcron_core::JobDefinition;
use arcron_errors::{ArcronError, ArcronResult};

/// 合并输出上限，超出截断
const OUTPUT_CAP: usize = 1024 * 1024;
const TRUNCATION_MARKER: &str = "\n...[output truncated]";

/// 一次命令运行的结果
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// stdout 与 stderr 合并
    pub output: String,
    pub error: Option<String>,
    pub timed_out: bool,
}

/// 外部命令运行器
///
/// 命令串按空白切分为 argv，不做 shell 元字符展开。
/// 子进程环境为继承环境叠加任务环境映射（任务侧优先）。
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// 在任务截止时间内运行命令；超时则终止子进程
    pub async fn run(&self, job: &JobDefinition) -> ArcronResult<CommandOutcome> {
        let parts: Vec<&str> = job.command.split_whitespace().collect();
        let (program, args) = match parts.split_first() {
            Some((program, args)) => (*program, args),
            None => {
                return Err(ArcronError::Execution(format!(
                    "任务 {} 的命令为空",
                    job.name
                )))
            }
        };

        debug!("执行命令: job={} program={} args={:?}", job.name, program, args);

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &job.environment {
            cmd.env(key, value);
        }

        let child = cmd.spawn().map_err(|e| {
            ArcronError::Execution(format!("启动命令 {program} 失败: {e}"))
        })?;

        let deadline = Duration::from_secs(job.timeout_seconds);
        match timeout(deadline, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let exit_code = output.status.code();
                let success = output.status.success();
                let combined = combine_output(&output.stdout, &output.stderr);
                let error = if success {
                    None
                } else {
                    Some(format!("命令退出码非零: {exit_code:?}"))
                };
                Ok(CommandOutcome {
                    success,
                    exit_code,
                    output: combined,
                    error,
                    timed_out: false,
                })
            }
            Ok(Err(e)) => Err(ArcronError::Execution(format!(
                "等待命令结束失败: {e}"
            ))),
            Err(_) => {
                // future 被丢弃时 kill_on_drop 终止子进程
                warn!(
                    "任务 {} 执行超过截止时间 {}秒，已终止",
                    job.name, job.timeout_seconds
                );
                Ok(CommandOutcome {
                    success: false,
                    exit_code: None,
                    output: String::new(),
                    error: Some(format!(
                        "execution deadline exceeded after {}s",
                        job.timeout_seconds
                    )),
                    timed_out: true,
                })
            }
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn combine_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&String::from_utf8_lossy(stderr));
    }
    if combined.len() > OUTPUT_CAP {
        let mut cut = OUTPUT_CAP;
        while !combined.is_char_boundary(cut) {
            cut -= 1;
        }
        combined.truncate(cut);
        combined.push_str(TRUNCATION_MARKER);
    }
    combined
}
