//! 端到端场景：默认引导、SQLite之上的重试链

use std::sync::Arc;
use std::time::Duration as StdDuration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use arcron_config::{AppConfig, DatabaseConfig};
use arcron_core::{ExecutionRepository, ExecutionStatus, JobDefinition, JobType};
use arcron_dispatcher::{JobState, PredictiveScheduler, SchedulerConfig};
use arcron_infrastructure::{DatabaseManager, SqliteExecutionRepository, SystemMonitor};
use arcron_ml::AdvisoryEngine;
use arcron_worker::{ExecutionManager, ExecutorConfig};

async fn sqlite_repo(dir: &TempDir) -> (DatabaseManager, Arc<SqliteExecutionRepository>) {
    let config = DatabaseConfig {
        driver: "sqlite".to_string(),
        dsn: dir.path().join("e2e.db").display().to_string(),
        max_conns: 5,
    };
    let db = DatabaseManager::new(&config).await.unwrap();
    let repo = Arc::new(SqliteExecutionRepository::new(db.pool().clone()));
    (db, repo)
}

/// 场景：删除配置文件后启动，默认任务目录被引导并排班
#[tokio::test]
async fn test_default_bootstrap_schedules_two_jobs() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("arcron.yaml");
    assert!(!config_path.exists());

    let config = AppConfig::load(&config_path).unwrap();
    assert!(config_path.exists());

    let names: Vec<&str> = config.jobs.iter().map(|j| j.name.as_str()).collect();
    assert_eq!(names, vec!["backup", "logrotate"]);
    assert_eq!(config.jobs[0].job_type, JobType::ResourceIntensive);
    assert_eq!(config.jobs[0].schedule, "0 2 * * *");
    assert_eq!(config.jobs[1].job_type, JobType::Light);
    assert_eq!(config.jobs[1].schedule, "0 0 * * *");

    let (db, repo) = sqlite_repo(&dir).await;
    let executor = Arc::new(ExecutionManager::new(
        repo as Arc<dyn ExecutionRepository>,
        ExecutorConfig::default(),
    ));
    for job in &config.jobs {
        executor.register(job.clone()).unwrap();
    }
    let scheduler = PredictiveScheduler::new(
        SchedulerConfig::default(),
        config.jobs.clone(),
        Arc::clone(&executor),
        Arc::new(AdvisoryEngine::new(StdDuration::from_secs(86_400))),
        Arc::new(SystemMonitor::new(StdDuration::from_secs(5))),
        None,
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    scheduler.start(shutdown_tx.subscribe()).await.unwrap();

    let status = scheduler.status();
    assert!(status.running);
    assert_eq!(status.jobs_count, 2);
    assert!(status.jobs.contains_key("backup"));
    assert!(status.jobs.contains_key("logrotate"));
    for view in status.jobs.values() {
        assert_eq!(view.state, JobState::Scheduled);
        assert!(view.next_fire > chrono::Utc::now());
    }

    scheduler.stop().await;
    db.close().await;
}

/// 场景：命令恒失败、retries=2，三条记录按时间有序、序号0/1/2、末态failed
#[tokio::test]
async fn test_retry_ordering_over_sqlite() {
    let dir = TempDir::new().unwrap();
    let (db, repo) = sqlite_repo(&dir).await;

    let backoff = StdDuration::from_millis(150);
    let executor = Arc::new(ExecutionManager::new(
        Arc::clone(&repo) as Arc<dyn ExecutionRepository>,
        ExecutorConfig {
            max_concurrent_jobs: 4,
            job_queue_size: 16,
            retry_backoff: backoff,
        },
    ));
    executor
        .register(JobDefinition {
            name: "always-fails".to_string(),
            command: "false".to_string(),
            job_type: JobType::Light,
            schedule: "0 0 * * * *".to_string(),
            timeout_seconds: 5,
            retries: 2,
            environment: Default::default(),
            priority: 0,
        })
        .unwrap();

    let (shutdown_tx, _) = broadcast::channel(1);
    Arc::clone(&executor)
        .start(shutdown_tx.subscribe())
        .await
        .unwrap();

    let first = executor.execute("always-fails").await.unwrap();
    assert_eq!(first.status, ExecutionStatus::Retrying);

    // 退避 150ms + 300ms，留足余量
    tokio::time::sleep(StdDuration::from_millis(1500)).await;

    let mut rows = repo.get_executions("always-fails", 10).await.unwrap();
    rows.reverse(); // 转为时间正序
    assert_eq!(rows.len(), 3);

    let ordinals: Vec<u32> = rows.iter().map(|e| e.retry_count).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
    assert!(rows[0].start_time < rows[1].start_time);
    assert!(rows[1].start_time < rows[2].start_time);
    assert_eq!(rows[2].status, ExecutionStatus::Failed);

    let gap1 = (rows[1].start_time - rows[0].start_time).num_milliseconds();
    let gap2 = (rows[2].start_time - rows[1].start_time).num_milliseconds();
    assert!(gap1 >= 150, "第一次重试间隔 {gap1}ms 小于退避");
    assert!(gap2 >= 300, "第二次重试间隔 {gap2}ms 小于退避");

    // 每次尝试各自成行，运行中的行最多一条且此刻为零
    let running = rows
        .iter()
        .filter(|e| e.status == ExecutionStatus::Running)
        .count();
    assert_eq!(running, 0);

    executor.stop().await;
    db.close().await;
}

/// 场景：完成的触发把 run_count 与存储记录对齐
#[tokio::test]
async fn test_run_count_matches_completed_records() {
    let dir = TempDir::new().unwrap();
    let (db, repo) = sqlite_repo(&dir).await;

    let executor = Arc::new(ExecutionManager::new(
        Arc::clone(&repo) as Arc<dyn ExecutionRepository>,
        ExecutorConfig::default(),
    ));
    let definition = JobDefinition {
        name: "tick".to_string(),
        command: "echo tick".to_string(),
        job_type: JobType::Light,
        schedule: "* * * * * *".to_string(),
        timeout_seconds: 5,
        retries: 0,
        environment: Default::default(),
        priority: 0,
    };
    executor.register(definition.clone()).unwrap();

    let scheduler = PredictiveScheduler::new(
        SchedulerConfig::default(),
        vec![definition],
        Arc::clone(&executor),
        Arc::new(AdvisoryEngine::new(StdDuration::from_secs(86_400))),
        Arc::new(SystemMonitor::new(StdDuration::from_secs(5))),
        None,
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    scheduler.start(shutdown_tx.subscribe()).await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(2500)).await;
    scheduler.stop().await;

    let run_count = scheduler.job_status("tick").unwrap().run_count;
    let completed = repo
        .get_executions("tick", 100)
        .await
        .unwrap()
        .iter()
        .filter(|e| e.status == ExecutionStatus::Completed)
        .count() as u64;
    assert!(run_count >= 1);
    assert_eq!(run_count, completed);

    db.close().await;
}
