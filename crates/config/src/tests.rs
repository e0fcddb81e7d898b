use super::*;
use tempfile::TempDir;

#[test]
fn test_missing_file_writes_default_document() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arcron.yaml");
    assert!(!path.exists());

    let config = AppConfig::load(&path).unwrap();
    assert!(path.exists());

    assert_eq!(config.server.host, "localhost");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.database.driver, "sqlite");
    assert_eq!(config.database.dsn, "arcron.db");
    assert_eq!(config.database.max_conns, 10);

    assert_eq!(config.jobs.len(), 2);
    let backup = &config.jobs[0];
    assert_eq!(backup.name, "backup");
    assert_eq!(backup.job_type, JobType::ResourceIntensive);
    assert_eq!(backup.schedule, "0 2 * * *");
    assert_eq!(backup.retries, 3);
    let logrotate = &config.jobs[1];
    assert_eq!(logrotate.name, "logrotate");
    assert_eq!(logrotate.job_type, JobType::Light);
}

#[test]
fn test_reload_yields_equal_configuration() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arcron.yaml");

    let first = AppConfig::load(&path).unwrap();
    let second = AppConfig::load(&path).unwrap();

    let a = serde_yaml::to_string(&first).unwrap();
    let b = serde_yaml::to_string(&second).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_partial_document_gets_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arcron.yaml");
    std::fs::write(
        &path,
        r#"
server:
  port: 9999
jobs:
  - name: cleanup
    command: "find /tmp -mtime +7 -delete"
    type: light
    schedule: "0 30 3 * * *"
"#,
    )
    .unwrap();

    let config = AppConfig::load(&path).unwrap();
    assert_eq!(config.server.port, 9999);
    assert_eq!(config.server.host, "localhost");
    assert_eq!(config.server.read_timeout_seconds, 30);
    assert_eq!(config.database.dsn, "arcron.db");
    assert_eq!(config.ml.update_interval_hours, 24);
    assert_eq!(
        config.ml.features,
        vec!["cpu_usage", "memory_usage", "io_wait", "network_io"]
    );
    assert_eq!(config.advanced.metrics_interval_seconds, 5);
    assert_eq!(config.advanced.max_concurrent_jobs, 10);
    assert_eq!(config.advanced.job_queue_size, 100);
    assert_eq!(config.advanced.cleanup_after_hours, 168);
    assert_eq!(config.advanced.prometheus.path, "/metrics");
    assert_eq!(config.advanced.prometheus.port, 9090);
    assert_eq!(config.jobs[0].timeout_seconds, 300);
}

#[test]
fn test_invalid_cron_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arcron.yaml");
    std::fs::write(
        &path,
        r#"
jobs:
  - name: broken
    command: "true"
    schedule: "every day at noon"
"#,
    )
    .unwrap();

    let err = AppConfig::load(&path).unwrap_err();
    assert!(err.is_fatal());
}

#[test]
fn test_duplicate_job_name_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arcron.yaml");
    std::fs::write(
        &path,
        r#"
jobs:
  - name: twin
    command: "true"
    schedule: "0 0 * * * *"
  - name: twin
    command: "false"
    schedule: "0 0 * * * *"
"#,
    )
    .unwrap();

    assert!(AppConfig::load(&path).is_err());
}

#[test]
fn test_malformed_yaml_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("arcron.yaml");
    std::fs::write(&path, "jobs: [not, closed").unwrap();
    let err = AppConfig::load(&path).unwrap_err();
    assert!(err.is_fatal());
}
