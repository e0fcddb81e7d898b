use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use arcron_config::AppConfig;

mod app;
mod shutdown;

use app::Application;
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("arcron")
        .version(env!("CARGO_PKG_VERSION"))
        .about("负载自适应任务调度器")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("arcron.yaml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .arg(
            Arg::new("daemon")
                .short('d')
                .long("daemon")
                .help("以服务方式长期运行（进程保持前台，交由服务管理器托管）")
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("status").about("查询运行实例的调度器状态"))
        .subcommand(
            Command::new("job")
                .about("任务相关操作")
                .subcommand(Command::new("list").about("列出运行实例中的任务")),
        )
        .subcommand(Command::new("config").about("校验配置文件"))
        .get_matches();

    let config_path = matches.get_one::<String>("config").expect("有默认值");
    let log_level = matches.get_one::<String>("log-level").expect("有默认值");
    let log_format = matches.get_one::<String>("log-format").expect("有默认值");

    init_logging(log_level, log_format)?;

    match matches.subcommand() {
        Some(("status", _)) => cmd_status(config_path).await,
        Some(("job", sub)) => match sub.subcommand() {
            Some(("list", _)) => cmd_job_list(config_path).await,
            _ => {
                eprintln!("用法: arcron job list");
                std::process::exit(2);
            }
        },
        Some(("config", _)) => cmd_validate_config(config_path),
        _ => run_daemon(config_path, matches.get_flag("daemon")).await,
    }
}

/// 前台运行调度器直到收到关闭信号
async fn run_daemon(config_path: &str, daemon: bool) -> Result<()> {
    info!("启动 arcron，配置文件: {config_path}");
    if daemon {
        info!("守护模式：进程保持前台，由服务管理器接管生命周期");
    }

    let config =
        AppConfig::load(config_path).with_context(|| format!("加载配置失败: {config_path}"))?;

    let app = Application::new(config).await?;
    let shutdown_manager = std::sync::Arc::new(ShutdownManager::new());

    let app_handle = {
        let shutdown_manager = std::sync::Arc::clone(&shutdown_manager);
        let app = std::sync::Arc::new(app);
        tokio::spawn(async move {
            if let Err(e) = app.run(&shutdown_manager).await {
                error!("应用运行失败: {e}");
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("arcron 已退出");
    Ok(())
}

/// 通过HTTP查询运行实例的调度器状态
async fn cmd_status(config_path: &str) -> Result<()> {
    let body: serde_json::Value = api_get(config_path, "/api/v1/scheduler/status").await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// 列出运行实例中的任务目录
async fn cmd_job_list(config_path: &str) -> Result<()> {
    let jobs: serde_json::Value = api_get(config_path, "/api/v1/jobs").await?;
    let Some(jobs) = jobs.as_array() else {
        anyhow::bail!("意外的响应格式");
    };
    println!("{:<20} {:<20} {:<16} {:<12} COMMAND", "NAME", "SCHEDULE", "TYPE", "STATUS");
    for job in jobs {
        println!(
            "{:<20} {:<20} {:<16} {:<12} {}",
            job["name"].as_str().unwrap_or("-"),
            job["schedule"].as_str().unwrap_or("-"),
            job["type"].as_str().unwrap_or("-"),
            job["status"].as_str().unwrap_or("-"),
            job["command"].as_str().unwrap_or("-"),
        );
    }
    Ok(())
}

/// 离线校验配置文件；非法配置以非零码退出
fn cmd_validate_config(config_path: &str) -> Result<()> {
    match AppConfig::load(config_path) {
        Ok(config) => {
            println!(
                "配置有效: {} 个任务, 数据库 {}",
                config.jobs.len(),
                config.database.dsn
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("配置无效: {e}");
            std::process::exit(1);
        }
    }
}

async fn api_get(config_path: &str, path: &str) -> Result<serde_json::Value> {
    let config =
        AppConfig::load(config_path).with_context(|| format!("加载配置失败: {config_path}"))?;
    let url = format!(
        "http://{}:{}{path}",
        config.server.host, config.server.port
    );
    let response = reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .with_context(|| format!("请求 {url} 失败，实例是否在运行？"))?;
    response.json().await.context("解析响应失败")
}

fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
    }
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("安装Ctrl+C信号处理器失败");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("安装SIGTERM信号处理器失败")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("收到Ctrl+C信号"),
        _ = terminate => info!("收到SIGTERM信号"),
    }
}
