//! 告警服务
//!
//! 消费 Kafka 归一化安全事件，按规则集评估并发布告警。

use alerting_engine::{AlertingEngine, FileRulesProvider, MetricRegistry};
use alerting_service::{AlertingConsumer, EngineReloader, KafkaSink, OutputTopics};
use alerting_shared::config::AppConfig;
use alerting_shared::kafka::KafkaProducer;
use alerting_shared::observability;
use alerting_shared::rules_watcher::{ConfigWatcher, RulesFileWatcher};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

const SERVICE_NAME: &str = "alerting-service";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置
    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig {
            service_name: SERVICE_NAME.to_string(),
            ..Default::default()
        }
    });

    // 2. 初始化日志与指标
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!(
        environment = %config.environment,
        engine = %config.engine.name,
        rules_path = %config.engine.rules_path.display(),
        "Starting alerting-service..."
    );

    // 3. 创建引擎并加载初始规则集，失败时拒绝启动
    let registry = Arc::new(MetricRegistry::new());
    let engine = Arc::new(AlertingEngine::new(&config.engine.name, registry));
    let provider = Arc::new(FileRulesProvider::new(&config.engine.rules_path));
    let reloader = Arc::new(EngineReloader::new(engine.clone(), provider));
    reloader.load().context("初始规则集加载失败")?;

    // 4. 监听规则文件
    let watcher = RulesFileWatcher::new(
        &config.engine.rules_path,
        Duration::from_millis(config.engine.reload_debounce_ms),
        reloader,
    );
    watcher.start().await?;

    // 5. Kafka 输出与消费
    let producer = KafkaProducer::new(&config.kafka)?;
    let sink = Arc::new(KafkaSink::new(producer, OutputTopics::from_config(&config.engine)));
    let consumer = AlertingConsumer::new(&config, engine, sink)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_task = tokio::spawn(consumer.run(shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Err(e) = watcher.stop().await {
        warn!(error = %e, "停止规则文件监听失败");
    }
    consumer_task.await??;

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
