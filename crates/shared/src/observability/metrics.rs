//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 引擎的规则计数器通过 metrics facade 写入同一个 recorder，与服务级指标一起在 `/metrics` 暴露。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出，并在指定端口启动 `/metrics` 与 `/health` 端点
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_service_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

fn register_service_metrics(service_name: &str) {
    metrics::describe_counter!(
        "alerting_events_total",
        "Total number of events processed, by outcome"
    );
    metrics::describe_histogram!(
        "alerting_event_duration_seconds",
        "Event processing duration in seconds"
    );
    metrics::describe_counter!(
        "alerting_publish_failures_total",
        "Total number of outputs that failed to publish"
    );
    metrics::describe_counter!(
        "alerting_rules_reloads_total",
        "Total number of rule set reloads, by status"
    );
    metrics::describe_gauge!("alerting_rules_version", "Version of the active rule set");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 指标路由，可单独挂载到已有的 HTTP 服务
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }))
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = router(handle);

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle（用于自定义渲染）
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 指标记录函数
// ============================================================================

/// 记录一条事件的处理结果，`outcome` 取 alert / error / none
#[inline]
pub fn record_event(outcome: &'static str, duration_secs: f64) {
    metrics::counter!("alerting_events_total", "outcome" => outcome).increment(1);
    metrics::histogram!("alerting_event_duration_seconds").record(duration_secs);
}

/// 记录输出发布失败
#[inline]
pub fn record_publish_failure(topic: &str) {
    metrics::counter!("alerting_publish_failures_total", "topic" => topic.to_string())
        .increment(1);
}

/// 记录规则集重载
#[inline]
pub fn record_rules_reload(success: bool, rules_version: Option<u32>) {
    let status = if success { "success" } else { "failure" };
    metrics::counter!("alerting_rules_reloads_total", "status" => status).increment(1);
    if let Some(version) = rules_version {
        metrics::gauge!("alerting_rules_version").set(f64::from(version));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_record_functions_do_not_panic() {
        // 即使没有初始化 recorder，这些函数也不应该 panic
        record_event("alert", 0.001);
        record_publish_failure("alerting.alerts");
        record_rules_reload(true, Some(3));
        record_rules_reload(false, None);
    }

    #[test]
    fn test_recorded_metrics_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_event("error", 0.002);
            record_rules_reload(true, Some(7));
        });

        let rendered = handle.render();
        assert!(rendered.contains("alerting_events_total{outcome=\"error\"} 1"));
        assert!(rendered.contains("alerting_rules_version"));
    }
}
