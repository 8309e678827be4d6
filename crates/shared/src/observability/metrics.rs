//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

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
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsHandle {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 和 `/health`。
pub async fn init(service_name: &str, port: u16) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle { server_handle })
}

/// 注册通用指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("accrual_poll_cycles_total", "Total number of accrual poll cycles");
    metrics::describe_histogram!(
        "accrual_poll_cycle_duration_seconds",
        "Accrual poll cycle duration in seconds"
    );
    metrics::describe_counter!(
        "accrual_verdicts_applied_total",
        "Accrual verdicts applied to orders"
    );
    metrics::describe_counter!(
        "accrual_fetch_failures_total",
        "Failed accrual service lookups"
    );
    metrics::describe_gauge!("accrual_pending_orders", "Orders waiting for a terminal verdict");
    metrics::describe_counter!("withdrawals_total", "Withdrawal attempts by outcome");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

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
// 便捷的指标记录函数
// ============================================================================

/// 记录一次轮询周期
///
/// 扫描失败时 pending 为 None，保留上一次的待处理订单数
#[inline]
pub fn record_poll_cycle(outcome: &str, pending: Option<usize>, duration_secs: f64) {
    metrics::counter!("accrual_poll_cycles_total", "outcome" => outcome.to_string()).increment(1);
    if let Some(pending) = pending {
        metrics::gauge!("accrual_pending_orders").set(pending as f64);
    }
    metrics::histogram!("accrual_poll_cycle_duration_seconds").record(duration_secs);
}

/// 记录已落库的判定
#[inline]
pub fn record_verdicts_applied(count: u64) {
    metrics::counter!("accrual_verdicts_applied_total").increment(count);
}

/// 记录积分系统查询失败
#[inline]
pub fn record_fetch_failure(kind: &str) {
    metrics::counter!("accrual_fetch_failures_total", "kind" => kind.to_string()).increment(1);
}

/// 记录提现结果
#[inline]
pub fn record_withdrawal(outcome: &str) {
    metrics::counter!("withdrawals_total", "outcome" => outcome.to_string()).increment(1);
}
