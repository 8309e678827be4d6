//! 积分对账服务
//!
//! 启动积分对账轮询器，持续将积分系统的判定同步到订单与积分流水。

use std::sync::Arc;

use anyhow::Result;
use loyalty_shared::{config::AppConfig, database::Database, observability};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use loyalty::{
    accrual::{AccrualClient, AccrualHttpClient, AccrualPoller, PollerConfig},
    repository::{MIGRATOR, OrderRepository, OrderRepositoryTrait},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载配置：config/*.toml + 环境变量
    let config = AppConfig::load("loyalty-accrual")?;

    // 2. 初始化日志与指标
    let _guard = observability::init(&config.service_name, &config.observability).await?;

    info!("Starting {}...", config.service_name);
    info!(
        environment = %config.environment,
        accrual = %config.accrual.base_url,
        "Configuration loaded"
    );

    // 3. 初始化数据库并执行迁移
    let db = Database::connect(&config.database).await?;
    db.run_migrations(&MIGRATOR).await?;
    info!("Database connection established");
    let orders: Arc<dyn OrderRepositoryTrait> = Arc::new(OrderRepository::new(db.pool().clone()));

    // 4. 积分系统客户端
    let client: Arc<dyn AccrualClient> = Arc::new(AccrualHttpClient::new(
        &config.accrual.base_url,
        config.accrual.request_timeout(),
    )?);

    // 5. 启动轮询器
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = AccrualPoller::new(orders, client, PollerConfig::from(&config.accrual));
    let poller_handle = tokio::spawn(poller.run(shutdown_rx));

    shutdown_signal().await;

    // 6. 等待当前周期结束（落库阶段不会被打断）
    let _ = shutdown_tx.send(true);
    if let Err(e) = poller_handle.await {
        error!(error = %e, "AccrualPoller task failed");
    }

    db.close().await;

    info!("Service shutdown complete");
    Ok(())
}

/// 优雅关闭信号处理
///
/// 监听 Ctrl+C 和 SIGTERM 信号，用于 Kubernetes 优雅关闭
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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
