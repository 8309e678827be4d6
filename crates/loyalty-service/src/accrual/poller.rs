//! 积分对账轮询器
//!
//! 以固定间隔运行对账周期：
//! 1. 扫描：读取所有非终态订单
//! 2. 查询：并发向积分系统查询判定，单个订单失败只影响自身
//! 3. 落库：将本轮判定作为一个整体原子写入
//!
//! 周期在单个任务内串行执行，上一轮落库结束前不会开始下一轮。
//! 停止信号在周期之间以及扫描、查询阶段生效（放弃本轮，不写入任何数据），
//! 落库阶段不会被打断。

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use loyalty_shared::config::AccrualConfig;
use loyalty_shared::observability::metrics as app_metrics;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::client::{AccrualClient, AccrualError};
use crate::error::Result;
use crate::models::AccrualVerdict;
use crate::repository::OrderRepositoryTrait;

/// 轮询器配置
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// 周期间隔
    pub interval: Duration,
    /// 单个周期内并发查询的订单数上限
    pub max_in_flight: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_in_flight: 8,
        }
    }
}

impl From<&AccrualConfig> for PollerConfig {
    fn from(config: &AccrualConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_in_flight: config.max_in_flight,
        }
    }
}

/// 单个周期的执行结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// 扫描到的非终态订单数
    pub pending: usize,
    /// 成功取得判定的订单数（含仅登记的订单）
    pub fetched: usize,
    /// 本轮跳过、下一轮重试的订单数
    pub skipped: usize,
    /// 实际改变了状态的订单数
    pub applied: u64,
    /// 本轮是否因限流冷却而未查询
    pub throttled: bool,
}

/// 扫描与查询阶段的产出
struct Collected {
    report: CycleReport,
    verdicts: Vec<AccrualVerdict>,
}

/// 积分对账轮询器
///
/// 每个进程只运行一个实例，由 main 启动并通过 watch 通道停止
pub struct AccrualPoller {
    orders: Arc<dyn OrderRepositoryTrait>,
    client: Arc<dyn AccrualClient>,
    config: PollerConfig,
    /// 限流冷却截止时间，之前的周期跳过查询阶段
    cooldown_until: Option<Instant>,
}

impl AccrualPoller {
    pub fn new(
        orders: Arc<dyn OrderRepositoryTrait>,
        client: Arc<dyn AccrualClient>,
        config: PollerConfig,
    ) -> Self {
        Self {
            orders,
            client,
            config,
            cooldown_until: None,
        }
    }

    /// 主循环：按间隔执行对账周期直到收到停止信号
    ///
    /// 错过的 tick 顺延，不会补偿性地连续执行
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.config.interval,
            max_in_flight = self.config.max_in_flight,
            "AccrualPoller 已启动"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }

                _ = ticker.tick() => {}
            }

            let started = Instant::now();

            // 扫描和查询阶段可被停止信号打断，此时尚未写入任何数据
            let collected = tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("收到停止信号，放弃当前对账周期");
                        break;
                    }
                    continue;
                }

                collected = self.collect() => collected,
            };

            let result = match collected {
                Ok(collected) => self.apply(collected).await,
                Err(e) => Err(e),
            };
            Self::observe(&result, started);
        }

        info!("AccrualPoller 已停止");
    }

    /// 执行一个完整周期（不响应停止信号）
    pub async fn poll_once(&mut self) -> Result<CycleReport> {
        let started = Instant::now();
        let result = match self.collect().await {
            Ok(collected) => self.apply(collected).await,
            Err(e) => Err(e),
        };
        Self::observe(&result, started);
        result
    }

    /// 扫描与查询
    async fn collect(&mut self) -> Result<Collected> {
        let pending = self.orders.list_pending().await?;
        let mut report = CycleReport {
            pending: pending.len(),
            ..Default::default()
        };

        if pending.is_empty() {
            return Ok(Collected {
                report,
                verdicts: Vec::new(),
            });
        }

        if let Some(until) = self.cooldown_until {
            if Instant::now() < until {
                debug!(pending = pending.len(), "限流冷却中，跳过查询");
                report.throttled = true;
                report.skipped = pending.len();
                return Ok(Collected {
                    report,
                    verdicts: Vec::new(),
                });
            }
            self.cooldown_until = None;
        }

        let client = Arc::clone(&self.client);
        let results: Vec<(String, std::result::Result<AccrualVerdict, AccrualError>)> =
            stream::iter(pending)
                .map(|number| {
                    let client = Arc::clone(&client);
                    async move {
                        let result = client.fetch(&number).await;
                        (number, result)
                    }
                })
                .buffer_unordered(self.config.max_in_flight.max(1))
                .collect()
                .await;

        let mut verdicts = Vec::new();
        let mut retry_after: Option<Duration> = None;

        for (number, result) in results {
            match result {
                Ok(verdict) => {
                    report.fetched += 1;
                    if verdict.changes_state() {
                        verdicts.push(verdict);
                    }
                }
                Err(e) => {
                    report.skipped += 1;
                    app_metrics::record_fetch_failure(e.kind());
                    match &e {
                        AccrualError::RateLimited { retry_after: wait } => {
                            retry_after = Some(retry_after.map_or(*wait, |w| w.max(*wait)));
                        }
                        AccrualError::NotRegistered => {
                            debug!(order = %number, "订单尚未登记，下一轮重试");
                        }
                        e if e.is_transient() => {
                            warn!(order = %number, error = %e, "查询积分系统失败，下一轮重试");
                        }
                        e => {
                            error!(order = %number, error = %e, "积分系统返回非预期响应");
                        }
                    }
                }
            }
        }

        if let Some(wait) = retry_after {
            warn!(retry_after = ?wait, "积分系统限流，进入冷却");
            self.cooldown_until = Some(Instant::now() + wait);
        }

        Ok(Collected { report, verdicts })
    }

    /// 落库：本轮判定整体原子写入
    async fn apply(&self, collected: Collected) -> Result<CycleReport> {
        let Collected {
            mut report,
            verdicts,
        } = collected;

        if !verdicts.is_empty() {
            report.applied = self.orders.apply_verdicts(&verdicts).await?;
            app_metrics::record_verdicts_applied(report.applied);
        }

        Ok(report)
    }

    fn observe(result: &Result<CycleReport>, started: Instant) {
        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(report) => {
                let outcome = if report.throttled { "throttled" } else { "ok" };
                app_metrics::record_poll_cycle(outcome, Some(report.pending), elapsed);
                if report.applied > 0 || report.skipped > 0 {
                    info!(
                        pending = report.pending,
                        fetched = report.fetched,
                        skipped = report.skipped,
                        applied = report.applied,
                        "对账周期完成"
                    );
                }
            }
            Err(e) => {
                app_metrics::record_poll_cycle("failed", None, elapsed);
                error!(error = %e, "对账周期失败，本轮未写入任何数据");
            }
        }
    }
}
