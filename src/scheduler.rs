// src/scheduler.rs
use chrono::Utc;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};

use crate::handlers::ServiceStatus;
use crate::runner::AlertRunner;

/// Runs check cycles forever on a fixed interval, folding each outcome
/// into the shared status snapshot. Spawned once from main.
pub async fn run_alert_service(
    runner: Arc<AlertRunner>,
    status: Arc<RwLock<ServiceStatus>>,
    interval_secs: u64,
) {
    info!(
        "🚀 [SCHEDULER] Starting alert loop (every {}s)",
        interval_secs
    );

    let mut timer = interval(Duration::from_secs(interval_secs));
    let mut first_run = true;

    loop {
        timer.tick().await;

        if first_run {
            info!("🔍 [SCHEDULER] Running initial cycle");
            first_run = false;
        }

        match runner.run_cycle().await {
            Ok(summary) => {
                let mut status = status.write().await;
                status.cycles_run += 1;
                status.last_cycle_at = Some(Utc::now());
                for event in summary.fired.iter().cloned() {
                    status.push_alert(event);
                }
                status.last_summary = Some(summary);
            }
            Err(e) => {
                error!("🔥 [SCHEDULER] Cycle failed: {}", e);
                let mut status = status.write().await;
                status.cycles_failed += 1;
                status.last_cycle_at = Some(Utc::now());
            }
        }
    }
}
