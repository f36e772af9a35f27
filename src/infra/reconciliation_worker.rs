use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::application::use_cases::payment::PaymentOrchestrator;

/// Background job that closes the gaps left by lost callbacks.
///
/// Each tick polls stale open orders, sweeps expired ones to FAILED after a
/// final poll and retries activations that could not run at settlement.
pub async fn run_reconciliation_loop(orchestrator: Arc<PaymentOrchestrator>, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

    info!(
        "Payment reconciliation worker started (every {}s)",
        interval_secs
    );

    loop {
        ticker.tick().await;
        match orchestrator.reconcile(Utc::now()).await {
            Ok(report) if report.polled + report.swept + report.activated > 0 => info!(
                polled = report.polled,
                swept = report.swept,
                activated = report.activated,
                "Reconciliation pass finished"
            ),
            Ok(_) => {}
            Err(e) => error!(error = %e, "Reconciliation pass failed"),
        }
    }
}
