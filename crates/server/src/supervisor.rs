//! Store-polling supervisor.
//!
//! Calls `auto_run_by_store` on a fixed interval so enabling, disabling, or
//! editing targets in the Store takes effect without a restart.

use std::time::Duration;

use sniper_core::engine::StopToken;
use sniper_core::{AutoRunAction, Engine, EngineError};
use tracing::{debug, info, warn};

/// Run until `stop` fires or the engine is closed.
pub async fn run_supervisor(engine: Engine, interval: Duration, stop: StopToken) {
    info!(interval_ms = interval.as_millis() as u64, "Supervisor started");

    loop {
        match engine.auto_run_by_store().await {
            Ok(AutoRunAction::Idle) => debug!("No enabled targets"),
            Ok(AutoRunAction::Started) => info!("Engine started by supervisor"),
            Ok(AutoRunAction::Stopped) => info!("Engine stopped by supervisor"),
            Ok(AutoRunAction::Synced(report)) if report.is_empty() => {}
            Ok(AutoRunAction::Synced(report)) => debug!(?report, "Supervisor synced targets"),
            Err(EngineError::Closed) => break,
            Err(e) => warn!(error = %e, "Supervisor pass failed"),
        }

        if !stop.sleep(interval).await {
            break;
        }
    }

    info!("Supervisor stopped");
}

/// Mirror log bus entries into the tracing output.
pub async fn run_bus_tail(engine: Engine, stop: StopToken) {
    let mut rx = engine.log_bus().subscribe();
    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            entry = rx.recv() => match entry {
                Some(entry) => debug!(kind = %entry.kind, payload = %entry.payload, "Engine event"),
                None => break,
            },
        }
    }
}
