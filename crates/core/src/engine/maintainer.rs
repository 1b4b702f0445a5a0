//! Captcha pool maintenance loop.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::captcha::FillMode;
use crate::clock::now_ms;

use super::coordinator::Shared;
use super::stop::StopToken;

/// Tops the pool up every tick once it is activated. Each fill is bounded by
/// the fill deadline so a stuck solver cannot starve later ticks.
pub(crate) async fn run_maintainer(shared: Arc<Shared>, stop: StopToken) {
    debug!("Captcha pool maintainer started");
    loop {
        if stop.is_stopped() {
            break;
        }

        let now = now_ms();
        if shared.pool.is_activated(now) {
            let missing = shared.pool.missing(now);
            if missing > 0 {
                let session_token = shared.fill_session_token().await;
                let fill = shared.pool.fill(
                    shared.solver.as_ref(),
                    &shared.gate,
                    &session_token,
                    missing,
                    shared.captcha.solve_timeout(),
                    FillMode::Maintenance,
                );
                let deadline = shared.captcha.fill_deadline();

                tokio::select! {
                    _ = stop.stopped() => break,
                    result = tokio::time::timeout(deadline, fill) => match result {
                        Ok(report) if report.added > 0 => shared.publish_pool_status(),
                        Ok(_) => {}
                        Err(_) => warn!(
                            deadline_ms = deadline.as_millis() as u64,
                            "Captcha pool fill exceeded its deadline"
                        ),
                    },
                }
            }
        }

        if !stop.sleep(shared.captcha.pool_tick()).await {
            break;
        }
    }
    debug!("Captcha pool maintainer stopped");
}
