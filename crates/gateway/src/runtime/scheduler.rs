//! Schedule-driven push triggers: the cron loop for full pushes and the
//! fixed-period poll for incremental listings.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use sb_feed::PushRunner;

use super::cron;

/// Run the full-push cron loop until shutdown. A new schedule arriving on
/// `schedule_rx` (from the config watcher) reschedules immediately.
pub async fn run_full_push_schedule(
    runner: Arc<PushRunner>,
    mut schedule_rx: watch::Receiver<String>,
    cancel: CancellationToken,
) {
    let mut schedule = schedule_rx.borrow().clone();
    loop {
        let Some(next) = cron::next_after(&schedule, &Utc::now()) else {
            tracing::error!(%schedule, "cron schedule never fires; waiting for a config change");
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = schedule_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    schedule = schedule_rx.borrow_and_update().clone();
                    continue;
                }
            }
        };

        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(%schedule, %next, "next full push scheduled");

        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = schedule_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                schedule = schedule_rx.borrow_and_update().clone();
                tracing::info!(%schedule, "full push rescheduled");
            }
            _ = tokio::time::sleep(wait) => {
                // Fire and return to sleep; the runner's single-flight gate
                // drops overlapping triggers.
                let runner = runner.clone();
                tokio::spawn(async move {
                    runner.run_full_push().await;
                });
            }
        }
    }
}

/// Poll `get_modified_records` on a fixed period for adaptors that support
/// incremental listings.
pub async fn run_incremental_poll(
    runner: Arc<PushRunner>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period.max(Duration::from_millis(100)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The immediate first tick would race startup; swallow it.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => runner.run_incremental_pass().await,
        }
    }
}
