//! Async driver for the batch coordinator
//!
//! Runs [`BatchLoadCoordinator::tick`] on a tokio interval at the configured
//! poll rate. The coordinator's [`CancelToken`](crate::coordinator::CancelToken)
//! is checked at every wake-up, so another task can abort the batch.

use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::coordinator::{BatchLoadCoordinator, BatchPhase};
use crate::error::{SceneError, SceneResult};

/// Tick the coordinator until its batch completes or is aborted
///
/// Returns `Ok` immediately if no batch is active, whatever the outcome of
/// an earlier batch was.
pub async fn drive(coordinator: &mut BatchLoadCoordinator) -> SceneResult<()> {
    if !coordinator.is_active() {
        return Ok(());
    }

    let mut ticker = interval(coordinator.config().poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = Instant::now();

    loop {
        let phase = {
            let now = Instant::now();
            let dt = now - last;
            last = now;
            coordinator.tick(dt)
        };

        match phase {
            BatchPhase::Failed => {
                return Err(coordinator
                    .last_error()
                    .cloned()
                    .unwrap_or(SceneError::Cancelled));
            }
            BatchPhase::Idle | BatchPhase::Complete => return Ok(()),
            _ => {}
        }

        ticker.tick().await;
    }
}
