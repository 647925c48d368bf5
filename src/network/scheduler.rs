//! Periodic control packet scheduler

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::station::StationRegistry;

use super::wait_for_stop;

/// Match information carried in every control packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlContext {
    pub match_number: u16,
    pub seconds_remaining: u16,
}

/// Source of the match number and remaining time
pub trait MatchInfo: Send + Sync {
    fn control_context(&self) -> ControlContext;
}

/// Fixed context, for running comms without a match clock
impl MatchInfo for ControlContext {
    fn control_context(&self) -> ControlContext {
        *self
    }
}

/// Tick every connected station once per `period` until stopped
pub async fn run_scheduler(
    registry: Arc<StationRegistry>,
    match_info: Arc<dyn MatchInfo>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    tracing::info!("Initializing driver station control packets every {:?}", period);

    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = wait_for_stop(&mut stop) => break,
            _ = interval.tick() => {
                let context = match_info.control_context();
                let sent = registry.tick_all(context.match_number, context.seconds_remaining);
                tracing::trace!(sent, "DS packet tick");
            }
        }
    }

    tracing::info!("Control scheduler stopped");
}
