//! Match clock state machine
//!
//! Idle → Auto → Teleop → Endgame → Idle. A match is sequenced by one
//! spawned task; phase transitions command every station through the
//! registry. Each start and abort bumps a generation counter, so a
//! sequencing task that lost a race with `abort` can never apply a stale
//! transition.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::MatchTiming;
use crate::error::MatchError;
use crate::network::scheduler::{ControlContext, MatchInfo};
use crate::protocol::{FieldStatus, MatchPhase};
use crate::station::StationRegistry;

use super::sounds::{PhaseAnnouncer, SoundCue};

#[derive(Debug, Default)]
struct ClockState {
    phase: MatchPhase,
    generation: u64,
    match_number: u16,
    match_name: String,
    started_at: Option<Instant>,
    auto_started_at: Option<Instant>,
    teleop_started_at: Option<Instant>,
    endgame_started_at: Option<Instant>,
}

impl ClockState {
    fn clear_timers(&mut self) {
        self.started_at = None;
        self.auto_started_at = None;
        self.teleop_started_at = None;
        self.endgame_started_at = None;
    }
}

struct ClockInner {
    timing: MatchTiming,
    abort_disables_robots: bool,
    registry: Arc<StationRegistry>,
    announcer: Arc<dyn PhaseAnnouncer>,
    state: RwLock<ClockState>,
}

impl ClockInner {
    /// Apply a scheduled transition; false if the match was aborted meanwhile
    fn advance(&self, generation: u64, phase: MatchPhase) -> bool {
        let cue = {
            let mut state = self.state.write();
            if state.generation != generation || !state.phase.is_running() {
                return false;
            }
            let now = Instant::now();
            state.phase = phase;
            match phase {
                MatchPhase::Teleop => {
                    state.teleop_started_at = Some(now);
                    self.registry.command_all(false, true);
                    Some(SoundCue::Teleop)
                }
                MatchPhase::Endgame => {
                    state.endgame_started_at = Some(now);
                    // Robots are disabled for the endgame, matching observed field behaviour
                    self.registry.command_all(false, false);
                    None
                }
                MatchPhase::Idle => {
                    state.clear_timers();
                    self.registry.command_all(false, false);
                    self.registry.clear_latched_stops();
                    Some(SoundCue::End)
                }
                MatchPhase::Auto => None,
            }
        };

        tracing::info!(%phase, "Match phase");
        if let Some(cue) = cue {
            self.announcer.announce(cue);
        }
        true
    }
}

async fn run_sequence(inner: Arc<ClockInner>, generation: u64) {
    let timing = inner.timing;

    tokio::time::sleep(timing.auto).await;
    if !inner.advance(generation, MatchPhase::Teleop) {
        return;
    }

    tokio::time::sleep(timing.teleop_before_endgame()).await;
    if !inner.advance(generation, MatchPhase::Endgame) {
        return;
    }

    tokio::time::sleep(timing.endgame).await;
    inner.advance(generation, MatchPhase::Idle);
}

/// Match clock
pub struct MatchController {
    inner: Arc<ClockInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MatchController {
    pub fn new(
        timing: MatchTiming,
        abort_disables_robots: bool,
        registry: Arc<StationRegistry>,
        announcer: Arc<dyn PhaseAnnouncer>,
    ) -> Self {
        Self {
            inner: Arc::new(ClockInner {
                timing,
                abort_disables_robots,
                registry,
                announcer,
                state: RwLock::new(ClockState::default()),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn timing(&self) -> MatchTiming {
        self.inner.timing
    }

    pub fn phase(&self) -> MatchPhase {
        self.inner.state.read().phase
    }

    pub fn match_name(&self) -> String {
        self.inner.state.read().match_name.clone()
    }

    pub fn set_match_name(&self, name: impl Into<String>) {
        self.inner.state.write().match_name = name.into();
    }

    /// Start a match; must be called from within a tokio runtime
    ///
    /// Auto is entered before this returns. Rejected while a match runs.
    pub fn start(&self, match_number: u16) -> Result<(), MatchError> {
        let mut task = self.task.lock();
        let inner = &self.inner;

        let generation = {
            let mut state = inner.state.write();
            if state.phase.is_running() {
                return Err(MatchError::AlreadyRunning);
            }
            let now = Instant::now();
            state.generation += 1;
            state.match_number = match_number;
            state.clear_timers();
            state.started_at = Some(now);
            state.auto_started_at = Some(now);
            state.phase = MatchPhase::Auto;

            inner.registry.reset_missed_packet_baselines();
            inner.registry.command_all(true, true);
            state.generation
        };

        tracing::info!(match_number, phase = %MatchPhase::Auto, "Match started");
        inner.announcer.announce(SoundCue::Auto);

        if let Some(previous) = task.take() {
            previous.abort();
        }
        *task = Some(tokio::spawn(run_sequence(inner.clone(), generation)));
        Ok(())
    }

    /// Return to idle immediately, cancelling the pending phase timer
    ///
    /// Stop latches are always released. Robots are commanded disabled only
    /// when `abort_disables_robots` is set; otherwise command flags are left
    /// as they were.
    pub fn abort(&self) -> Result<(), MatchError> {
        let mut task = self.task.lock();
        let inner = &self.inner;
        {
            let mut state = inner.state.write();
            if !state.phase.is_running() {
                return Err(MatchError::NotRunning);
            }
            state.generation += 1;
            state.phase = MatchPhase::Idle;
            state.clear_timers();

            if inner.abort_disables_robots {
                inner.registry.command_all(false, false);
            }
            inner.registry.clear_latched_stops();
        }
        if let Some(handle) = task.take() {
            handle.abort();
        }

        tracing::warn!("Match aborted");
        inner.announcer.announce(SoundCue::Abort);
        Ok(())
    }

    /// Current phase, timers and station snapshot
    pub fn status(&self) -> FieldStatus {
        let timing = self.inner.timing;
        let state = self.inner.state.read();
        let now = Instant::now();

        let running = state.phase.is_running();
        let (auto_timer, teleop_timer, endgame_timer, current_timer, elapsed) = if running {
            let auto = remaining(timing.auto, state.auto_started_at, now);
            let teleop = remaining(timing.teleop, state.teleop_started_at, now);
            let endgame = remaining(timing.endgame, state.endgame_started_at, now);
            let current = match state.phase {
                MatchPhase::Auto => auto,
                _ => teleop,
            };
            let elapsed = state
                .started_at
                .map(|at| now.duration_since(at))
                .unwrap_or_default();
            (auto, teleop, endgame, current, elapsed)
        } else {
            (timing.auto, timing.teleop, timing.endgame, Duration::ZERO, Duration::ZERO)
        };

        FieldStatus {
            state: state.phase,
            match_name: state.match_name.clone(),
            match_number: state.match_number,
            auto_timer: format_timer(auto_timer),
            teleop_timer: format_timer(teleop_timer),
            endgame_timer: format_timer(endgame_timer),
            current_timer: format_timer(current_timer),
            elapsed: format_timer(elapsed),
            alliances: self.inner.registry.team_numbers(),
            stations: self.inner.registry.connection_snapshot(),
        }
    }
}

impl MatchInfo for MatchController {
    fn control_context(&self) -> ControlContext {
        let timing = self.inner.timing;
        let state = self.inner.state.read();
        let now = Instant::now();

        let left = match state.phase {
            MatchPhase::Idle => Duration::ZERO,
            MatchPhase::Auto => remaining(timing.auto, state.auto_started_at, now),
            MatchPhase::Teleop | MatchPhase::Endgame => {
                remaining(timing.teleop, state.teleop_started_at, now)
            }
        };

        ControlContext {
            match_number: state.match_number,
            seconds_remaining: left.as_secs().min(u16::MAX as u64) as u16,
        }
    }
}

impl Drop for MatchController {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

fn remaining(total: Duration, started_at: Option<Instant>, now: Instant) -> Duration {
    match started_at {
        Some(at) => total.saturating_sub(now.duration_since(at)),
        None => total,
    }
}

/// Format as `mm:ss`, rounded to the nearest second
pub fn format_timer(duration: Duration) -> String {
    let secs = (duration.as_millis() + 500) / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
