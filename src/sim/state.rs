//! Race state: meta/status machine and the engine instance
//!
//! `RaceState` is owned by whoever drives the race (the browser facade or the
//! native runner) and passed by `&mut` into every operation, so ingestion and
//! reset can never interleave.

use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::clock::{EffectTimer, Millis};
use super::lottery::Effect;
use super::player::Ledger;
use crate::protocol::RaceDefinition;
use crate::results::RaceResults;

/// Race lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RacePhase {
    /// Nothing running (before start, after reset, or upstream standby)
    #[default]
    Idle,
    Running,
    Paused,
    /// Terminal until reset
    Ended,
}

/// Upstream race-control status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Reset,
    WarmUp,
    StopRowing,
    Ready,
    SitReady,
    Attention,
    Running,
    Paused,
    Complete,
    FinalResults,
    Inactive,
    Other(i64),
}

impl StatusCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => StatusCode::Reset,
            1 => StatusCode::WarmUp,
            2 => StatusCode::StopRowing,
            3 => StatusCode::Ready,
            4 => StatusCode::SitReady,
            5 => StatusCode::Attention,
            9 => StatusCode::Running,
            10 => StatusCode::Paused,
            11 => StatusCode::Complete,
            12 => StatusCode::FinalResults,
            13 => StatusCode::Inactive,
            other => StatusCode::Other(other),
        }
    }

    /// Countdown/HUD banner text
    pub fn banner(&self) -> Option<&'static str> {
        match self {
            StatusCode::WarmUp => Some("WARM UP"),
            StatusCode::StopRowing => Some("STOP ROWING"),
            StatusCode::Ready => Some("READY"),
            StatusCode::SitReady => Some("SIT READY"),
            StatusCode::Attention => Some("ATTENTION"),
            StatusCode::Running => Some("GO!"),
            StatusCode::Complete => Some("RACE COMPLETE"),
            StatusCode::FinalResults => Some("FINAL RESULTS"),
            _ => None,
        }
    }

    /// The start sequence has begun; displays should switch to the race view
    pub fn is_imminent(&self) -> bool {
        matches!(self, StatusCode::SitReady)
    }
}

/// Why a race finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// Elapsed wall-clock time reached the duration
    TimeUp,
    /// Race control reported completion
    Upstream,
}

/// Something the consumer may want to announce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RaceEvent {
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        code: i64,
        from: RacePhase,
        to: RacePhase,
    },
    #[serde(rename_all = "camelCase")]
    GateCrossed { gate: u64, leader_meters: u64 },
    EffectGranted { lane: u32, effect: Effect },
    RaceEnded { reason: EndReason },
}

/// Race-wide bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceMeta {
    pub phase: RacePhase,
    /// First transition into running; survives pause/resume
    pub start_ts: Option<Millis>,
    /// Total time spent paused. Kept for display; the end check ignores it.
    pub pause_accum: Millis,
    pub pause_ts: Option<Millis>,
    pub duration_ms: Option<Millis>,
    pub time_remaining: Option<Millis>,
    /// Last distance gate that fired the lottery
    pub last_bonus_at: u64,
    /// Everyone's distance gain halved while active
    pub global_half: EffectTimer,
    pub status_code: Option<i64>,
    pub status_desc: Option<String>,
}

impl RaceMeta {
    pub fn running(&self) -> bool {
        self.phase == RacePhase::Running
    }

    pub fn paused(&self) -> bool {
        self.phase == RacePhase::Paused
    }

    pub fn race_ended(&self) -> bool {
        self.phase == RacePhase::Ended
    }

    /// Wall-clock time since start (pauses included)
    pub fn elapsed(&self, now: Millis) -> Option<Millis> {
        self.start_ts.map(|start| now.saturating_sub(start))
    }

    /// Drive the phase machine from an upstream status code.
    ///
    /// The raw code and description are always stored. Returns the
    /// `(from, to)` pair when the phase changed.
    ///
    /// Code 0 only rewinds timing (start, pauses, time remaining). The gate
    /// counter, the ledger and frozen results stay until [`RaceState::reset`],
    /// so a new heat started with 0 then 9 needs a reset in between.
    pub fn apply_status(
        &mut self,
        code: i64,
        desc: &str,
        now: Millis,
    ) -> Option<(RacePhase, RacePhase)> {
        self.status_code = Some(code);
        self.status_desc = Some(desc.to_string());

        let from = self.phase;
        let to = match (StatusCode::from_code(code), from) {
            (StatusCode::Reset, _) => {
                self.start_ts = None;
                self.pause_accum = 0;
                self.pause_ts = None;
                self.time_remaining = None;
                RacePhase::Idle
            }
            (_, RacePhase::Ended) => RacePhase::Ended,
            (StatusCode::Running, RacePhase::Paused) => {
                if let Some(paused_at) = self.pause_ts.take() {
                    self.pause_accum += now.saturating_sub(paused_at);
                }
                RacePhase::Running
            }
            (StatusCode::Running, _) => {
                self.start_ts.get_or_insert(now);
                RacePhase::Running
            }
            (StatusCode::Paused, RacePhase::Running) => {
                self.pause_ts = Some(now);
                RacePhase::Paused
            }
            (StatusCode::Paused, phase) => phase,
            (StatusCode::Complete, _) => {
                self.pause_ts = None;
                RacePhase::Ended
            }
            (_, RacePhase::Running) => RacePhase::Idle,
            (_, phase) => phase,
        };
        self.phase = to;

        (from != to).then_some((from, to))
    }
}

/// Complete engine state for one race
#[derive(Debug, Clone)]
pub struct RaceState {
    /// Lottery seed
    pub seed: u64,
    pub ledger: Ledger,
    pub meta: RaceMeta,
    /// Frozen at race end; `None` until then
    pub results: Option<RaceResults>,
    /// Latest race definition from race control
    pub race_def: Option<RaceDefinition>,
    /// Pending events, drained by the consumer
    pub events: Vec<RaceEvent>,
    pub(crate) rng: Pcg32,
}

impl RaceState {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ledger: Ledger::new(),
            meta: RaceMeta::default(),
            results: None,
            race_def: None,
            events: Vec::new(),
            rng: Pcg32::seed_from_u64(seed),
        }
    }

    /// Back to idle: empty ledger, initial meta, no results.
    ///
    /// The lottery rng keeps its stream so successive races differ.
    pub fn reset(&mut self) {
        log::info!("Race reset");
        self.ledger.clear();
        self.meta = RaceMeta::default();
        self.results = None;
        self.race_def = None;
        self.events.clear();
    }

    /// Take all pending events
    pub fn drain_events(&mut self) -> Vec<RaceEvent> {
        std::mem::take(&mut self.events)
    }

    /// Freeze results from the current standings unless already set
    pub(crate) fn freeze_results(&mut self) {
        if self.results.is_none() {
            self.results = Some(RaceResults::from_ledger(&self.ledger));
        }
    }
}
