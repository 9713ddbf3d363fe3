//! Read-only view handed to renderers and the HUD
//!
//! Built fresh after each applied message; consumers never touch `RaceState`.

use std::collections::BTreeMap;

use serde::Serialize;

use super::clock::Millis;
use super::player::Player;
use super::state::{RaceMeta, RaceState, StatusCode};
use crate::results::RaceResults;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub lane: u32,
    pub name: String,
    /// `hsl(...)` string
    pub color: String,
    pub color_hex: String,
    /// Raw erg distance
    pub meters: f64,
    pub effective_meters: u64,
    pub watts: f64,
    /// Cadence with any forced cap applied
    pub spm: f64,
    pub shield_until: Option<Millis>,
    pub forced_cadence_until: Option<Millis>,
    pub meters_multiplier_until: Option<Millis>,
}

impl PlayerView {
    fn new(player: &Player, now: Millis) -> Self {
        Self {
            lane: player.lane,
            name: player.name.clone(),
            color: player.color.to_string(),
            color_hex: player.color.to_hex(),
            meters: player.raw_meters,
            effective_meters: player.effective_meters,
            watts: player.watts,
            spm: player.display_spm(now),
            shield_until: player.shield.until(),
            forced_cadence_until: player.forced_cadence.until(),
            meters_multiplier_until: player.meters_multiplier.until(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaView {
    pub running: bool,
    pub paused: bool,
    pub race_ended: bool,
    pub status_code: Option<i64>,
    pub status_desc: Option<String>,
    /// Countdown/HUD banner for the current status
    pub banner: Option<&'static str>,
    pub time_remaining: Option<Millis>,
    pub duration_ms: Option<Millis>,
    pub start_ts: Option<Millis>,
    pub pause_accum: Millis,
    pub last_bonus_at: u64,
    pub global_half_until: Option<Millis>,
}

impl From<&RaceMeta> for MetaView {
    fn from(meta: &RaceMeta) -> Self {
        Self {
            running: meta.running(),
            paused: meta.paused(),
            race_ended: meta.race_ended(),
            status_code: meta.status_code,
            status_desc: meta.status_desc.clone(),
            banner: meta
                .status_code
                .and_then(|c| StatusCode::from_code(c).banner()),
            time_remaining: meta.time_remaining,
            duration_ms: meta.duration_ms,
            start_ts: meta.start_ts,
            pause_accum: meta.pause_accum,
            last_bonus_at: meta.last_bonus_at,
            global_half_until: meta.global_half.until(),
        }
    }
}

/// Everything a consumer needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceSnapshot {
    /// Wall-clock time the view was taken at
    pub now: Millis,
    pub event_name: Option<String>,
    pub players: BTreeMap<u32, PlayerView>,
    pub meta: MetaView,
    pub results: Option<RaceResults>,
}

impl RaceState {
    pub fn snapshot(&self, now: Millis) -> RaceSnapshot {
        RaceSnapshot {
            now,
            event_name: self.race_def.as_ref().and_then(|d| d.event_name.clone()),
            players: self
                .ledger
                .iter()
                .map(|p| (p.lane, PlayerView::new(p, now)))
                .collect(),
            meta: MetaView::from(&self.meta),
            results: self.results.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_caps_cadence_without_mutating() {
        let mut state = RaceState::new(1);
        state
            .ledger
            .apply_telemetry(2, Some(100.0), Some(250.0), Some(31.0), 1.0);
        state.ledger.get_mut(2).unwrap().forced_cadence.arm(1_000, 10_000);

        let snap = state.snapshot(2_000);
        assert_eq!(snap.players[&2].spm, 20.0);
        assert_eq!(state.ledger.get(2).unwrap().spm, 31.0);

        let later = state.snapshot(11_000);
        assert_eq!(later.players[&2].spm, 31.0);
        assert_eq!(later.players[&2].forced_cadence_until, Some(11_000));
    }

    #[test]
    fn test_snapshot_is_detached_from_state() {
        let mut state = RaceState::new(1);
        state.ledger.apply_telemetry(1, Some(10.0), None, None, 1.0);
        let snap = state.snapshot(0);
        state.ledger.apply_telemetry(1, Some(50.0), None, None, 1.0);
        assert_eq!(snap.players[&1].effective_meters, 10);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let mut state = RaceState::new(1);
        state.ledger.apply_telemetry(3, Some(42.0), None, None, 1.0);
        state.meta.apply_status(4, "sit ready", 0);

        let json = serde_json::to_value(state.snapshot(0)).unwrap();
        assert_eq!(json["players"]["3"]["effectiveMeters"], 42);
        assert_eq!(json["players"]["3"]["name"], "P3");
        assert_eq!(json["meta"]["banner"], "SIT READY");
        assert_eq!(json["meta"]["raceEnded"], false);
        assert!(json["results"].is_null());
    }
}
