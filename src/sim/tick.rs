//! Message ingestion
//!
//! One inbound message advances the race. Every function here runs to
//! completion on `&mut RaceState`, so a consumer never sees half a tick.

use super::clock::Millis;
use super::lottery::{self, EngineError};
use super::state::{EndReason, RaceEvent, RacePhase, RaceState, StatusCode};
use crate::consts::BONUS_INTERVAL_METERS;
use crate::protocol::{Inbound, RaceData, RaceDefinition, RaceResultsPayload, RaceStatus};
use crate::results::RaceResults;

/// Apply one decoded message at wall-clock time `now`
pub fn apply_message(state: &mut RaceState, msg: Inbound, now: Millis) -> Result<(), EngineError> {
    match msg {
        Inbound::RaceDefinition(def) => apply_race_definition(state, def),
        Inbound::RaceStatus(status) => apply_status(state, &status, now),
        Inbound::RaceData(data) => apply_race_data(state, &data, now)?,
        Inbound::RaceResults(payload) => apply_results(state, payload),
    }
    Ok(())
}

/// Pre-populate the ledger and take the race duration
pub fn apply_race_definition(state: &mut RaceState, def: RaceDefinition) {
    for boat in &def.boats {
        let player = state.ledger.ensure(boat.lane_number);
        if !boat.name.is_empty() {
            player.name = boat.name.clone();
        }
    }
    if let Some(duration) = def.duration_ms() {
        state.meta.duration_ms = Some(duration);
    }
    log::info!(
        "Race definition '{}': {} boats, duration {:?} ms",
        def.event_name.as_deref().unwrap_or(""),
        def.boats.len(),
        state.meta.duration_ms
    );
    state.race_def = Some(def);
}

/// Drive the phase machine from race control
pub fn apply_status(state: &mut RaceState, status: &RaceStatus, now: Millis) {
    let code = StatusCode::from_code(status.state);
    let change = state.meta.apply_status(status.state, &status.state_desc, now);

    if let Some(time) = as_millis(status.time) {
        state.meta.time_remaining = Some(time);
    }
    if let Some(banner) = code.banner() {
        log::info!("Status {}: {}", status.state, banner);
    }

    if let Some((from, to)) = change {
        log::info!("Race phase {:?} -> {:?}", from, to);
        state.events.push(RaceEvent::StatusChanged {
            code: status.state,
            from,
            to,
        });
        if to == RacePhase::Ended {
            finish(state, EndReason::Upstream);
        }
    }
}

/// Fold a telemetry snapshot into the ledger, fire the lottery on a new gate,
/// then run the end-of-race check.
pub fn apply_race_data(state: &mut RaceState, data: &RaceData, now: Millis) -> Result<(), EngineError> {
    let half = state.meta.global_half.is_active(now);

    for row in &data.data {
        let Some(lane) = row.lane else {
            log::debug!("Dropping telemetry row without lane: {:?}", row);
            continue;
        };
        let double = state
            .ledger
            .get(lane)
            .is_some_and(|p| p.meters_multiplier.is_active(now));
        let multiplier = (if half { 0.5 } else { 1.0 }) * (if double { 2.0 } else { 1.0 });
        state
            .ledger
            .apply_telemetry(lane, row.meters, row.watts, row.spm, multiplier);
    }

    let leader_meters = state.ledger.leader_meters();
    let gate = leader_meters / BONUS_INTERVAL_METERS * BONUS_INTERVAL_METERS;
    if leader_meters > 0 && gate >= state.meta.last_bonus_at.saturating_add(BONUS_INTERVAL_METERS) {
        state.meta.last_bonus_at = gate;
        log::info!("Gate {} m crossed (leader at {} m)", gate, leader_meters);
        state.events.push(RaceEvent::GateCrossed {
            gate,
            leader_meters,
        });

        let order = state.ledger.ranked();
        let draws = lottery::roll_and_apply(
            &mut state.meta,
            &mut state.ledger,
            &order,
            now,
            &mut state.rng,
        )?;
        state.events.extend(draws.into_iter().filter_map(|d| {
            d.effect.map(|effect| RaceEvent::EffectGranted {
                lane: d.lane,
                effect,
            })
        }));
    }

    if let Some(time) = as_millis(data.time) {
        state.meta.time_remaining = Some(time);
    }

    check_race_end(state, now);
    Ok(())
}

/// Results from race control replace whatever the engine computed
pub fn apply_results(state: &mut RaceState, payload: RaceResultsPayload) {
    for entry in &payload.results {
        if state.ledger.get(entry.lane).is_none() {
            log::warn!("Results mention lane {} which never raced", entry.lane);
        }
    }
    log::info!("Received {} results from race control", payload.results.len());
    state.results = Some(RaceResults::from_supplied(payload.results));
}

/// End the race once the duration has elapsed. Returns true if it just ended.
pub fn check_race_end(state: &mut RaceState, now: Millis) -> bool {
    let meta = &state.meta;
    if !meta.running() {
        return false;
    }
    let (Some(duration), Some(elapsed)) = (meta.duration_ms, meta.elapsed(now)) else {
        return false;
    };
    if elapsed < duration {
        return false;
    }

    state.meta.phase = RacePhase::Ended;
    state.meta.pause_ts = None;
    finish(state, EndReason::TimeUp);
    true
}

/// Freeze results and announce the end
fn finish(state: &mut RaceState, reason: EndReason) {
    state.freeze_results();
    if let Some(winner) = state.results.as_ref().and_then(|r| r.winner()) {
        log::info!(
            "Race ended ({:?}): winner lane {} '{}' with {} m",
            reason,
            winner.lane,
            winner.name,
            winner.meters
        );
    }
    state.events.push(RaceEvent::RaceEnded { reason });
}

/// Non-negative, finite ms value
fn as_millis(value: Option<f64>) -> Option<Millis> {
    value
        .filter(|v| v.is_finite())
        .map(|v| v.max(0.0) as Millis)
}
