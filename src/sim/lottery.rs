//! Bonus/malus lottery
//!
//! Each gate crossing gives every player one draw. A single roll `r` picks a
//! band; some bands need a second, rank-weighted coin flip. A failed flip lets
//! the same `r` carry on to the next band. Trailing players ("favor" close to
//! 1) get bigger bonuses and better odds on the helpful effects; only front
//! runners can trigger the malus effects.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::clock::Millis;
use super::player::{Ledger, RankedLane};
use super::state::RaceMeta;
use crate::consts::EFFECT_PERIOD_MS;

/// Upper bound of the instant-bonus band
const BONUS_BAND: f64 = 0.30;
/// Upper bound of the self-double band
const DOUBLE_BAND: f64 = 0.50;
/// Upper bound of the shield band
const SHIELD_BAND: f64 = 0.65;
/// Upper bound of the global-half band
const GLOBAL_HALF_BAND: f64 = 0.75;

/// Instant bonus: base meters plus up to this much more for the last place
const BONUS_BASE_METERS: f64 = 40.0;
const BONUS_FAVOR_METERS: f64 = 40.0;

/// Only ranks up to here may trigger the global half malus
const GLOBAL_HALF_MAX_RANK: u32 = 3;

/// Lottery misuse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Lottery rolled with no players")]
    EmptyLottery,

    #[error("Lane {0} is not in the ledger")]
    UnknownLane(u32),
}

/// Outcome granted to one player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Effect {
    /// Instant effective-distance bonus
    MetersBonus { meters: u64 },
    /// Own distance gain doubled for the effect period
    SelfDouble,
    /// Immune to forced cadence for the effect period
    Shield,
    /// Everyone's distance gain halved for the effect period
    GlobalHalf,
    /// Every other unshielded player capped at 20 spm
    ForceOthersCadence { affected: Vec<u32> },
}

/// Result of one player's draw
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotteryDraw {
    pub lane: u32,
    pub rank: u32,
    pub effect: Option<Effect>,
}

/// Rank bias in (0, 1]: 1/n for the leader, 1 for last place
#[inline]
pub fn favor(rank: u32, total: usize) -> f64 {
    rank as f64 / total as f64
}

/// Draw and apply one effect per ranked lane.
///
/// `order` must be the current standings, leader first. Every lane in it must
/// exist in the ledger; the check runs before anything is mutated.
pub fn roll_and_apply<R: Rng + ?Sized>(
    meta: &mut RaceMeta,
    ledger: &mut Ledger,
    order: &[RankedLane],
    now: Millis,
    rng: &mut R,
) -> Result<Vec<LotteryDraw>, EngineError> {
    if order.is_empty() || ledger.is_empty() {
        return Err(EngineError::EmptyLottery);
    }
    if let Some(missing) = order.iter().find(|r| ledger.get(r.lane).is_none()) {
        return Err(EngineError::UnknownLane(missing.lane));
    }

    let total = order.len();
    let half_rank = total.div_ceil(2) as u32;
    let mut draws = Vec::with_capacity(total);

    for &RankedLane { lane, rank } in order {
        let favor = favor(rank, total);
        let r: f64 = rng.random();

        let effect = if r < BONUS_BAND {
            let meters = (BONUS_BASE_METERS + (BONUS_FAVOR_METERS * favor).round()) as u64;
            ledger.add_meters(lane, meters);
            Some(Effect::MetersBonus { meters })
        } else if r < DOUBLE_BAND && rng.random::<f64>() < 0.5 + 0.4 * favor {
            if let Some(p) = ledger.get_mut(lane) {
                p.meters_multiplier.arm(now, EFFECT_PERIOD_MS);
            }
            Some(Effect::SelfDouble)
        } else if r < SHIELD_BAND && rng.random::<f64>() < 0.4 + 0.4 * favor {
            if let Some(p) = ledger.get_mut(lane) {
                p.shield.arm(now, EFFECT_PERIOD_MS);
            }
            Some(Effect::Shield)
        } else if r < GLOBAL_HALF_BAND
            && rank <= GLOBAL_HALF_MAX_RANK
            && !meta.global_half.is_active(now)
        {
            meta.global_half.arm(now, EFFECT_PERIOD_MS);
            Some(Effect::GlobalHalf)
        } else if rank <= half_rank {
            let affected = force_others_cadence(ledger, lane, now);
            Some(Effect::ForceOthersCadence { affected })
        } else {
            None
        };

        log::debug!("Lottery lane {} (rank {}): {:?}", lane, rank, effect);
        draws.push(LotteryDraw { lane, rank, effect });
    }

    Ok(draws)
}

/// Cap everyone except `except_lane` and shielded players; returns the lanes hit
fn force_others_cadence(ledger: &mut Ledger, except_lane: u32, now: Millis) -> Vec<u32> {
    let mut affected = Vec::new();
    for p in ledger.iter_mut() {
        if p.lane == except_lane || p.shield.is_active(now) {
            continue;
        }
        p.forced_cadence.arm(now, EFFECT_PERIOD_MS);
        affected.push(p.lane);
    }
    affected
}
