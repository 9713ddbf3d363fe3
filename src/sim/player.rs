//! Player ledger: one record per lane
//!
//! The ledger owns every player record. Records are created the first time a
//! lane shows up (telemetry row or race definition) and only disappear on a
//! full race reset.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::clock::{EffectTimer, Millis};
use crate::consts::CADENCE_CAP_SPM;

/// Golden angle in degrees, spreads consecutive lanes around the hue wheel
const GOLDEN_ANGLE_DEG: f64 = 137.508;

/// Deterministic kart color for a lane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaneColor {
    /// Hue in degrees [0, 360)
    pub hue: f64,
    /// Saturation percent (70-89)
    pub saturation: u32,
    /// Lightness percent (45-59)
    pub lightness: u32,
}

impl LaneColor {
    pub fn for_lane(lane: u32) -> Self {
        let lane = lane.max(1);
        Self {
            hue: (lane as f64 * GOLDEN_ANGLE_DEG) % 360.0,
            saturation: 70 + (lane * 11) % 20,
            lightness: 45 + (lane * 7) % 15,
        }
    }

    /// `#rrggbb` form for consumers that cannot parse `hsl()`
    pub fn to_hex(&self) -> String {
        let (r, g, b) = hsl_to_rgb(
            self.hue,
            self.saturation as f64 / 100.0,
            self.lightness as f64 / 100.0,
        );
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

impl fmt::Display for LaneColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hsl({:.1}, {}%, {}%)",
            self.hue, self.saturation, self.lightness
        )
    }
}

fn hsl_to_rgb(hue: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let h = hue / 60.0;
    let x = c * (1.0 - (h % 2.0 - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    let to_byte = |v: f64| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
    (to_byte(r), to_byte(g), to_byte(b))
}

/// A single competitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub lane: u32,
    pub name: String,
    pub color: LaneColor,
    /// Last raw cumulative distance reported by the erg
    pub raw_meters: f64,
    /// Competition distance after bonuses and multipliers (never decreases)
    pub effective_meters: u64,
    pub watts: f64,
    /// Stored cadence; the cap from a forced-cadence effect is applied on read
    pub spm: f64,
    /// Immunity to forced cadence
    pub shield: EffectTimer,
    /// Self double-distance
    pub meters_multiplier: EffectTimer,
    /// Cadence capped for display
    pub forced_cadence: EffectTimer,
}

impl Player {
    pub fn new(lane: u32) -> Self {
        Self {
            lane,
            name: format!("P{}", lane),
            color: LaneColor::for_lane(lane),
            raw_meters: 0.0,
            effective_meters: 0,
            watts: 0.0,
            spm: 0.0,
            shield: EffectTimer::inactive(),
            meters_multiplier: EffectTimer::inactive(),
            forced_cadence: EffectTimer::inactive(),
        }
    }

    /// Cadence as shown to consumers at `now`
    pub fn display_spm(&self, now: Millis) -> f64 {
        if self.forced_cadence.is_active(now) {
            self.spm.min(CADENCE_CAP_SPM)
        } else {
            self.spm
        }
    }
}

/// Lane with its 1-based position in the current standings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankedLane {
    pub lane: u32,
    pub rank: u32,
}

/// Treat NaN and infinities as missing fields
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Lane-keyed player records (iterated in lane order)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    players: BTreeMap<u32, Player>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the record for `lane`
    pub fn ensure(&mut self, lane: u32) -> &mut Player {
        self.players.entry(lane).or_insert_with(|| {
            if lane == 0 {
                log::debug!("Lane 0 shares lane 1's color");
            }
            log::debug!("New player on lane {}", lane);
            Player::new(lane)
        })
    }

    pub fn get(&self, lane: u32) -> Option<&Player> {
        self.players.get(&lane)
    }

    pub fn get_mut(&mut self, lane: u32) -> Option<&mut Player> {
        self.players.get_mut(&lane)
    }

    /// Fold one telemetry reading into the player's distance.
    ///
    /// Missing fields keep their previous value. A raw distance lower than the
    /// last one is stored but contributes nothing. Returns the effective meters
    /// gained.
    pub fn apply_telemetry(
        &mut self,
        lane: u32,
        raw_meters: Option<f64>,
        watts: Option<f64>,
        spm: Option<f64>,
        multiplier: f64,
    ) -> u64 {
        let player = self.ensure(lane);

        let mut gained = 0;
        if let Some(raw) = finite(raw_meters) {
            let delta = (raw - player.raw_meters).max(0.0);
            player.raw_meters = raw;
            gained = (delta * multiplier.max(0.0)).floor() as u64;
            player.effective_meters = player.effective_meters.saturating_add(gained);
        }
        if let Some(watts) = finite(watts) {
            player.watts = watts;
        }
        if let Some(spm) = finite(spm) {
            player.spm = spm;
        }
        gained
    }

    pub fn rename(&mut self, lane: u32, name: impl Into<String>) {
        self.ensure(lane).name = name.into();
    }

    /// Instant distance bonus
    pub fn add_meters(&mut self, lane: u32, amount: u64) {
        if let Some(player) = self.players.get_mut(&lane) {
            player.effective_meters = player.effective_meters.saturating_add(amount);
        }
    }

    /// Highest effective distance, 0 for an empty ledger
    pub fn leader_meters(&self) -> u64 {
        self.players
            .values()
            .map(|p| p.effective_meters)
            .max()
            .unwrap_or(0)
    }

    /// Players sorted by effective distance, leader first; ties keep lane order
    pub fn standings(&self) -> Vec<&Player> {
        let mut sorted: Vec<&Player> = self.players.values().collect();
        sorted.sort_by(|a, b| b.effective_meters.cmp(&a.effective_meters));
        sorted
    }

    pub fn ranked(&self) -> Vec<RankedLane> {
        self.standings()
            .iter()
            .enumerate()
            .map(|(idx, p)| RankedLane {
                lane: p.lane,
                rank: idx as u32 + 1,
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ensure_is_idempotent() {
        let mut ledger = Ledger::new();
        ledger.ensure(3).name = "Alice".to_string();
        let again = ledger.ensure(3);
        assert_eq!(again.name, "Alice");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_lane_zero_is_its_own_record() {
        let mut ledger = Ledger::new();
        ledger.ensure(0);
        ledger.ensure(1);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(0).unwrap().name, "P0");
        assert_eq!(ledger.get(0).unwrap().color, ledger.get(1).unwrap().color);
    }

    #[test]
    fn test_new_player_defaults() {
        let player = Player::new(4);
        assert_eq!(player.name, "P4");
        assert_eq!(player.effective_meters, 0);
        assert_eq!(player.color, LaneColor::for_lane(4));
    }

    #[test]
    fn test_lane_color_golden_angle() {
        let color = LaneColor::for_lane(1);
        assert!((color.hue - 137.508).abs() < 1e-9);
        assert_eq!(color.saturation, 81);
        assert_eq!(color.lightness, 52);
        assert_eq!(color.to_string(), "hsl(137.5, 81%, 52%)");

        // Lane 0 is treated as lane 1
        assert_eq!(LaneColor::for_lane(0), color);

        let color3 = LaneColor::for_lane(3);
        assert!((color3.hue - 52.524).abs() < 1e-6);
        assert_eq!(color3.saturation, 83);
        assert_eq!(color3.lightness, 51);
    }

    #[test]
    fn test_lane_color_hex() {
        let red = LaneColor {
            hue: 0.0,
            saturation: 100,
            lightness: 50,
        };
        assert_eq!(red.to_hex(), "#ff0000");
        let blue = LaneColor {
            hue: 240.0,
            saturation: 100,
            lightness: 50,
        };
        assert_eq!(blue.to_hex(), "#0000ff");
    }

    #[test]
    fn test_non_monotonic_raw_is_clamped() {
        let mut ledger = Ledger::new();
        let gains: Vec<u64> = [100.0, 90.0, 150.0]
            .iter()
            .map(|&raw| ledger.apply_telemetry(1, Some(raw), None, None, 1.0))
            .collect();
        assert_eq!(gains, vec![100, 0, 60]);
        assert_eq!(ledger.get(1).map(|p| p.effective_meters), Some(160));
    }

    #[test]
    fn test_missing_fields_keep_previous_values() {
        let mut ledger = Ledger::new();
        ledger.apply_telemetry(2, Some(50.0), Some(210.0), Some(27.0), 1.0);
        ledger.apply_telemetry(2, None, None, Some(29.0), 1.0);

        let player = ledger.get(2).unwrap();
        assert_eq!(player.raw_meters, 50.0);
        assert_eq!(player.effective_meters, 50);
        assert_eq!(player.watts, 210.0);
        assert_eq!(player.spm, 29.0);

        ledger.apply_telemetry(2, Some(f64::NAN), Some(f64::INFINITY), None, 1.0);
        let player = ledger.get(2).unwrap();
        assert_eq!(player.raw_meters, 50.0);
        assert_eq!(player.watts, 210.0);
    }

    #[test]
    fn test_multiplier_floors_gain() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.apply_telemetry(1, Some(15.0), None, None, 0.5), 7);
        assert_eq!(ledger.apply_telemetry(1, Some(20.0), None, None, 2.0), 10);
        assert_eq!(ledger.get(1).unwrap().effective_meters, 17);
    }

    #[test]
    fn test_standings_order_and_ties() {
        let mut ledger = Ledger::new();
        ledger.apply_telemetry(3, Some(100.0), None, None, 1.0);
        ledger.apply_telemetry(1, Some(50.0), None, None, 1.0);
        ledger.apply_telemetry(2, Some(100.0), None, None, 1.0);

        let ranked = ledger.ranked();
        assert_eq!(
            ranked,
            vec![
                RankedLane { lane: 2, rank: 1 },
                RankedLane { lane: 3, rank: 2 },
                RankedLane { lane: 1, rank: 3 },
            ]
        );
        assert_eq!(ledger.leader_meters(), 100);
    }

    #[test]
    fn test_display_spm_cap() {
        let mut player = Player::new(1);
        player.spm = 28.0;
        assert_eq!(player.display_spm(0), 28.0);
        player.forced_cadence.arm(0, 10_000);
        assert_eq!(player.display_spm(5_000), 20.0);
        assert_eq!(player.spm, 28.0);
        assert_eq!(player.display_spm(10_000), 28.0);
    }

    #[test]
    fn test_rename_accepts_empty() {
        let mut ledger = Ledger::new();
        ledger.rename(5, "");
        assert_eq!(ledger.get(5).map(|p| p.name.as_str()), Some(""));
    }

    #[test]
    fn test_absurd_distance_saturates() {
        let mut ledger = Ledger::new();
        ledger.apply_telemetry(1, Some(1e300), None, None, 2.0);
        assert_eq!(ledger.get(1).unwrap().effective_meters, u64::MAX);

        ledger.apply_telemetry(1, Some(2e300), None, None, 1.0);
        ledger.add_meters(1, 80);
        assert_eq!(ledger.get(1).unwrap().effective_meters, u64::MAX);
    }

    proptest! {
        #[test]
        fn prop_effective_meters_never_decrease(
            readings in prop::collection::vec((0.0f64..5_000.0, 0usize..3), 1..60)
        ) {
            let multipliers = [0.5, 1.0, 2.0];
            let mut ledger = Ledger::new();
            let mut last = 0;
            for (raw, m) in readings {
                ledger.apply_telemetry(1, Some(raw), None, None, multipliers[m]);
                let now = ledger.get(1).unwrap().effective_meters;
                prop_assert!(now >= last);
                last = now;
            }
        }

        #[test]
        fn prop_unit_multiplier_gain_is_clamped_delta(
            readings in prop::collection::vec(0u32..10_000, 1..40)
        ) {
            let mut ledger = Ledger::new();
            let mut prev = 0u32;
            for raw in readings {
                let gained = ledger.apply_telemetry(1, Some(raw as f64), None, None, 1.0);
                prop_assert_eq!(gained, raw.saturating_sub(prev) as u64);
                prev = raw;
            }
        }
    }
}
