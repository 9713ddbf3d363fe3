//! Erg Kart - arcade kart racing on top of indoor rowing telemetry
//!
//! Core modules:
//! - `sim`: Race engine (ledger, lottery, status machine, ingestion)
//! - `protocol`: Inbound race-control messages
//! - `results`: Frozen final standings
//! - `export`: CSV export of the standings
//! - `relay`: Relay envelopes and late-joiner replay
//! - `bridge`: Live relay server (native only)
//! - `demo`: Synthetic race feed
//! - `settings`: Runtime configuration

#[cfg(not(target_arch = "wasm32"))]
pub mod bridge;
pub mod demo;
pub mod export;
pub mod protocol;
pub mod relay;
pub mod results;
pub mod settings;
pub mod sim;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use protocol::Inbound;
pub use results::RaceResults;
pub use settings::Settings;
pub use sim::{RaceSnapshot, RaceState};

/// Game tuning constants
pub mod consts {
    /// Leader distance between two lottery rounds (meters)
    pub const BONUS_INTERVAL_METERS: u64 = 200;
    /// Lifetime of every timed effect (ms)
    pub const EFFECT_PERIOD_MS: u64 = 10_000;
    /// Displayed cadence ceiling while a forced-cadence effect is active
    pub const CADENCE_CAP_SPM: f64 = 20.0;
    /// Race length when race control does not say (7:30)
    pub const DEFAULT_DURATION_MS: u64 = 7 * 60 * 1000 + 30 * 1000;
}
