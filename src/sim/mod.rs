//! Race engine
//!
//! All race logic lives here. It is synchronous and in-memory:
//! - Wall-clock time comes in as an argument, never read inside
//! - Seeded RNG only
//! - Stable iteration order (by lane)
//! - No rendering or transport dependencies

pub mod clock;
pub mod lottery;
pub mod player;
pub mod snapshot;
pub mod state;
pub mod tick;

pub use clock::{Clock, EffectTimer, ManualClock, Millis, SystemClock, is_active};
pub use lottery::{Effect, EngineError, LotteryDraw, favor, roll_and_apply};
pub use player::{LaneColor, Ledger, Player, RankedLane};
pub use snapshot::{MetaView, PlayerView, RaceSnapshot};
pub use state::{EndReason, RaceEvent, RaceMeta, RacePhase, RaceState, StatusCode};
pub use tick::{
    apply_message, apply_race_data, apply_race_definition, apply_results, apply_status,
    check_race_end,
};
