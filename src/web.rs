//! Browser facade
//!
//! The page owns the relay socket and the renderer; it feeds every relay frame
//! into [`ErgKartEngine::apply_json`] and reads back JSON snapshots.

use wasm_bindgen::prelude::*;

use crate::export;
use crate::protocol;
use crate::sim::{self, Clock, RaceState, SystemClock};

#[wasm_bindgen(start)]
pub fn wasm_start() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

fn js_err(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// One race, owned by the page
#[wasm_bindgen]
pub struct ErgKartEngine {
    state: RaceState,
    clock: SystemClock,
}

#[wasm_bindgen]
impl ErgKartEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(seed: Option<f64>) -> ErgKartEngine {
        let clock = SystemClock;
        let seed = seed.map(|s| s as u64).unwrap_or_else(|| clock.now_ms());
        log::info!("Race engine initialized with seed: {}", seed);
        ErgKartEngine {
            state: RaceState::new(seed),
            clock,
        }
    }

    /// Apply a relay envelope or upstream frame. Returns false when the frame
    /// was not a race message (e.g. `hello`) or could not be parsed.
    pub fn apply_json(&mut self, text: &str) -> Result<bool, JsValue> {
        let msg = match protocol::decode(text) {
            Ok(Some(msg)) => msg,
            Ok(None) => return Ok(false),
            Err(e) => {
                log::debug!("Ignoring frame: {}", e);
                return Ok(false);
            }
        };
        sim::apply_message(&mut self.state, msg, self.clock.now_ms()).map_err(js_err)?;
        Ok(true)
    }

    /// Current race view as JSON
    pub fn snapshot_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.snapshot(self.clock.now_ms())).map_err(js_err)
    }

    /// Events since the last call, as a JSON array
    pub fn drain_events_json(&mut self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state.drain_events()).map_err(js_err)
    }

    pub fn results_csv(&self) -> Result<String, JsValue> {
        export::to_csv_string(&self.state.ledger).map_err(js_err)
    }

    pub fn rename(&mut self, lane: u32, name: &str) {
        self.state.ledger.rename(lane, name);
    }

    /// Check the clock without new telemetry (e.g. when the feed stalls)
    pub fn check_race_end(&mut self) -> bool {
        sim::check_race_end(&mut self.state, self.clock.now_ms())
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }
}
