//! Wall-clock time and time-bounded effect slots
//!
//! Effects never own timers. Each one stores the wall-clock instant it expires
//! and is tested lazily against the current time.

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch
pub type Millis = u64;

/// Source of the current wall-clock time
pub trait Clock {
    fn now_ms(&self) -> Millis;
}

/// Real wall clock (`Date.now()` in the browser)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(not(target_arch = "wasm32"))]
    fn now_ms(&self) -> Millis {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as Millis)
            .unwrap_or(0)
    }

    #[cfg(target_arch = "wasm32")]
    fn now_ms(&self) -> Millis {
        js_sys::Date::now() as Millis
    }
}

/// Manually driven clock for simulated time and tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: std::cell::Cell<Millis>,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: std::cell::Cell::new(start),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }

    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}

/// True when `until` is set and lies strictly after `now`
#[inline]
pub fn is_active(until: Option<Millis>, now: Millis) -> bool {
    until.is_some_and(|t| t > now)
}

/// A named effect slot: inactive when empty or expired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectTimer(Option<Millis>);

impl EffectTimer {
    pub const fn inactive() -> Self {
        Self(None)
    }

    pub fn is_active(&self, now: Millis) -> bool {
        is_active(self.0, now)
    }

    /// Arm the slot for `period` ms starting at `now`
    pub fn arm(&mut self, now: Millis, period: Millis) {
        self.0 = Some(now + period);
    }

    pub fn until(&self) -> Option<Millis> {
        self.0
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}
