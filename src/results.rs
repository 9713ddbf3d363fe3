//! Final race results
//!
//! Frozen once at race end, either from the engine's own standings or from a
//! results payload supplied by race control.

use serde::{Deserialize, Serialize};

use crate::sim::Ledger;

/// Number of places on the podium
pub const PODIUM_SIZE: usize = 3;

/// One finisher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEntry {
    pub lane: u32,
    #[serde(default)]
    pub name: String,
    /// Effective distance at the finish
    #[serde(default)]
    pub meters: f64,
    #[serde(default, alias = "avg_watts")]
    pub avg_watts: f64,
    #[serde(default, alias = "avg_spm")]
    pub avg_spm: f64,
}

/// Ranked result list, best first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RaceResults {
    pub entries: Vec<ResultEntry>,
}

impl RaceResults {
    /// Snapshot the ledger, sorted by effective distance (ties keep lane order)
    pub fn from_ledger(ledger: &Ledger) -> Self {
        let entries = ledger
            .standings()
            .into_iter()
            .map(|p| ResultEntry {
                lane: p.lane,
                name: p.name.clone(),
                meters: p.effective_meters as f64,
                avg_watts: p.watts,
                avg_spm: p.spm,
            })
            .collect();
        Self { entries }
    }

    /// Results from race control are authoritative and kept in their order
    pub fn from_supplied(entries: Vec<ResultEntry>) -> Self {
        Self { entries }
    }

    pub fn winner(&self) -> Option<&ResultEntry> {
        self.entries.first()
    }

    /// Top three (fewer if the field is smaller)
    pub fn podium(&self) -> &[ResultEntry] {
        &self.entries[..self.entries.len().min(PODIUM_SIZE)]
    }

    /// 1-indexed finishing place of a lane
    pub fn rank_of(&self, lane: u32) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.lane == lane)
            .map(|i| i + 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
