//! Synthetic race feed
//!
//! Stands in for race control when no rowing machines are connected: a fixed
//! field of rowers whose power and stroke rate wander a little every tick.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::protocol::{Boat, Inbound, RaceData, RaceDefinition, RaceStatus, TelemetryRow};
use crate::sim::Millis;

/// Interval between telemetry frames
pub const DEMO_TICK_MS: Millis = 200;

/// Event name shown for demo races
pub const DEMO_EVENT_NAME: &str = "DEMO ERGKART";

/// Speed constant: v (m/s) = K * sqrt(watts / 2), about 3.5 km in 7:30
const SPEED_K: f64 = 0.1;
const MIN_REPORTED_SPM: f64 = 16.0;

#[derive(Debug, Clone)]
pub struct DemoFeed {
    duration_ms: Millis,
    meters: Vec<f64>,
    watts: Vec<f64>,
    spm: Vec<f64>,
    elapsed_ms: Millis,
    finished: bool,
    rng: Pcg32,
}

impl DemoFeed {
    pub fn new(lanes: u32, duration_ms: Millis, seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let lanes = lanes as usize;
        let watts = (0..lanes).map(|_| rng.random_range(150.0..300.0)).collect();
        let spm = (0..lanes).map(|_| rng.random_range(22.0..30.0)).collect();
        Self {
            duration_ms,
            meters: vec![0.0; lanes],
            watts,
            spm,
            elapsed_ms: 0,
            finished: false,
            rng,
        }
    }

    pub fn definition(&self) -> RaceDefinition {
        RaceDefinition {
            boats: (1..=self.meters.len() as u32)
                .map(|lane| Boat {
                    name: format!("Player {}", lane),
                    lane_number: lane,
                    is_paceboat: false,
                    machine_type: Some("row".to_string()),
                })
                .collect(),
            duration: Some(self.duration_ms as f64),
            duration_type: Some("time".to_string()),
            race_type: Some("individual".to_string()),
            event_name: Some(DEMO_EVENT_NAME.to_string()),
        }
    }

    /// Definition followed by the running status
    pub fn start(&self) -> Vec<Inbound> {
        vec![
            Inbound::RaceDefinition(self.definition()),
            Inbound::RaceStatus(RaceStatus {
                state: 9,
                state_desc: "race running".to_string(),
                time: None,
            }),
        ]
    }

    /// Time since start of the frame `step` will emit next
    pub fn elapsed_ms(&self) -> Millis {
        self.elapsed_ms
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Advance one tick. Emits a telemetry frame, plus the completion status
    /// on the tick that reaches the duration. Empty once finished.
    pub fn step(&mut self) -> Vec<Inbound> {
        if self.finished {
            return Vec::new();
        }
        let dt = DEMO_TICK_MS as f64 / 1000.0;
        for i in 0..self.meters.len() {
            let v = SPEED_K * (self.watts[i].max(0.0) / 2.0).sqrt();
            self.meters[i] += v * dt;
            self.watts[i] += (self.rng.random::<f64>() - 0.5) * 10.0;
            self.spm[i] += self.rng.random::<f64>() - 0.5;
        }

        let remaining = self.duration_ms.saturating_sub(self.elapsed_ms) as f64;
        let rows = self
            .meters
            .iter()
            .zip(&self.watts)
            .zip(&self.spm)
            .enumerate()
            .map(|(idx, ((m, w), s))| TelemetryRow {
                lane: Some(idx as u32 + 1),
                meters: Some(m.floor()),
                watts: Some(w.floor().max(0.0)),
                spm: Some(s.floor().max(MIN_REPORTED_SPM)),
            })
            .collect();

        let mut out = vec![Inbound::RaceData(RaceData {
            data: rows,
            time: Some(remaining),
        })];

        if self.elapsed_ms >= self.duration_ms {
            self.finished = true;
            out.push(Inbound::RaceStatus(RaceStatus {
                state: 11,
                state_desc: "race complete".to_string(),
                time: None,
            }));
        } else {
            self.elapsed_ms += DEMO_TICK_MS;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_lists_every_lane() {
        let feed = DemoFeed::new(8, 450_000, 1);
        let def = feed.definition();
        assert_eq!(def.boats.len(), 8);
        assert_eq!(def.boats[0].name, "Player 1");
        assert_eq!(def.boats[7].lane_number, 8);
        assert_eq!(def.duration_ms(), Some(450_000));
        assert_eq!(feed.start().len(), 2);
    }

    #[test]
    fn test_rows_are_sane_and_monotonic() {
        let mut feed = DemoFeed::new(4, 60_000, 7);
        let mut last = vec![0.0; 4];
        for _ in 0..100 {
            for msg in feed.step() {
                let Inbound::RaceData(data) = msg else {
                    continue;
                };
                for row in &data.data {
                    let lane = row.lane.unwrap() as usize;
                    let meters = row.meters.unwrap();
                    assert!(meters >= last[lane - 1]);
                    last[lane - 1] = meters;
                    assert!(row.watts.unwrap() >= 0.0);
                    assert!(row.spm.unwrap() >= 16.0);
                }
            }
        }
        // 20 s of rowing at 150-300 W
        assert!(last.iter().all(|&m| m > 10.0 && m < 60.0));
    }

    #[test]
    fn test_finishes_with_complete_status() {
        let mut feed = DemoFeed::new(2, 1_000, 3);
        let mut frames = 0;
        let mut saw_complete = false;
        while !feed.is_finished() {
            for msg in feed.step() {
                match msg {
                    Inbound::RaceData(data) => {
                        frames += 1;
                        assert!(data.time.unwrap() >= 0.0);
                    }
                    Inbound::RaceStatus(status) => {
                        assert_eq!(status.state, 11);
                        saw_complete = true;
                    }
                    _ => {}
                }
            }
        }
        assert!(saw_complete);
        assert_eq!(frames, 6);
        assert!(feed.step().is_empty());
    }

    #[test]
    fn test_same_seed_same_feed() {
        let mut a = DemoFeed::new(3, 10_000, 99);
        let mut b = DemoFeed::new(3, 10_000, 99);
        for _ in 0..10 {
            assert_eq!(a.step(), b.step());
        }
    }
}
