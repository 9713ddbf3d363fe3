//! Runtime settings
//!
//! Read from the environment by the native runner, or from JSON handed over by
//! the page in the browser.

use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_DURATION_MS;

/// Relay and demo configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Race-control WebSocket to bridge from
    pub ergrace_url: String,
    /// Port browser clients connect to
    pub relay_port: u16,
    /// Use the synthetic feed instead of race control
    pub demo: bool,
    /// Lottery and demo seed; `None` seeds from the clock
    pub seed: Option<u64>,
    /// Rowers in the demo field
    pub demo_lanes: u32,
    /// Demo race length
    pub duration_ms: u64,
    /// Replay the demo offline on simulated time instead of serving clients
    pub headless: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ergrace_url: "ws://localhost:443".to_string(),
            relay_port: 8090,
            demo: false,
            seed: None,
            demo_lanes: 8,
            duration_ms: DEFAULT_DURATION_MS,
            headless: false,
        }
    }
}

impl Settings {
    /// Defaults overridden by `ERGRACE_URL`, `RELAY_PORT`, `DEMO`,
    /// `ERGKART_SEED`, `ERGKART_LANES`, `ERGKART_DURATION_MS` and
    /// `ERGKART_HEADLESS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Settings::from_env`] with a custom variable source.
    /// Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();

        if let Some(url) = lookup("ERGRACE_URL").filter(|u| !u.is_empty()) {
            settings.ergrace_url = url;
        }
        if let Some(port) = parse(&lookup, "RELAY_PORT") {
            settings.relay_port = port;
        }
        if let Some(demo) = lookup("DEMO") {
            settings.demo = demo == "1";
        }
        settings.seed = parse(&lookup, "ERGKART_SEED");
        if let Some(lanes) = parse::<u32>(&lookup, "ERGKART_LANES").filter(|&l| l > 0) {
            settings.demo_lanes = lanes;
        }
        if let Some(duration) = parse::<u64>(&lookup, "ERGKART_DURATION_MS").filter(|&d| d > 0) {
            settings.duration_ms = duration;
        }
        if let Some(headless) = lookup("ERGKART_HEADLESS") {
            settings.headless = headless == "1";
        }

        settings
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[]));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.ergrace_url, "ws://localhost:443");
        assert_eq!(settings.relay_port, 8090);
        assert_eq!(settings.duration_ms, 450_000);
        assert!(!settings.demo);
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("ERGRACE_URL", "ws://10.0.0.5:443"),
            ("RELAY_PORT", "9000"),
            ("DEMO", "1"),
            ("ERGKART_SEED", "42"),
            ("ERGKART_LANES", "4"),
            ("ERGKART_DURATION_MS", "60000"),
            ("ERGKART_HEADLESS", "1"),
        ]));
        assert_eq!(settings.ergrace_url, "ws://10.0.0.5:443");
        assert_eq!(settings.relay_port, 9000);
        assert!(settings.demo);
        assert_eq!(settings.seed, Some(42));
        assert_eq!(settings.demo_lanes, 4);
        assert_eq!(settings.duration_ms, 60_000);
        assert!(settings.headless);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let settings = Settings::from_lookup(lookup(&[
            ("RELAY_PORT", "eighty"),
            ("DEMO", "yes"),
            ("ERGKART_LANES", "0"),
        ]));
        assert_eq!(settings.relay_port, 8090);
        assert!(!settings.demo);
        assert_eq!(settings.demo_lanes, 8);
    }

    #[test]
    fn test_partial_json() {
        let settings = Settings::from_json(r#"{"demo": true, "demo_lanes": 6}"#).unwrap();
        assert!(settings.demo);
        assert_eq!(settings.demo_lanes, 6);
        assert_eq!(settings.relay_port, 8090);
    }
}
