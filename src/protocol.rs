//! Inbound race-control messages
//!
//! Two framings reach the engine:
//! - upstream ErgRace frames, one key naming the kind: `{"race_data": {...}}`
//! - relay envelopes: `{"type": "race_data", "payload": {...}, "ts": 1700000000000}`
//!
//! Both decode once, here, into the closed [`Inbound`] union.

use serde::{Deserialize, Deserializer, Serialize};

use crate::results::ResultEntry;

/// Decoding failures at the boundary
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

/// Accepts `true`/`false` or `0`/`1` style integer flags
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(String),
    }
    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
        Flag::Str(s) => s == "1" || s.eq_ignore_ascii_case("true"),
    })
}

/// Number field that tolerates strings, garbage and non-finite values;
/// anything unusable becomes `None`
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let number = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(number.filter(|v| v.is_finite()))
}

/// Lane number; anything that is not a whole number in range becomes `None`
fn lenient_lane<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(lenient_number(deserializer)?
        .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32))
}

/// One boat (lane) in a race definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boat {
    #[serde(default)]
    pub name: String,
    pub lane_number: u32,
    #[serde(default, deserialize_with = "flag")]
    pub is_paceboat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceDefinition {
    #[serde(default)]
    pub boats: Vec<Boat>,
    /// Race duration in ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
}

impl RaceDefinition {
    /// Positive, finite duration in ms
    pub fn duration_ms(&self) -> Option<u64> {
        self.duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceStatus {
    pub state: i64,
    #[serde(default)]
    pub state_desc: String,
    /// Time remaining in ms
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

/// One lane's reading; every field may be missing or unreadable.
/// A row without a usable lane is skipped by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    #[serde(default, deserialize_with = "lenient_lane", skip_serializing_if = "Option::is_none")]
    pub lane: Option<u32>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub meters: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub watts: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub spm: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceData {
    #[serde(default)]
    pub data: Vec<TelemetryRow>,
    /// Time remaining in ms
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaceResultsPayload {
    #[serde(default)]
    pub results: Vec<ResultEntry>,
}

/// Every message kind the engine consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inbound {
    RaceDefinition(RaceDefinition),
    RaceStatus(RaceStatus),
    RaceData(RaceData),
    RaceResults(RaceResultsPayload),
}

impl Inbound {
    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::RaceDefinition(_) => "race_definition",
            Inbound::RaceStatus(_) => "race_status",
            Inbound::RaceData(_) => "race_data",
            Inbound::RaceResults(_) => "race_results",
        }
    }

    /// Payload without the kind wrapper
    pub fn payload(&self) -> Result<serde_json::Value, ProtocolError> {
        let value = match self {
            Inbound::RaceDefinition(def) => serde_json::to_value(def)?,
            Inbound::RaceStatus(status) => serde_json::to_value(status)?,
            Inbound::RaceData(data) => serde_json::to_value(data)?,
            Inbound::RaceResults(results) => serde_json::to_value(results)?,
        };
        Ok(value)
    }

    /// Build from a kind name and its payload; `None` for kinds the engine ignores
    pub fn from_parts(
        kind: &str,
        payload: serde_json::Value,
    ) -> Result<Option<Self>, ProtocolError> {
        let msg = match kind {
            "race_definition" => Inbound::RaceDefinition(serde_json::from_value(payload)?),
            "race_status" => Inbound::RaceStatus(serde_json::from_value(payload)?),
            "race_data" => Inbound::RaceData(serde_json::from_value(payload)?),
            "race_results" => Inbound::RaceResults(serde_json::from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }
}

/// Decode an upstream ErgRace frame (`{"race_status": {...}}`).
///
/// Frames of other kinds yield `None`.
pub fn decode_upstream(text: &str) -> Result<Option<Inbound>, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let Some(obj) = value.as_object() else {
        return Ok(None);
    };
    for kind in ["race_definition", "race_status", "race_data", "race_results"] {
        if let Some(payload) = obj.get(kind) {
            return Inbound::from_parts(kind, payload.clone());
        }
    }
    Ok(None)
}

/// Decode either framing
pub fn decode(text: &str) -> Result<Option<Inbound>, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    match value.get("type").and_then(|t| t.as_str()) {
        Some(kind) => {
            let payload = value
                .get("payload")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            Inbound::from_parts(kind, payload)
        }
        None => decode_upstream(text),
    }
}
