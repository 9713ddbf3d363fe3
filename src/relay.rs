//! Relay framing between race control and browser clients
//!
//! The relay wraps each upstream message in an envelope
//! `{"type": ..., "payload": ..., "ts": ...}` and remembers the last race
//! definition and status, so a client that connects mid-race can catch up.
//! Sockets are not handled here.

use serde::{Deserialize, Serialize};

use crate::protocol::{self, Inbound, ProtocolError, RaceDefinition, RaceStatus};
use crate::sim::Millis;

/// One relay frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<Millis>,
}

impl Envelope {
    /// First frame every client receives
    pub fn hello(demo: bool) -> Self {
        Self {
            kind: "hello".to_string(),
            payload: serde_json::json!({ "demo": demo }),
            ts: None,
        }
    }

    pub fn from_message(msg: &Inbound, ts: Option<Millis>) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind: msg.kind().to_string(),
            payload: msg.payload()?,
            ts,
        })
    }

    /// The engine message inside, `None` for `hello` and unknown kinds
    pub fn message(&self) -> Result<Option<Inbound>, ProtocolError> {
        Inbound::from_parts(&self.kind, self.payload.clone())
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Forwarding state of the relay
#[derive(Debug, Clone, Default)]
pub struct Relay {
    demo: bool,
    last_definition: Option<RaceDefinition>,
    last_status: Option<RaceStatus>,
}

impl Relay {
    pub fn new(demo: bool) -> Self {
        Self {
            demo,
            ..Default::default()
        }
    }

    /// Handle one raw upstream frame. Unparseable or irrelevant frames are
    /// dropped and yield `None`.
    pub fn ingest_upstream(&mut self, text: &str, now: Millis) -> Option<Envelope> {
        match protocol::decode_upstream(text) {
            Ok(Some(msg)) => self.forward(msg, now),
            Ok(None) => None,
            Err(e) => {
                log::debug!("Dropping upstream frame: {}", e);
                None
            }
        }
    }

    /// Remember what late joiners need and wrap the message for broadcast
    pub fn forward(&mut self, msg: Inbound, now: Millis) -> Option<Envelope> {
        match &msg {
            Inbound::RaceDefinition(def) => self.last_definition = Some(def.clone()),
            Inbound::RaceStatus(status) => self.last_status = Some(status.clone()),
            Inbound::RaceData(_) | Inbound::RaceResults(_) => {}
        }
        match Envelope::from_message(&msg, Some(now)) {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                log::warn!("Failed to wrap {} for broadcast: {}", msg.kind(), e);
                None
            }
        }
    }

    /// Frames for a newly connected client: hello, then the cached definition
    /// and status if any
    pub fn greeting(&self) -> Vec<Envelope> {
        let mut frames = vec![Envelope::hello(self.demo)];
        let cached = [
            self.last_definition.clone().map(Inbound::RaceDefinition),
            self.last_status.clone().map(Inbound::RaceStatus),
        ];
        for msg in cached.into_iter().flatten() {
            match Envelope::from_message(&msg, None) {
                Ok(envelope) => frames.push(envelope),
                Err(e) => log::warn!("Failed to replay {}: {}", msg.kind(), e),
            }
        }
        frames
    }
}
