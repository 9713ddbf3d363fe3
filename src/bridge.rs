//! Live relay server
//!
//! Bridges race control (or the demo feed) to browser clients:
//! - follows the upstream WebSocket, reconnecting after a drop
//! - wraps every useful frame in a relay envelope and fans it out
//! - greets each new client with `hello` plus the cached definition and status
//!
//! Delivery is best effort: a slow client skips frames instead of holding the
//! others back.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, broadcast};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_async, connect_async};

use crate::demo::{DEMO_TICK_MS, DemoFeed};
use crate::protocol::Inbound;
use crate::relay::{Envelope, Relay};
use crate::settings::Settings;
use crate::sim::{Clock, Millis, SystemClock};

/// Wait before reconnecting to race control
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Frames buffered per client before it starts skipping
const CLIENT_BACKLOG: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared relay state plus the broadcast channel to every client
#[derive(Clone)]
pub struct Hub {
    relay: Arc<Mutex<Relay>>,
    tx: broadcast::Sender<String>,
}

impl Hub {
    pub fn new(demo: bool) -> Self {
        let (tx, _) = broadcast::channel(CLIENT_BACKLOG);
        Self {
            relay: Arc::new(Mutex::new(Relay::new(demo))),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Raw upstream frame in, broadcast out (if it is a race message)
    pub async fn publish_upstream(&self, text: &str, now: Millis) {
        let mut relay = self.relay.lock().await;
        if let Some(envelope) = relay.ingest_upstream(text, now) {
            self.send(&envelope);
        }
    }

    pub async fn publish(&self, msg: Inbound, now: Millis) {
        let mut relay = self.relay.lock().await;
        if let Some(envelope) = relay.forward(msg, now) {
            self.send(&envelope);
        }
    }

    /// Serialized greeting frames for a new client
    pub async fn greeting(&self) -> Vec<String> {
        let relay = self.relay.lock().await;
        relay
            .greeting()
            .iter()
            .filter_map(|envelope| match envelope.to_json() {
                Ok(text) => Some(text),
                Err(e) => {
                    log::warn!("Failed to encode greeting: {}", e);
                    None
                }
            })
            .collect()
    }

    fn send(&self, envelope: &Envelope) {
        match envelope.to_json() {
            Ok(text) => {
                if self.tx.send(text).is_err() {
                    log::trace!("No clients for {}", envelope.kind);
                }
            }
            Err(e) => log::warn!("Failed to encode {}: {}", envelope.kind, e),
        }
    }
}

async fn handle_client(stream: TcpStream, hub: Hub) -> Result<(), tungstenite::Error> {
    let (mut sink, mut source) = accept_async(stream).await?.split();
    let mut rx = hub.subscribe();

    for frame in hub.greeting().await {
        sink.send(Message::Text(frame)).await?;
    }

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Ok(text) => sink.send(Message::Text(text)).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Client fell behind, skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = source.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            },
        }
    }
    Ok(())
}

/// Accept browser clients until the listener fails
pub async fn serve_clients(listener: TcpListener, hub: Hub) -> Result<(), BridgeError> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let hub = hub.clone();
        tokio::spawn(async move {
            log::info!("Client connected: {}", addr);
            if let Err(e) = handle_client(stream, hub).await {
                log::debug!("Client {} error: {}", addr, e);
            }
            log::info!("Client disconnected: {}", addr);
        });
    }
}

/// Follow race control forever, reconnecting `retry` after every drop
pub async fn follow_upstream(url: String, hub: Hub, retry: Duration) {
    let clock = SystemClock;
    loop {
        log::info!("Connecting to race control at {}", url);
        match connect_async(url.as_str()).await {
            Ok((mut ws, _)) => {
                log::info!("Connected to race control");
                while let Some(frame) = ws.next().await {
                    match frame {
                        Ok(Message::Text(text)) => hub.publish_upstream(&text, clock.now_ms()).await,
                        Ok(Message::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            log::warn!("Race control error: {}", e);
                            break;
                        }
                    }
                }
                log::info!("Race control closed, retrying in {:?}", retry);
            }
            Err(e) => log::warn!("Race control unreachable: {}, retrying in {:?}", e, retry),
        }
        tokio::time::sleep(retry).await;
    }
}

/// Play one demo race in real time
pub async fn play_demo(settings: Settings, hub: Hub) {
    let clock = SystemClock;
    let seed = settings.seed.unwrap_or_else(|| clock.now_ms());
    log::info!("DEMO mode on: {} lanes, seed {}", settings.demo_lanes, seed);

    let mut feed = DemoFeed::new(settings.demo_lanes, settings.duration_ms, seed);
    for msg in feed.start() {
        hub.publish(msg, clock.now_ms()).await;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(DEMO_TICK_MS));
    while !feed.is_finished() {
        ticker.tick().await;
        for msg in feed.step() {
            hub.publish(msg, clock.now_ms()).await;
        }
    }
    log::info!("Demo race finished");
}

/// Run the relay: listen for clients on `relay_port` and feed them from race
/// control or the demo generator
pub async fn serve(settings: Settings) -> Result<(), BridgeError> {
    let hub = Hub::new(settings.demo);
    let listener = TcpListener::bind(("0.0.0.0", settings.relay_port)).await?;
    log::info!("Relay listening on ws://localhost:{}", settings.relay_port);

    if settings.demo {
        tokio::spawn(play_demo(settings.clone(), hub.clone()));
    } else {
        tokio::spawn(follow_upstream(
            settings.ergrace_url.clone(),
            hub.clone(),
            RECONNECT_DELAY,
        ));
    }

    serve_clients(listener, hub).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol;

    async fn next_text<S>(ws: &mut S) -> String
    where
        S: futures_util::Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_hub_broadcasts_and_caches() {
        let hub = Hub::new(false);
        let mut rx = hub.subscribe();
        hub.publish_upstream(r#"{"race_definition": {"boats": [], "duration": 60000}}"#, 5)
            .await;
        hub.publish_upstream("not json", 6).await;
        hub.publish_upstream(r#"{"race_status": {"state": 9, "state_desc": "race running"}}"#, 7)
            .await;

        let first: Envelope = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first.kind, "race_definition");
        assert_eq!(first.ts, Some(5));
        let second: Envelope = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second.kind, "race_status");

        let greeting = hub.greeting().await;
        assert_eq!(greeting.len(), 3);
        assert!(protocol::decode(&greeting[0]).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_client_gets_greeting_then_live_frames() {
        let hub = Hub::new(true);
        hub.publish(
            Inbound::RaceStatus(protocol::RaceStatus {
                state: 9,
                state_desc: "race running".to_string(),
                time: None,
            }),
            1,
        )
        .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_clients(listener, hub.clone()));

        let (mut client, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        let hello: Envelope = serde_json::from_str(&next_text(&mut client).await).unwrap();
        assert_eq!(hello.kind, "hello");
        assert_eq!(hello.payload["demo"], true);
        let status: Envelope = serde_json::from_str(&next_text(&mut client).await).unwrap();
        assert_eq!(status.kind, "race_status");

        hub.publish_upstream(r#"{"race_data": {"data": [{"lane": 1, "meters": 12}]}}"#, 2)
            .await;
        let data: Envelope = serde_json::from_str(&next_text(&mut client).await).unwrap();
        assert_eq!(data.kind, "race_data");
        assert_eq!(data.ts, Some(2));
    }

    #[tokio::test]
    async fn test_upstream_reconnects_after_drop() {
        let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", upstream.local_addr().unwrap());

        // Race control that sends one status per connection, then hangs up
        tokio::spawn(async move {
            for state in [4, 9] {
                let (stream, _) = upstream.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                let frame = format!(r#"{{"race_status": {{"state": {}, "state_desc": ""}}}}"#, state);
                ws.send(Message::Text(frame)).await.unwrap();
                ws.close(None).await.ok();
            }
        });

        let hub = Hub::new(false);
        let mut rx = hub.subscribe();
        tokio::spawn(follow_upstream(url, hub.clone(), Duration::from_millis(20)));

        for expected in [4, 9] {
            let envelope: Envelope = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(envelope.kind, "race_status");
            assert_eq!(envelope.payload["state"], expected);
        }
    }
}
