//! Erg Kart entry point
//!
//! Natively this runs the relay server, bridging race control (or the demo
//! feed) to browser clients. With `ERGKART_HEADLESS=1` it instead replays a
//! demo race through the relay framing into the engine on simulated time and
//! writes the final standings to stdout as CSV. The browser build drives the
//! engine through `erg_kart::web`.

#[cfg(not(target_arch = "wasm32"))]
mod headless {
    use erg_kart::demo::{DEMO_TICK_MS, DemoFeed};
    use erg_kart::export::{self, ExportError};
    use erg_kart::protocol::{self, Inbound, ProtocolError};
    use erg_kart::relay::{Envelope, Relay};
    use erg_kart::sim::{self, Clock, EngineError, ManualClock, RaceEvent, RaceState, SystemClock};
    use erg_kart::Settings;

    #[derive(Debug, thiserror::Error)]
    pub enum RunError {
        #[error("protocol: {0}")]
        Protocol(#[from] ProtocolError),
        #[error("engine: {0}")]
        Engine(#[from] EngineError),
        #[error("export: {0}")]
        Export(#[from] ExportError),
    }

    /// Engine side of the relay: decode the frame as a client would and apply it
    fn deliver(state: &mut RaceState, envelope: &Envelope, now: u64) -> Result<(), RunError> {
        let text = envelope.to_json()?;
        if let Some(msg) = protocol::decode(&text)? {
            sim::apply_message(state, msg, now)?;
        }
        Ok(())
    }

    fn broadcast(
        relay: &mut Relay,
        state: &mut RaceState,
        messages: Vec<Inbound>,
        now: u64,
    ) -> Result<(), RunError> {
        for msg in messages {
            if let Some(envelope) = relay.forward(msg, now) {
                deliver(state, &envelope, now)?;
            }
        }
        Ok(())
    }

    fn log_standings(state: &RaceState) {
        for (idx, player) in state.ledger.standings().iter().enumerate() {
            log::info!(
                "  {}. {} (lane {}): {} m",
                idx + 1,
                player.name,
                player.lane,
                player.effective_meters
            );
        }
    }

    fn report(state: &mut RaceState) {
        for event in state.drain_events() {
            match event {
                RaceEvent::GateCrossed { gate, leader_meters } => {
                    log::info!("Gate {} m crossed (leader at {} m)", gate, leader_meters);
                    log_standings(state);
                }
                RaceEvent::EffectGranted { lane, effect } => {
                    log::info!("Lane {} draws {:?}", lane, effect);
                }
                RaceEvent::StatusChanged { code, from, to } => {
                    log::debug!("Status {}: {:?} -> {:?}", code, from, to);
                }
                RaceEvent::RaceEnded { reason } => {
                    log::info!("Race over ({:?})", reason);
                }
            }
        }
    }

    pub fn run(settings: &Settings) -> Result<(), RunError> {
        let seed = settings.seed.unwrap_or_else(|| SystemClock.now_ms());
        log::info!(
            "Demo race: {} lanes, {} ms, seed {}",
            settings.demo_lanes,
            settings.duration_ms,
            seed
        );

        let clock = ManualClock::new(SystemClock.now_ms());
        let mut relay = Relay::new(true);
        let mut state = RaceState::new(seed);
        let mut feed = DemoFeed::new(settings.demo_lanes, settings.duration_ms, seed);

        for envelope in relay.greeting() {
            deliver(&mut state, &envelope, clock.now_ms())?;
        }
        broadcast(&mut relay, &mut state, feed.start(), clock.now_ms())?;

        while !feed.is_finished() {
            broadcast(&mut relay, &mut state, feed.step(), clock.now_ms())?;
            report(&mut state);
            clock.advance(DEMO_TICK_MS);
        }

        match &state.results {
            Some(results) => {
                for (idx, entry) in results.podium().iter().enumerate() {
                    println!("{}. {} - {:.0} m", idx + 1, entry.name, entry.meters);
                }
            }
            None => log::warn!("Race ended without results"),
        }
        println!();
        export::write_csv(&state.ledger, std::io::stdout().lock())?;
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() {
    env_logger::init();
    log::info!("Erg Kart (native) starting...");

    let settings = erg_kart::Settings::from_env();
    if settings.headless {
        if let Err(e) = headless::run(&settings) {
            log::error!("Demo race failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    if let Err(e) = erg_kart::bridge::serve(settings).await {
        log::error!("Relay stopped: {}", e);
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is erg_kart::web::wasm_start
}
