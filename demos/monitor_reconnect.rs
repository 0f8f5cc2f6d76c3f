//! Starts a [`SwapEngine`] against a real provider URL with no swaps to
//! track, subscribes to monitor events, and just watches the WebSocket
//! connect (and, if the connection drops, reconnect with backoff) for a
//! minute. Nothing actionable happens here — it's a way to eyeball the
//! monitor's reconnect behavior (§4.4, §6.3) against a live or local Boltz
//! instance without standing up a full swap first.

use ark_swap_engine::repository::memory::MemoryStore;
use ark_swap_engine::repository::SwapRepository;
use ark_swap_engine::wallet::stub::{StubArkInfo, StubWallet};
use ark_swap_engine::{ArkNetwork, Config, MonitorEvent, SwapEngine};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let api_url =
        std::env::var("BOLTZ_API_URL").unwrap_or_else(|_| "https://api.testnet.boltz.exchange".to_string());
    let config = Config::for_network(ArkNetwork::Testnet).with_api_url(api_url);

    let provider = Arc::new(ark_swap_engine::provider::HttpSwapProvider::new(
        config.api_url.clone(),
        config.ws_url.clone(),
    ));
    let wallet = Arc::new(StubWallet::new(vec![]));
    let ark_info = Arc::new(StubArkInfo {
        server_pubkey: wallet.public_key(),
    });
    let repository = Arc::new(SwapRepository::open(MemoryStore::new()).await?);

    let engine = Arc::new(SwapEngine::new(config, provider, wallet, ark_info, repository));
    let monitor = engine.start_monitor().await?;
    let mut events = monitor.subscribe_events();

    tracing::info!("watching monitor events for 60s, connecting to {}", monitor_ws_hint());

    let deadline = tokio::time::sleep(Duration::from_secs(60));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Ok(MonitorEvent::WebSocketDisconnected) => tracing::warn!("websocket disconnected, reconnect loop will back off and retry"),
                Ok(other) => tracing::info!(?other, "monitor event"),
                Err(err) => {
                    tracing::error!(%err, "event stream closed");
                    break;
                }
            },
        }
    }

    Ok(())
}

fn monitor_ws_hint() -> &'static str {
    "the provider's /v2/ws endpoint"
}
