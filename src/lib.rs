//! Atomic swap engine between Ark, Lightning, and mainchain Bitcoin via a
//! Boltz-compatible provider.
//!
//! [`SwapEngine`] is the crate's front door: it owns the three per-kind
//! engines (submarine, reverse, chain) and the swap monitor, and implements
//! [`ActionCallbacks`] so the monitor can drive autonomous claims and
//! refunds without knowing anything about VHTLCs itself.

pub mod address;
pub mod config;
pub mod engines;
pub mod error;
pub mod monitor;
pub mod network;
pub mod provider;
pub mod repository;
pub mod script;
pub mod swap;
pub mod tx_builder;
pub mod vhtlc;
pub mod wallet;

pub use address::ArkAddress;
pub use config::Config;
pub use error::{Error, ErrorContext, Result};
pub use monitor::{ActionCallbacks, MonitorEvent, MonitorStats, SwapMonitor, SwapOutcome};
pub use network::ArkNetwork;
pub use repository::{KeyValueStore, SwapRepository};
pub use swap::{ActionKind, Swap, SwapKind, SwapStatus};
pub use wallet::{ArkInfoProvider, VtxoInfo, Wallet};

use async_trait::async_trait;
use engines::chain::ChainEngine;
use engines::reverse::ReverseEngine;
use engines::submarine::SubmarineEngine;
use engines::EngineContext;
use provider::SwapProvider;
use std::sync::Arc;

/// Front door for the crate: construct once per application with the host's
/// wallet, provider client, chain-info source, and storage, then use
/// [`SwapEngine::submarine`]/[`SwapEngine::reverse`]/[`SwapEngine::chain`]
/// to drive individual swaps and [`SwapEngine::start_monitor`] to let
/// restored and in-flight swaps progress on their own (§9).
pub struct SwapEngine<S: KeyValueStore> {
    ctx: Arc<EngineContext<S>>,
    submarine: Arc<SubmarineEngine<S>>,
    reverse: Arc<ReverseEngine<S>>,
    chain: Arc<ChainEngine<S>>,
}

impl<S: KeyValueStore + 'static> SwapEngine<S> {
    pub fn new(
        config: Config,
        provider: Arc<dyn SwapProvider>,
        wallet: Arc<dyn Wallet>,
        ark_info: Arc<dyn ArkInfoProvider>,
        repository: Arc<SwapRepository<S>>,
    ) -> Self {
        let ctx = Arc::new(EngineContext {
            provider,
            wallet,
            ark_info,
            repository,
            config,
        });
        Self {
            submarine: Arc::new(SubmarineEngine::new(ctx.clone())),
            reverse: Arc::new(ReverseEngine::new(ctx.clone())),
            chain: Arc::new(ChainEngine::new(ctx.clone())),
            ctx,
        }
    }

    pub fn submarine(&self) -> &SubmarineEngine<S> {
        &self.submarine
    }

    pub fn reverse(&self) -> &ReverseEngine<S> {
        &self.reverse
    }

    pub fn chain(&self) -> &ChainEngine<S> {
        &self.chain
    }

    /// Spawns the monitor, seeding it with every non-terminal swap already
    /// in storage so a restart resumes tracking without the caller having
    /// to re-enumerate anything (§4.4, §9's restored-swap flow).
    pub async fn start_monitor(self: &Arc<Self>) -> Result<SwapMonitor> {
        let pending = self
            .ctx
            .repository
            .get_pending()
            .await
            .into_iter()
            .filter_map(|record| Swap::from_record(&record).ok())
            .collect();

        let callbacks: Arc<dyn ActionCallbacks> = self.clone();
        Ok(SwapMonitor::spawn(
            self.ctx.config.clone(),
            self.ctx.provider.clone(),
            callbacks,
            pending,
        ))
    }
}

#[async_trait]
impl<S: KeyValueStore + 'static> ActionCallbacks for SwapEngine<S> {
    async fn claim_ark(&self, swap: &Swap) -> Result<String> {
        match swap {
            Swap::Reverse(s) => self.reverse.claim(s).await,
            Swap::Chain(s) => self.chain.claim(s).await,
            Swap::Submarine(_) => Err(Error::validation("submarine swaps are never claimed by us")),
        }
    }

    async fn claim_btc(&self, _swap: &Swap) -> Result<String> {
        Err(Error::validation(
            "BTC-side claims require a Bitcoin wallet outside this crate's scope",
        ))
    }

    async fn refund_ark(&self, swap: &Swap) -> Result<String> {
        match swap {
            Swap::Submarine(s) => self.submarine.refund(s).await,
            Swap::Chain(s) => self.chain.refund(s).await,
            Swap::Reverse(_) => Err(Error::validation("reverse swaps are never refunded by us")),
        }
    }

    async fn save_swap(&self, swap: &Swap) -> Result<()> {
        self.ctx.repository.save(swap.to_record()).await
    }
}
