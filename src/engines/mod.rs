//! Swap engines (C6/C7/C8): the per-direction protocol drivers built on top
//! of the VHTLC transaction builder (C5) and swap monitor (C4), grounded on
//! the Boltz swap flow the reference client drives through its own
//! `boltz.rs` (`prepare_ln_invoice_payment`, `get_ln_invoice`, `claim_vhtlc`,
//! `refund_expired_vhtlc`).

pub mod chain;
pub mod reverse;
pub mod submarine;

use crate::address::ArkAddress;
use crate::config::Config;
use crate::provider::SwapProvider;
use crate::repository::{KeyValueStore, SwapRepository};
use crate::wallet::{ArkInfoProvider, Wallet};
use std::sync::Arc;

/// Collaborators every engine shares: the provider client, the signing
/// wallet, chain info, the persistent repository, and configuration. Each
/// engine wraps one of these rather than repeating the same five
/// constructor arguments three times over.
pub struct EngineContext<S: KeyValueStore> {
    pub provider: Arc<dyn SwapProvider>,
    pub wallet: Arc<dyn Wallet>,
    pub ark_info: Arc<dyn ArkInfoProvider>,
    pub repository: Arc<SwapRepository<S>>,
    pub config: Config,
}

/// Seconds since the epoch, used to stamp freshly created swaps.
pub(crate) fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl<S: KeyValueStore> EngineContext<S> {
    /// The wallet's own receiving address on the Ark this engine is
    /// attached to, used as the refund destination and to verify VHTLC
    /// addresses where the wallet plays `sender`.
    pub fn own_address(&self) -> ArkAddress {
        ArkAddress::new(
            self.config.network.to_bitcoin_network(),
            self.ark_info.server_pubkey(),
            self.wallet.public_key(),
        )
    }
}
