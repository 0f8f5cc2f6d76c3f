//! Submarine Engine (C6): the user locks funds into a VHTLC on Ark, the
//! provider pays a Lightning invoice on the other side (§4.6). Grounded on
//! the reference client's `prepare_ln_invoice_payment`/`pay_ln_invoice` for
//! the happy path and `refund_expired_vhtlc` for the failure path.

use crate::engines::{now_unix, EngineContext};
use crate::error::{Error, Result};
use crate::monitor::SwapMonitor;
use crate::repository::KeyValueStore;
use crate::swap::{Swap, SwapCommon, SwapStatus, SubmarineRequest, SubmarineSwap};
use crate::tx_builder;
use crate::vhtlc::VhtlcScript;
use bitcoin::hashes::{ripemd160, Hash};
use lightning_invoice::Bolt11Invoice;
use std::str::FromStr;
use std::sync::Arc;

pub struct SubmarineEngine<S: KeyValueStore> {
    ctx: Arc<EngineContext<S>>,
}

impl<S: KeyValueStore> SubmarineEngine<S> {
    pub fn new(ctx: Arc<EngineContext<S>>) -> Self {
        Self { ctx }
    }

    /// createSubmarineSwap: submits the invoice, rebuilds the VHTLC the
    /// provider claims to have set up and checks its address matches what
    /// was returned (I2) before ever funding it, then persists.
    pub async fn create_submarine_swap(&self, invoice: String) -> Result<SubmarineSwap> {
        let parsed = Bolt11Invoice::from_str(&invoice)
            .map_err(|e| Error::validation(format!("invalid BOLT11 invoice: {e}")))?;

        let request = SubmarineRequest {
            invoice: invoice.clone(),
            refund_public_key: self.ctx.wallet.public_key(),
        };

        let (id, response) = self.ctx.provider.create_submarine_swap(&request).await?;

        let preimage_hash = submarine_preimage_hash(parsed.payment_hash().as_byte_array());
        let vhtlc = VhtlcScript::from_swap_tree(
            &response.swap_tree,
            request.refund_public_key,
            response.claim_public_key,
            self.ctx.ark_info.server_pubkey(),
            preimage_hash,
            self.ctx.config.network.to_bitcoin_network(),
        )?;
        if vhtlc.address().encode() != response.address {
            return Err(Error::Security(
                "Boltz is trying to scam us (invalid address)".to_string(),
            ));
        }

        let swap = SubmarineSwap {
            common: SwapCommon {
                id,
                status: SwapStatus::SwapCreated,
                created_at: now_unix(),
            },
            request,
            response: Some(response),
        };

        self.ctx
            .repository
            .save(Swap::Submarine(swap.clone()).to_record())
            .await?;
        Ok(swap)
    }

    /// payLightning: funds the VHTLC from the wallet's own balance, then
    /// tracks the swap through the monitor until it settles or fails.
    /// Success resolves once the provider confirms `invoice.settled`;
    /// `invoice.failedToPay`/`swap.expired` instead drive an autonomous
    /// refund, surfaced to the caller as an error.
    pub async fn pay_lightning(&self, monitor: &SwapMonitor, swap: SubmarineSwap) -> Result<()> {
        let response = swap
            .response
            .as_ref()
            .ok_or_else(|| Error::validation("submarine swap has no provider response yet"))?;
        let address = crate::address::ArkAddress::decode(&response.address)?;
        let lockup_txid = self
            .ctx
            .wallet
            .send_to_address(&address, bitcoin::Amount::from_sat(response.expected_amount))
            .await?;
        tracing::debug!(id = %swap.common.id, txid = %lockup_txid, "funded submarine swap VHTLC");

        monitor.add_swap(Swap::Submarine(swap.clone()));
        let outcome = monitor.wait_for_swap_completion(&swap.common.id).await?;
        match outcome.status {
            SwapStatus::InvoiceSettled => Ok(()),
            other => Err(Error::TransactionFailed(format!(
                "submarine swap ended in {other:?}"
            ))),
        }
    }

    /// refundSubmarineSwap: manual escape hatch for a swap restored from
    /// storage whose autonomous refund never ran (the engine wasn't alive to
    /// observe the failure transition).
    pub async fn refund_submarine_swap(&self, swap: &SubmarineSwap) -> Result<String> {
        self.refund(swap).await
    }

    /// The [`crate::monitor::ActionCallbacks::refund_ark`] implementation
    /// for submarine swaps, run automatically on `invoice.failedToPay` or
    /// `swap.expired` (§4.4). Always takes the `refundWithoutReceiver` leaf:
    /// the reference client never negotiates a cooperative refund with the
    /// provider either, since Boltz has no reason to cooperate once it's
    /// already failed to pay.
    pub(crate) async fn refund(&self, swap: &SubmarineSwap) -> Result<String> {
        let response = swap
            .response
            .as_ref()
            .ok_or_else(|| Error::validation("submarine swap has no provider response"))?;

        let preimage_hash = submarine_preimage_hash(
            Bolt11Invoice::from_str(&swap.request.invoice)
                .map_err(|e| Error::validation(format!("invalid stored invoice: {e}")))?
                .payment_hash()
                .as_byte_array(),
        );
        let vhtlc = VhtlcScript::from_swap_tree(
            &response.swap_tree,
            swap.request.refund_public_key,
            response.claim_public_key,
            self.ctx.ark_info.server_pubkey(),
            preimage_hash,
            self.ctx.config.network.to_bitcoin_network(),
        )?;

        let refund_to = self.ctx.own_address();
        tx_builder::refund_without_receiver(&vhtlc, &refund_to, self.ctx.wallet.as_ref()).await
    }
}

/// The VHTLC hash lock is the ripemd160 of the invoice's own (sha256)
/// payment hash, matching the reference client's `prepare_ln_invoice_payment`.
/// Shared by `create_submarine_swap` and `refund` so both derive the same
/// leaf hash from whatever invoice they're holding.
fn submarine_preimage_hash(payment_hash: &[u8; 32]) -> ripemd160::Hash {
    ripemd160::Hash::hash(payment_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::network::ArkNetwork;
    use crate::provider::{
        CoSignedRefund, QuoteResponse, RefundSubmission, StatusResponse, SwapFeesAndLimits, SwapProvider,
        TransactionResponse,
    };
    use crate::swap::{ChainRequest, ChainResponse, ReverseRequest, ReverseResponse};
    use crate::repository::memory::MemoryStore;
    use crate::repository::SwapRepository;
    use crate::wallet::stub::{StubArkInfo, StubWallet};
    use async_trait::async_trait;
    use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};

    struct UncalledProvider;

    #[async_trait]
    impl SwapProvider for UncalledProvider {
        fn api_url(&self) -> &str {
            "http://unused.invalid"
        }
        fn ws_url(&self) -> &str {
            "ws://unused.invalid"
        }
        async fn get_submarine_fees(&self) -> Result<SwapFeesAndLimits> {
            unreachable!("not exercised by this test")
        }
        async fn get_reverse_fees(&self) -> Result<SwapFeesAndLimits> {
            unreachable!("not exercised by this test")
        }
        async fn get_chain_fees(&self) -> Result<SwapFeesAndLimits> {
            unreachable!("not exercised by this test")
        }
        async fn create_submarine_swap(&self, _request: &SubmarineRequest) -> Result<(String, crate::swap::SubmarineResponse)> {
            unreachable!("an invalid invoice must never reach the provider")
        }
        async fn create_reverse_swap(&self, _request: &ReverseRequest) -> Result<(String, ReverseResponse)> {
            unreachable!("not exercised by this test")
        }
        async fn create_chain_swap(&self, _request: &ChainRequest) -> Result<(String, ChainResponse)> {
            unreachable!("not exercised by this test")
        }
        async fn get_swap_status(&self, _id: &str) -> Result<StatusResponse> {
            unreachable!("not exercised by this test")
        }
        async fn submit_submarine_refund(&self, _id: &str, _refund: &RefundSubmission) -> Result<CoSignedRefund> {
            unreachable!("not exercised by this test")
        }
        async fn get_submarine_preimage(&self, _id: &str) -> Result<String> {
            unreachable!("not exercised by this test")
        }
        async fn get_reverse_transaction(&self, _id: &str) -> Result<TransactionResponse> {
            unreachable!("not exercised by this test")
        }
        async fn get_chain_quote(&self, _id: &str) -> Result<QuoteResponse> {
            unreachable!("not exercised by this test")
        }
        async fn post_chain_quote(&self, _id: &str, _amount: u64) -> Result<QuoteResponse> {
            unreachable!("not exercised by this test")
        }
    }

    async fn test_engine() -> SubmarineEngine<MemoryStore> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &SecretKey::from_slice(&[0x55; 32]).unwrap());
        let server = keypair.x_only_public_key().0;
        let repository = Arc::new(SwapRepository::open(MemoryStore::new()).await.unwrap());
        let ctx = Arc::new(EngineContext {
            provider: Arc::new(UncalledProvider),
            wallet: Arc::new(StubWallet::new(vec![])),
            ark_info: Arc::new(StubArkInfo { server_pubkey: server }),
            repository,
            config: Config::for_network(ArkNetwork::Regtest),
        });
        SubmarineEngine::new(ctx)
    }

    #[tokio::test]
    async fn invalid_invoice_string_is_rejected_before_any_network_call() {
        let engine = test_engine().await;
        let err = engine
            .create_submarine_swap("not-an-invoice".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn submarine_preimage_hash_is_ripemd160_of_the_payment_hash_not_an_echo() {
        let a = [0x5cu8; 32];
        let b = [0x6du8; 32];
        assert_eq!(submarine_preimage_hash(&a), ripemd160::Hash::hash(&a));
        assert_ne!(submarine_preimage_hash(&a), submarine_preimage_hash(&b));
    }
}
