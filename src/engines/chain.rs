//! Chain Engine (C8): swaps funds between Ark and mainchain Bitcoin via two
//! VHTLC-style legs, one per side, both funded around the same preimage
//! hash (§4.8). There's no single reference function this mirrors as
//! directly as C6/C7 do, since the reference SDK doesn't implement chain
//! swaps; the leg verification and claim paths are built from the same
//! `claim_vhtlc`/VHTLC-restoration primitives the other two engines use.

use crate::engines::{now_unix, EngineContext};
use crate::error::{Error, Result};
use crate::monitor::SwapMonitor;
use crate::repository::KeyValueStore;
use crate::script;
use crate::swap::{ChainDirection, ChainLeg, ChainRequest, ChainSwap, Swap, SwapCommon, SwapStatus};
use crate::tx_builder;
use crate::vhtlc::VhtlcScript;
use bitcoin::hashes::{ripemd160, sha256, Hash};
use bitcoin::secp256k1::XOnlyPublicKey;
use rand::RngCore;
use std::sync::Arc;

pub struct ChainEngine<S: KeyValueStore> {
    ctx: Arc<EngineContext<S>>,
}

impl<S: KeyValueStore> ChainEngine<S> {
    pub fn new(ctx: Arc<EngineContext<S>>) -> Self {
        Self { ctx }
    }

    /// arkToBtc: move funds from Ark to mainchain Bitcoin, landing the
    /// claimed BTC at `to_address` once the user claims the BTC-side leg.
    pub async fn ark_to_btc(
        &self,
        amount_sat: u64,
        to_address: String,
        fee_sats_per_byte: f64,
    ) -> Result<ChainSwap> {
        let mut swap = self.create_chain_swap(ChainDirection::ArkToBtc, amount_sat, None, None).await?;
        swap.to_address = Some(to_address);
        swap.fee_sats_per_byte = Some(fee_sats_per_byte);
        self.ctx.repository.save(Swap::Chain(swap.clone()).to_record()).await?;
        Ok(swap)
    }

    /// btcToArk: move funds from mainchain Bitcoin to Ark; the claim lands
    /// on the wallet's own Ark address, no destination needed.
    pub async fn btc_to_ark(&self, amount_sat: u64) -> Result<ChainSwap> {
        self.create_chain_swap(ChainDirection::BtcToArk, amount_sat, None, None).await
    }

    /// createChainSwap: the low-level entry point behind both directional
    /// helpers above. Rejects a request naming both lock amounts at once —
    /// Boltz's chain-swap API accepts exactly one "amount mode" per swap.
    pub async fn create_chain_swap(
        &self,
        direction: ChainDirection,
        amount_sat: u64,
        sender_lock_amount: Option<u64>,
        receiver_lock_amount: Option<u64>,
    ) -> Result<ChainSwap> {
        if sender_lock_amount.is_some() && receiver_lock_amount.is_some() {
            return Err(Error::validation(
                "sender_lock_amount and receiver_lock_amount are mutually exclusive",
            ));
        }

        let mut preimage = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut preimage);
        let payment_hash = sha256::Hash::hash(&preimage);

        // Simplification: this engine reuses the wallet's own identity key
        // as the swap's "ephemeral" key rather than minting and managing a
        // fresh secret per swap, since `Wallet` (this crate's signing
        // boundary, §1) exposes one signing identity, not per-swap key
        // derivation.
        let ephemeral_key = self.ctx.wallet.public_key();

        let sender_lock_amount = sender_lock_amount.or(if receiver_lock_amount.is_none() {
            Some(amount_sat)
        } else {
            None
        });

        let request = ChainRequest {
            direction,
            claim_public_key: ephemeral_key,
            refund_public_key: ephemeral_key,
            preimage_hash: hex::encode(payment_hash.as_byte_array()),
            sender_lock_amount,
            receiver_lock_amount,
        };

        let (id, response) = self.ctx.provider.create_chain_swap(&request).await?;

        let swap = ChainSwap {
            common: SwapCommon {
                id,
                status: SwapStatus::SwapCreated,
                created_at: now_unix(),
            },
            direction,
            ephemeral_key,
            preimage: Some(preimage),
            request,
            response: Some(response),
            fee_sats_per_byte: None,
            to_address: None,
        };

        self.verify_chain_swap(&swap)?;
        self.ctx
            .repository
            .save(Swap::Chain(swap.clone()).to_record())
            .await?;
        Ok(swap)
    }

    /// verifyChainSwap: rebuilds both legs' VHTLCs independently and checks
    /// their addresses against what the provider quoted (I2). The
    /// counterparty's pubkey on each leg isn't returned as a separate wire
    /// field, so it's recovered from the leg's own `claim` leaf script — an
    /// untrusted value, but one whose consistency with the rest of that
    /// leg's tree (and with our own known key and the server's) is exactly
    /// what this check is verifying.
    pub fn verify_chain_swap(&self, swap: &ChainSwap) -> Result<()> {
        let response = swap
            .response
            .as_ref()
            .ok_or_else(|| Error::validation("chain swap has no provider response"))?;
        let preimage_hash = ripemd160::Hash::hash(
            hex::decode(&swap.request.preimage_hash)
                .map_err(|e| Error::schema(format!("bad preimage hash hex: {e}")))?
                .as_slice(),
        );
        let network = self.ctx.config.network.to_bitcoin_network();
        let server = self.ctx.ark_info.server_pubkey();

        verify_leg(
            &response.claim,
            swap.ephemeral_key,
            Role::Receiver,
            server,
            preimage_hash,
            network,
        )?;
        verify_leg(
            &response.lockup,
            swap.ephemeral_key,
            Role::Sender,
            server,
            preimage_hash,
            network,
        )?;
        Ok(())
    }

    /// waitAndClaimArk: claims the Ark-side leg (the claim leg on a BTC→Ark
    /// swap). Blocks on the monitor reaching `transaction.claimed`.
    pub async fn wait_and_claim_ark(&self, monitor: &SwapMonitor, swap: ChainSwap) -> Result<String> {
        let id = swap.common.id.clone();
        monitor.add_swap(Swap::Chain(swap));
        let outcome = monitor.wait_for_swap_completion(&id).await?;
        outcome
            .txid
            .ok_or_else(|| Error::TransactionFailed("chain swap completed without a claim txid".to_string()))
    }

    /// waitAndClaimBtc: blocks until the BTC-side leg is claimed. Unlike
    /// the Ark leg, this crate never constructs or broadcasts the mainchain
    /// claim transaction itself — that's the Bitcoin-wallet collaborator's
    /// job (§1), driven by the `to_address`/`fee_sats_per_byte` supplied at
    /// creation. This only waits for the provider to report completion.
    pub async fn wait_and_claim_btc(&self, monitor: &SwapMonitor, swap: ChainSwap) -> Result<SwapStatus> {
        let id = swap.common.id.clone();
        monitor.add_swap(Swap::Chain(swap));
        let outcome = monitor.wait_for_swap_completion(&id).await?;
        Ok(outcome.status)
    }

    /// quoteSwap: re-quotes a swap created with a partial (receiver-only)
    /// lock amount, or accepts the provider's current quote.
    pub async fn quote_swap(&self, id: &str) -> Result<u64> {
        let quote = self.ctx.provider.get_chain_quote(id).await?;
        Ok(quote.amount)
    }

    pub async fn accept_quote(&self, id: &str, amount_sat: u64) -> Result<()> {
        self.ctx.provider.post_chain_quote(id, amount_sat).await?;
        Ok(())
    }

    /// The [`crate::monitor::ActionCallbacks::claim_ark`] implementation for
    /// chain swaps.
    pub(crate) async fn claim(&self, swap: &ChainSwap) -> Result<String> {
        let preimage = swap
            .preimage
            .ok_or_else(|| Error::validation("chain swap missing preimage, cannot claim"))?;
        let response = swap
            .response
            .as_ref()
            .ok_or_else(|| Error::validation("chain swap has no provider response"))?;

        let preimage_hash = ripemd160::Hash::hash(sha256::Hash::hash(&preimage).as_byte_array());
        let sender = extract_counterparty_key(&response.claim.swap_tree)?;
        let vhtlc = VhtlcScript::from_swap_tree(
            &response.claim.swap_tree,
            sender,
            swap.ephemeral_key,
            self.ctx.ark_info.server_pubkey(),
            preimage_hash,
            self.ctx.config.network.to_bitcoin_network(),
        )?;

        tx_builder::claim(&vhtlc, &preimage, self.ctx.wallet.as_ref()).await
    }

    /// The [`crate::monitor::ActionCallbacks::refund_ark`] implementation
    /// for chain swaps, run automatically on `transaction.lockupFailed`.
    pub(crate) async fn refund(&self, swap: &ChainSwap) -> Result<String> {
        let response = swap
            .response
            .as_ref()
            .ok_or_else(|| Error::validation("chain swap has no provider response"))?;

        let preimage_hash = ripemd160::Hash::hash(
            hex::decode(&swap.request.preimage_hash)
                .map_err(|e| Error::schema(format!("bad preimage hash hex: {e}")))?
                .as_slice(),
        );
        let receiver = extract_counterparty_key(&response.lockup.swap_tree)?;
        let vhtlc = VhtlcScript::from_swap_tree(
            &response.lockup.swap_tree,
            swap.ephemeral_key,
            receiver,
            self.ctx.ark_info.server_pubkey(),
            preimage_hash,
            self.ctx.config.network.to_bitcoin_network(),
        )?;

        let refund_to = self.ctx.own_address();
        tx_builder::refund_without_receiver(&vhtlc, &refund_to, self.ctx.wallet.as_ref()).await
    }
}

enum Role {
    Sender,
    Receiver,
}

fn verify_leg(
    leg: &ChainLeg,
    our_key: XOnlyPublicKey,
    our_role: Role,
    server: XOnlyPublicKey,
    preimage_hash: ripemd160::Hash,
    network: bitcoin::Network,
) -> Result<()> {
    let counterparty = extract_counterparty_key(&leg.swap_tree)?;
    let (sender, receiver) = match our_role {
        Role::Sender => (our_key, counterparty),
        Role::Receiver => (counterparty, our_key),
    };

    let vhtlc = VhtlcScript::from_swap_tree(&leg.swap_tree, sender, receiver, server, preimage_hash, network)?;
    if vhtlc.address().encode() != leg.lockup_address {
        return Err(Error::Security(
            "Boltz is trying to scam us (invalid address)".to_string(),
        ));
    }
    Ok(())
}

/// Recovers the other party's pubkey from a leg's `claim` script, the only
/// leaf that names both the receiver and the server in a fixed order.
fn extract_counterparty_key(tree: &crate::swap::SwapTree) -> Result<XOnlyPublicKey> {
    let bytes = hex::decode(&tree.claim_leaf).map_err(|e| Error::schema(format!("bad claim leaf hex: {e}")))?;
    let script = bitcoin::ScriptBuf::from(bytes);
    script::extract_checksig_pubkeys(&script)
        .into_iter()
        .next()
        .ok_or_else(|| Error::schema("claim leaf has no recoverable counterparty pubkey"))
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
    use crate::repository::memory::MemoryStore;
    use crate::repository::SwapRepository;
    use crate::swap::{ReverseRequest, ReverseResponse, SubmarineRequest, SubmarineResponse};
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
        async fn create_submarine_swap(&self, _request: &SubmarineRequest) -> Result<(String, SubmarineResponse)> {
            unreachable!("not exercised by this test")
        }
        async fn create_reverse_swap(&self, _request: &ReverseRequest) -> Result<(String, ReverseResponse)> {
            unreachable!("not exercised by this test")
        }
        async fn create_chain_swap(&self, _request: &ChainRequest) -> Result<(String, ChainResponse)> {
            unreachable!("a rejected mutually-exclusive-amount request must never reach the provider")
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

    async fn test_engine() -> ChainEngine<MemoryStore> {
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, &SecretKey::from_slice(&[0x66; 32]).unwrap());
        let server = keypair.x_only_public_key().0;
        let repository = Arc::new(SwapRepository::open(MemoryStore::new()).await.unwrap());
        let ctx = Arc::new(EngineContext {
            provider: Arc::new(UncalledProvider),
            wallet: Arc::new(StubWallet::new(vec![])),
            ark_info: Arc::new(StubArkInfo { server_pubkey: server }),
            repository,
            config: Config::for_network(ArkNetwork::Regtest),
        });
        ChainEngine::new(ctx)
    }

    #[tokio::test]
    async fn create_chain_swap_rejects_both_lock_amounts_at_once() {
        let engine = test_engine().await;
        let err = engine
            .create_chain_swap(ChainDirection::ArkToBtc, 10_000, Some(1_000), Some(2_000))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
