//! Reverse Engine (C7): the provider pays a Lightning invoice we generate,
//! we claim the resulting VHTLC on Ark once the provider's lockup
//! transaction lands (§4.7). Grounded on the reference client's
//! `get_ln_invoice`/`get_ln_invoice_from_hash` for invoice generation and
//! `claim_vhtlc` for the claim path.

use crate::engines::{now_unix, EngineContext};
use crate::error::{Error, Result};
use crate::monitor::SwapMonitor;
use crate::repository::KeyValueStore;
use crate::swap::{ReverseRequest, ReverseSwap, Swap, SwapCommon, SwapStatus};
use crate::tx_builder;
use crate::vhtlc::VhtlcScript;
use bitcoin::hashes::{ripemd160, sha256, Hash};
use lightning_invoice::Bolt11Invoice;
use rand::RngCore;
use std::str::FromStr;
use std::sync::Arc;

/// Result of [`ReverseEngine::create_lightning_invoice`]: everything the
/// caller needs to display the invoice and later resume the claim.
pub struct GeneratedInvoice {
    pub invoice: String,
    pub payment_hash: String,
    pub expiry: u32,
    pub amount_sat: u64,
    pub swap: ReverseSwap,
}

pub struct ReverseEngine<S: KeyValueStore> {
    ctx: Arc<EngineContext<S>>,
}

impl<S: KeyValueStore> ReverseEngine<S> {
    pub fn new(ctx: Arc<EngineContext<S>>) -> Self {
        Self { ctx }
    }

    /// createLightningInvoice: generates the preimage ourselves (we are
    /// always the receiver in a reverse swap), submits its hash, then
    /// verifies the provider's invoice and VHTLC both commit to it (I2)
    /// before handing anything back to the caller.
    pub async fn create_lightning_invoice(
        &self,
        amount_sat: u64,
        description: Option<String>,
    ) -> Result<GeneratedInvoice> {
        let mut preimage = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut preimage);
        let payment_hash = sha256::Hash::hash(&preimage);

        let description = description.filter(|d| !d.trim().is_empty());
        let request = ReverseRequest {
            preimage_hash: hex::encode(payment_hash.as_byte_array()),
            claim_public_key: self.ctx.wallet.public_key(),
            invoice_amount: amount_sat,
            description,
        };

        let (id, response) = self.ctx.provider.create_reverse_swap(&request).await?;

        let invoice = Bolt11Invoice::from_str(&response.invoice)
            .map_err(|e| Error::schema(format!("provider returned an unparseable invoice: {e}")))?;
        if invoice.payment_hash().as_byte_array() != payment_hash.as_byte_array() {
            return Err(Error::Security(
                "provider's invoice commits to a different payment hash than requested".to_string(),
            ));
        }

        let script_hash = ripemd160::Hash::hash(payment_hash.as_byte_array());
        let vhtlc = VhtlcScript::from_swap_tree(
            &response.swap_tree,
            response.refund_public_key,
            request.claim_public_key,
            self.ctx.ark_info.server_pubkey(),
            script_hash,
            self.ctx.config.network.to_bitcoin_network(),
        )?;
        if vhtlc.address().encode() != response.lockup_address {
            return Err(Error::Security(
                "Boltz is trying to scam us (invalid address)".to_string(),
            ));
        }

        let expiry = invoice.expiry_time().as_secs() as u32;
        let invoice_string = response.invoice.clone();
        let swap = ReverseSwap {
            common: SwapCommon {
                id,
                status: SwapStatus::SwapCreated,
                created_at: now_unix(),
            },
            preimage: Some(preimage),
            request,
            response: Some(response),
        };
        self.ctx
            .repository
            .save(Swap::Reverse(swap.clone()).to_record())
            .await?;

        Ok(GeneratedInvoice {
            invoice: invoice_string,
            payment_hash: hex::encode(payment_hash.as_byte_array()),
            expiry,
            amount_sat,
            swap,
        })
    }

    /// waitAndClaim: registers the swap with the monitor and blocks until
    /// `transaction.claimed` (the autonomous claim already ran) or a
    /// failure status, returning the claim txid on success.
    pub async fn wait_and_claim(&self, monitor: &SwapMonitor, swap: ReverseSwap) -> Result<String> {
        let id = swap.common.id.clone();
        monitor.add_swap(Swap::Reverse(swap));
        let outcome = monitor.wait_for_swap_completion(&id).await?;
        outcome
            .txid
            .ok_or_else(|| Error::TransactionFailed("reverse swap completed without a claim txid".to_string()))
    }

    /// getPendingReverseSwaps: every stored reverse swap not yet in a
    /// terminal state, for resuming after a restart.
    pub async fn get_pending_reverse_swaps(&self) -> Vec<ReverseSwap> {
        self.ctx
            .repository
            .get_pending()
            .await
            .iter()
            .filter_map(|record| match Swap::from_record(record) {
                Ok(Swap::Reverse(s)) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// getSwapHistory: every reverse swap ever persisted, terminal or not.
    pub async fn get_swap_history(&self) -> Vec<ReverseSwap> {
        self.ctx
            .repository
            .get_all()
            .await
            .iter()
            .filter_map(|record| match Swap::from_record(record) {
                Ok(Swap::Reverse(s)) => Some(s),
                _ => None,
            })
            .collect()
    }

    /// The [`crate::monitor::ActionCallbacks::claim_ark`] implementation for
    /// reverse swaps, run automatically once the provider's lockup
    /// transaction reaches mempool or confirmation.
    pub(crate) async fn claim(&self, swap: &ReverseSwap) -> Result<String> {
        let preimage = swap
            .preimage
            .ok_or_else(|| Error::validation("reverse swap missing preimage, cannot claim"))?;
        let response = swap
            .response
            .as_ref()
            .ok_or_else(|| Error::validation("reverse swap has no provider response"))?;

        let script_hash = ripemd160::Hash::hash(sha256::Hash::hash(&preimage).as_byte_array());
        let vhtlc = VhtlcScript::from_swap_tree(
            &response.swap_tree,
            response.refund_public_key,
            swap.request.claim_public_key,
            self.ctx.ark_info.server_pubkey(),
            script_hash,
            self.ctx.config.network.to_bitcoin_network(),
        )?;

        tx_builder::claim(&vhtlc, &preimage, self.ctx.wallet.as_ref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preimage_generation_derives_both_hash_layers() {
        let mut preimage = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut preimage);
        let payment_hash = sha256::Hash::hash(&preimage);
        let script_hash = ripemd160::Hash::hash(payment_hash.as_byte_array());
        // The BOLT11 payment hash and the VHTLC script hash must differ:
        // one is sha256(preimage), the other ripemd160(sha256(preimage)).
        assert_ne!(payment_hash.as_byte_array().as_slice(), script_hash.as_byte_array().as_slice());
    }

    #[test]
    fn blank_description_is_normalized_to_none() {
        let description = Some("   ".to_string()).filter(|d| !d.trim().is_empty());
        assert!(description.is_none());
    }
}
