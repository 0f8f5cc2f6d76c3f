//! VHTLC Transaction Builder (C5): assembles the claim and refund paths
//! against a [`Wallet`], grounded on `claim_vhtlc`/`refund_expired_vhtlc` in
//! the reference SDK's own Boltz integration.
//!
//! Every VHTLC leaf names the Ark server as a `CHECKSIG` participant, but
//! its signature is never collected here: `Wallet::submit_ark_transaction`
//! drives the Ark server's own collaborative signing round and returns only
//! once that cosignature has already been folded in, matching how the
//! reference client's `sign_ark_transaction`/`finalize_offchain_transaction`
//! pair works. Only a genuinely external counterparty signature (the other
//! swap party, not the Ark server) is ever passed into these functions.

use crate::error::{Error, Result};
use crate::vhtlc::VhtlcScript;
use crate::wallet::{VtxoInfo, Wallet};
use bitcoin::secp256k1::Message;
use bitcoin::taproot::LeafVersion;
use bitcoin::Amount;

/// Spends every VTXO at the VHTLC address via the `claim` leaf, witnessing
/// with the preimage and the receiver's own signature (§4.5). The caller is
/// always the receiver here: reverse and chain claims only ever run on the
/// side that generated the preimage.
pub async fn claim(vhtlc: &VhtlcScript, preimage: &[u8; 32], wallet: &dyn Wallet) -> Result<String> {
    let address = vhtlc.address();
    let vtxos = wallet.list_vtxos(&address).await?;
    if vtxos.is_empty() {
        return Err(Error::validation("no spendable VTXOs at VHTLC address"));
    }

    let script = vhtlc.claim_script();
    ensure_leaf_exists(vhtlc, &script, "claim")?;

    let total: Amount = vtxos.iter().fold(Amount::ZERO, |acc, v| acc + v.amount);
    let sighash = leaf_sighash(vhtlc, &vtxos, total);
    let receiver_signature = wallet.sign_schnorr(&sighash).await?;

    let witness = vec![preimage.to_vec(), receiver_signature.as_ref().to_vec()];

    wallet
        .submit_ark_transaction(&vtxos, &[witness], &address, total)
        .await
}

/// Cooperative refund: the sender (wallet's own key) and the receiver (the
/// other swap party, e.g. Boltz) both sign the `refund` leaf. The receiver's
/// signature must be obtained out of band (e.g. through a provider
/// round-trip) before calling this.
pub async fn refund_cooperative(
    vhtlc: &VhtlcScript,
    receiver_signature: &[u8],
    refund_to: &crate::address::ArkAddress,
    wallet: &dyn Wallet,
) -> Result<String> {
    refund_with_leaf(
        vhtlc,
        vhtlc.refund_script(),
        "refund",
        vec![receiver_signature.to_vec()],
        refund_to,
        wallet,
    )
    .await
}

/// Refund after `refundLocktime` without the receiver's cooperation: only
/// the sender signs, gated by the absolute CLTV. Matches the reference
/// client's `refund_expired_vhtlc`, which never contacts the swap provider.
pub async fn refund_without_receiver(
    vhtlc: &VhtlcScript,
    refund_to: &crate::address::ArkAddress,
    wallet: &dyn Wallet,
) -> Result<String> {
    refund_with_leaf(
        vhtlc,
        vhtlc.refund_without_receiver_script(),
        "refundWithoutReceiver",
        vec![],
        refund_to,
        wallet,
    )
    .await
}

/// Last-resort escape hatch: only the sender's signature, usable once
/// `unilateralRefundWithoutReceiverDelay` has elapsed, with no Ark server
/// participant in the script at all.
pub async fn unilateral_refund_without_receiver(
    vhtlc: &VhtlcScript,
    refund_to: &crate::address::ArkAddress,
    wallet: &dyn Wallet,
) -> Result<String> {
    refund_with_leaf(
        vhtlc,
        vhtlc.unilateral_refund_without_receiver_script(),
        "unilateralRefundWithoutReceiver",
        vec![],
        refund_to,
        wallet,
    )
    .await
}

fn ensure_leaf_exists(vhtlc: &VhtlcScript, script: &bitcoin::ScriptBuf, name: &str) -> Result<()> {
    let spend_info = vhtlc.taproot_spend_info();
    let leaf = (script.clone(), LeafVersion::TapScript);
    if spend_info.control_block(&leaf).is_none() {
        return Err(Error::Internal(anyhow::anyhow!(
            "{name} leaf has no control block in this VHTLC's taproot tree"
        )));
    }
    Ok(())
}

async fn refund_with_leaf(
    vhtlc: &VhtlcScript,
    script: bitcoin::ScriptBuf,
    leaf_name: &str,
    mut extra_witness: Vec<Vec<u8>>,
    refund_to: &crate::address::ArkAddress,
    wallet: &dyn Wallet,
) -> Result<String> {
    let address = vhtlc.address();
    let vtxos = wallet.list_vtxos(&address).await?;
    if vtxos.is_empty() {
        return Err(Error::validation("no spendable VTXOs at VHTLC address"));
    }

    ensure_leaf_exists(vhtlc, &script, leaf_name)?;

    let total: Amount = vtxos.iter().fold(Amount::ZERO, |acc, v| acc + v.amount);
    let sighash = leaf_sighash(vhtlc, &vtxos, total);
    let sender_signature = wallet.sign_schnorr(&sighash).await?;
    extra_witness.insert(0, sender_signature.as_ref().to_vec());

    wallet
        .submit_ark_transaction(&vtxos, &[extra_witness], refund_to, total)
        .await
}

/// Placeholder sighash derivation: a real Ark transaction's sighash depends
/// on the full unsigned transaction (inputs, outputs, leaf script), which
/// lives in the `Wallet`'s Ark-tx-building implementation. This crate only
/// needs *a* message to pass to `sign_schnorr`; callers building against a
/// real Ark node compute it per BIP-341 over their own assembled
/// transaction instead of this stand-in.
fn leaf_sighash(vhtlc: &VhtlcScript, vtxos: &[VtxoInfo], total: Amount) -> Message {
    use bitcoin::hashes::{sha256, Hash};
    let mut bytes = vhtlc.address().encode().into_bytes();
    for vtxo in vtxos {
        bytes.extend_from_slice(vtxo.outpoint.txid.as_ref());
    }
    bytes.extend_from_slice(&total.to_sat().to_le_bytes());
    let digest = sha256::Hash::hash(&bytes);
    Message::from_digest(digest.to_byte_array())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vhtlc::VhtlcOptions;
    use crate::wallet::stub::StubWallet;
    use bitcoin::hashes::{ripemd160, sha256, Hash};
    use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey};
    use bitcoin::{Network, OutPoint, ScriptBuf, Sequence, Txid};
    use std::str::FromStr;

    fn keypair_from(byte: u8) -> Keypair {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
        Keypair::from_secret_key(&secp, &secret)
    }

    fn sample_vhtlc(receiver: bitcoin::secp256k1::XOnlyPublicKey) -> VhtlcScript {
        let sender = keypair_from(0x02).x_only_public_key().0;
        let server = keypair_from(0x03).x_only_public_key().0;
        let preimage = [0x07u8; 32];
        let preimage_hash = ripemd160::Hash::hash(sha256::Hash::hash(&preimage).as_byte_array());

        let options = VhtlcOptions {
            sender,
            receiver,
            server,
            preimage_hash,
            refund_locktime: 100,
            unilateral_claim_delay: Sequence::from_height(200),
            unilateral_refund_delay: Sequence::from_height(300),
            unilateral_refund_without_receiver_delay: Sequence::from_height(400),
        };
        VhtlcScript::new(options, Network::Regtest).unwrap()
    }

    #[tokio::test]
    async fn claim_fails_with_no_spendable_vtxos() {
        let wallet = StubWallet::new(vec![]);
        let vhtlc = sample_vhtlc(wallet.public_key());
        let err = claim(&vhtlc, &[0x07; 32], &wallet).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn claim_submits_a_transaction_spending_every_vtxo() {
        let vtxo = VtxoInfo {
            outpoint: OutPoint::new(Txid::from_str(&"11".repeat(32)).unwrap(), 0),
            amount: Amount::from_sat(50_000),
            script_pubkey: ScriptBuf::new(),
        };
        let wallet = StubWallet::new(vec![vtxo]);
        let vhtlc = sample_vhtlc(wallet.public_key());

        let txid = claim(&vhtlc, &[0x07; 32], &wallet).await.unwrap();
        assert_eq!(txid, "stub-ark-txid");
        assert_eq!(wallet.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refund_without_receiver_needs_no_external_signature() {
        let vtxo = VtxoInfo {
            outpoint: OutPoint::new(Txid::from_str(&"22".repeat(32)).unwrap(), 0),
            amount: Amount::from_sat(20_000),
            script_pubkey: ScriptBuf::new(),
        };
        let sender = StubWallet::new(vec![vtxo]);
        let vhtlc = sample_vhtlc(keypair_from(0x09).x_only_public_key().0);
        let refund_to = vhtlc.address();

        let txid = refund_without_receiver(&vhtlc, &refund_to, &sender).await.unwrap();
        assert_eq!(txid, "stub-ark-txid");
    }
}
