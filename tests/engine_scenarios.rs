//! End-to-end scenario tests driven entirely through the public API
//! (`ActionCallbacks`, `ChainEngine::verify_chain_swap`), against
//! `StubWallet`/`StubArkInfo` and hand-built VHTLC fixtures — the same
//! construction technique `vhtlc.rs`'s own `from_swap_tree_rebuilds_the_same_address`
//! test uses, just exercised from outside the crate.
//!
//! Submarine refund (the second scenario) isn't repeated here: its
//! autonomous path re-parses the stored BOLT11 invoice, and hand-typing a
//! cryptographically valid invoice string without the toolchain to check it
//! against would be building on sand. That path already has coverage in
//! `engines/submarine.rs`'s own unit tests and in `monitor.rs`'s
//! restored-swap tests.

use ark_swap_engine::wallet::stub::{StubArkInfo, StubWallet};
use ark_swap_engine::wallet::VtxoInfo;
use ark_swap_engine::{ActionCallbacks, ArkNetwork, Config, Error, Swap, Wallet};
use ark_swap_engine::repository::memory::MemoryStore;
use ark_swap_engine::repository::SwapRepository;
use ark_swap_engine::vhtlc::VhtlcOptions;
use async_trait::async_trait;
use bitcoin::hashes::{ripemd160, sha256, Hash};
use bitcoin::hex::DisplayHex;
use bitcoin::secp256k1::{Keypair, Secp256k1, SecretKey, XOnlyPublicKey};
use bitcoin::{Amount, Network, OutPoint, ScriptBuf, Sequence, Txid};
use std::str::FromStr;
use std::sync::Arc;

fn keypair_from(byte: u8) -> Keypair {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
    Keypair::from_secret_key(&secp, &secret)
}

fn xonly(byte: u8) -> XOnlyPublicKey {
    keypair_from(byte).x_only_public_key().0
}

fn leaf_tree(options: &VhtlcOptions) -> ark_swap_engine::swap::SwapTree {
    ark_swap_engine::swap::SwapTree {
        claim_leaf: options.claim_script().as_bytes().to_lower_hex_string(),
        refund_leaf: options.refund_script().as_bytes().to_lower_hex_string(),
        refund_without_receiver_leaf: options
            .refund_without_receiver_script()
            .as_bytes()
            .to_lower_hex_string(),
        unilateral_claim_leaf: options.unilateral_claim_script().as_bytes().to_lower_hex_string(),
        unilateral_refund_leaf: options.unilateral_refund_script().as_bytes().to_lower_hex_string(),
        unilateral_refund_without_receiver_leaf: options
            .unilateral_refund_without_receiver_script()
            .as_bytes()
            .to_lower_hex_string(),
    }
}

fn sample_vtxo() -> VtxoInfo {
    VtxoInfo {
        outpoint: OutPoint::new(Txid::from_str(&"ab".repeat(32)).unwrap(), 0),
        amount: Amount::from_sat(49_600),
        script_pubkey: ScriptBuf::new(),
    }
}

struct NeverCalledProvider;

#[async_trait]
impl ark_swap_engine::provider::SwapProvider for NeverCalledProvider {
    fn api_url(&self) -> &str {
        "http://unused.invalid"
    }
    fn ws_url(&self) -> &str {
        "ws://unused.invalid"
    }
    async fn get_submarine_fees(&self) -> ark_swap_engine::Result<ark_swap_engine::provider::SwapFeesAndLimits> {
        unreachable!("not exercised by these scenarios")
    }
    async fn get_reverse_fees(&self) -> ark_swap_engine::Result<ark_swap_engine::provider::SwapFeesAndLimits> {
        unreachable!("not exercised by these scenarios")
    }
    async fn get_chain_fees(&self) -> ark_swap_engine::Result<ark_swap_engine::provider::SwapFeesAndLimits> {
        unreachable!("not exercised by these scenarios")
    }
    async fn create_submarine_swap(
        &self,
        _request: &ark_swap_engine::swap::SubmarineRequest,
    ) -> ark_swap_engine::Result<(String, ark_swap_engine::swap::SubmarineResponse)> {
        unreachable!("not exercised by these scenarios")
    }
    async fn create_reverse_swap(
        &self,
        _request: &ark_swap_engine::swap::ReverseRequest,
    ) -> ark_swap_engine::Result<(String, ark_swap_engine::swap::ReverseResponse)> {
        unreachable!("not exercised by these scenarios")
    }
    async fn create_chain_swap(
        &self,
        _request: &ark_swap_engine::swap::ChainRequest,
    ) -> ark_swap_engine::Result<(String, ark_swap_engine::swap::ChainResponse)> {
        unreachable!("not exercised by these scenarios")
    }
    async fn get_swap_status(&self, _id: &str) -> ark_swap_engine::Result<ark_swap_engine::provider::StatusResponse> {
        unreachable!("not exercised by these scenarios")
    }
    async fn submit_submarine_refund(
        &self,
        _id: &str,
        _refund: &ark_swap_engine::provider::RefundSubmission,
    ) -> ark_swap_engine::Result<ark_swap_engine::provider::CoSignedRefund> {
        unreachable!("not exercised by these scenarios")
    }
    async fn get_submarine_preimage(&self, _id: &str) -> ark_swap_engine::Result<String> {
        unreachable!("not exercised by these scenarios")
    }
    async fn get_reverse_transaction(
        &self,
        _id: &str,
    ) -> ark_swap_engine::Result<ark_swap_engine::provider::TransactionResponse> {
        unreachable!("not exercised by these scenarios")
    }
    async fn get_chain_quote(&self, _id: &str) -> ark_swap_engine::Result<ark_swap_engine::provider::QuoteResponse> {
        unreachable!("not exercised by these scenarios")
    }
    async fn post_chain_quote(
        &self,
        _id: &str,
        _amount: u64,
    ) -> ark_swap_engine::Result<ark_swap_engine::provider::QuoteResponse> {
        unreachable!("not exercised by these scenarios")
    }
}

async fn engine(
    wallet: StubWallet,
    server: XOnlyPublicKey,
) -> Arc<ark_swap_engine::SwapEngine<MemoryStore>> {
    let repository = Arc::new(SwapRepository::open(MemoryStore::new()).await.unwrap());
    Arc::new(ark_swap_engine::SwapEngine::new(
        Config::for_network(ArkNetwork::Regtest),
        Arc::new(NeverCalledProvider),
        Arc::new(wallet),
        Arc::new(StubArkInfo { server_pubkey: server }),
        repository,
    ))
}

/// Scenario 1 (SPEC_FULL §8): reverse claim. A swap with a known preimage
/// and a VHTLC whose tree we built ourselves claims cleanly once asked.
#[tokio::test]
async fn reverse_claim_spends_the_vtxo_with_the_known_preimage() {
    let server = xonly(0x01);
    let receiver = xonly(0x02); // our own claim key
    let sender = xonly(0x03); // the provider's refund key for this leg

    let mut preimage = [0u8; 32];
    preimage[0] = 0xab;
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
    let vhtlc = ark_swap_engine::vhtlc::VhtlcScript::new(options.clone(), Network::Regtest).unwrap();

    let wallet = StubWallet::new(vec![sample_vtxo()]);
    assert_eq!(wallet.public_key(), receiver, "fixture must use the stub wallet's own key as receiver");

    let engine = engine(wallet, server).await;

    let swap = Swap::Reverse(ark_swap_engine::swap::ReverseSwap {
        common: ark_swap_engine::swap::SwapCommon {
            id: "reverse-1".to_string(),
            status: ark_swap_engine::SwapStatus::TransactionMempool,
            created_at: 0,
        },
        preimage: Some(preimage),
        request: ark_swap_engine::swap::ReverseRequest {
            preimage_hash: hex::encode(sha256::Hash::hash(&preimage).as_byte_array()),
            claim_public_key: receiver,
            invoice_amount: 50_000,
            description: Some("Coffee".to_string()),
        },
        response: Some(ark_swap_engine::swap::ReverseResponse {
            invoice: "lnbc-fixture-never-parsed-by-claim".to_string(),
            lockup_address: vhtlc.address().encode(),
            refund_public_key: sender,
            onchain_amount: 49_600,
            timeout_block_height: 1_000,
            swap_tree: leaf_tree(&options),
        }),
    });

    let txid = engine.claim_ark(&swap).await.unwrap();
    assert_eq!(txid, "stub-ark-txid");
}

/// Scenario 3 (SPEC_FULL §8): chain Ark→BTC lockup failure drives an
/// autonomous refund of the lockup leg back to the user, without ever
/// needing Boltz's cooperation.
#[tokio::test]
async fn chain_lockup_failure_refunds_without_receiver_cooperation() {
    let server = xonly(0x11);
    let our_key = xonly(0x12); // we are sender on the lockup leg
    let boltz_key = xonly(0x13); // receiver on the lockup leg

    let mut preimage = [0u8; 32];
    preimage[0] = 0xcd;
    let preimage_hash = ripemd160::Hash::hash(sha256::Hash::hash(&preimage).as_byte_array());

    let lockup_options = VhtlcOptions {
        sender: our_key,
        receiver: boltz_key,
        server,
        preimage_hash,
        refund_locktime: 100,
        unilateral_claim_delay: Sequence::from_height(200),
        unilateral_refund_delay: Sequence::from_height(300),
        unilateral_refund_without_receiver_delay: Sequence::from_height(400),
    };
    let lockup_vhtlc = ark_swap_engine::vhtlc::VhtlcScript::new(lockup_options.clone(), Network::Regtest).unwrap();

    // The claim leg is never exercised by `refund`, but `ChainResponse`
    // requires one; reuse the same shape with roles swapped.
    let claim_options = VhtlcOptions {
        sender: boltz_key,
        receiver: our_key,
        server,
        preimage_hash,
        refund_locktime: 100,
        unilateral_claim_delay: Sequence::from_height(200),
        unilateral_refund_delay: Sequence::from_height(300),
        unilateral_refund_without_receiver_delay: Sequence::from_height(400),
    };
    let claim_vhtlc = ark_swap_engine::vhtlc::VhtlcScript::new(claim_options.clone(), Network::Regtest).unwrap();

    let wallet = StubWallet::new(vec![sample_vtxo()]);
    assert_eq!(wallet.public_key(), our_key);

    let engine = engine(wallet, server).await;

    let swap = Swap::Chain(ark_swap_engine::swap::ChainSwap {
        common: ark_swap_engine::swap::SwapCommon {
            id: "chain-1".to_string(),
            status: ark_swap_engine::SwapStatus::TransactionLockupFailed,
            created_at: 0,
        },
        direction: ark_swap_engine::swap::ChainDirection::ArkToBtc,
        ephemeral_key: our_key,
        preimage: Some(preimage),
        request: ark_swap_engine::swap::ChainRequest {
            direction: ark_swap_engine::swap::ChainDirection::ArkToBtc,
            claim_public_key: our_key,
            refund_public_key: our_key,
            preimage_hash: hex::encode(sha256::Hash::hash(&preimage).as_byte_array()),
            sender_lock_amount: Some(21_000),
            receiver_lock_amount: None,
        },
        response: Some(ark_swap_engine::swap::ChainResponse {
            claim: ark_swap_engine::swap::ChainLeg {
                lockup_address: claim_vhtlc.address().encode(),
                amount: 21_000,
                timeout_block_height: 1_000,
                swap_tree: leaf_tree(&claim_options),
            },
            lockup: ark_swap_engine::swap::ChainLeg {
                lockup_address: lockup_vhtlc.address().encode(),
                amount: 11_000,
                timeout_block_height: 1_000,
                swap_tree: leaf_tree(&lockup_options),
            },
            expected_amount: 21_000,
        }),
        fee_sats_per_byte: None,
        to_address: None,
    });

    let txid = engine.refund_ark(&swap).await.unwrap();
    assert_eq!(txid, "stub-ark-txid");
}

/// Scenario 4 (SPEC_FULL §8): a provider that quotes a lockup address not
/// matching the locally rebuilt VHTLC is caught before anything is trusted.
#[tokio::test]
async fn verify_chain_swap_rejects_a_mismatched_lockup_address() {
    let server = xonly(0x21);
    let our_key = xonly(0x22);
    let boltz_key = xonly(0x23);

    let preimage_hash = ripemd160::Hash::hash(&[0x55u8; 32]);
    let options = VhtlcOptions {
        sender: our_key,
        receiver: boltz_key,
        server,
        preimage_hash,
        refund_locktime: 100,
        unilateral_claim_delay: Sequence::from_height(200),
        unilateral_refund_delay: Sequence::from_height(300),
        unilateral_refund_without_receiver_delay: Sequence::from_height(400),
    };
    let swap = ark_swap_engine::swap::ChainSwap {
        common: ark_swap_engine::swap::SwapCommon {
            id: "chain-scam".to_string(),
            status: ark_swap_engine::SwapStatus::SwapCreated,
            created_at: 0,
        },
        direction: ark_swap_engine::swap::ChainDirection::ArkToBtc,
        ephemeral_key: our_key,
        preimage: None,
        request: ark_swap_engine::swap::ChainRequest {
            direction: ark_swap_engine::swap::ChainDirection::ArkToBtc,
            claim_public_key: our_key,
            refund_public_key: our_key,
            preimage_hash: hex::encode(preimage_hash.as_byte_array()),
            sender_lock_amount: Some(21_000),
            receiver_lock_amount: None,
        },
        response: Some(ark_swap_engine::swap::ChainResponse {
            claim: ark_swap_engine::swap::ChainLeg {
                lockup_address: "ark1fakefakefakefakefakefakefakefake".to_string(),
                amount: 21_000,
                timeout_block_height: 1_000,
                swap_tree: leaf_tree(&options),
            },
            lockup: ark_swap_engine::swap::ChainLeg {
                lockup_address: "ark1fakefakefakefakefakefakefakefake".to_string(),
                amount: 21_000,
                timeout_block_height: 1_000,
                swap_tree: leaf_tree(&options),
            },
            expected_amount: 21_000,
        }),
        fee_sats_per_byte: None,
        to_address: None,
    };

    let wallet = StubWallet::new(vec![]);
    let e = engine(wallet, server).await;
    let result = e.chain().verify_chain_swap(&swap);

    match result {
        Err(Error::Security(_)) => {}
        other => panic!("expected a SecurityError on mismatched lockup address, got {other:?}"),
    }
}
