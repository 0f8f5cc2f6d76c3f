//! External collaborators named out of scope (§1): the signing identity and
//! chain-info source. Modeled as trait seams so engines and the transaction
//! builder can be tested against a stub, following the `ArkWallet`/
//! `Lightning` trait pattern used for the same purpose in the corpus.

use crate::address::ArkAddress;
use crate::error::Result;
use async_trait::async_trait;
use bitcoin::secp256k1::{schnorr, Message, XOnlyPublicKey};
use bitcoin::{Amount, OutPoint, ScriptBuf};

/// A single spendable virtual UTXO at a VHTLC address.
#[derive(Debug, Clone)]
pub struct VtxoInfo {
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub script_pubkey: ScriptBuf,
}

/// The signing identity and Ark-network access the engines build transactions
/// against. Everything here suspends on network or signing hardware, so
/// every method is async (§5 suspension points).
#[async_trait]
pub trait Wallet: Send + Sync {
    /// The x-only public key this wallet signs with, used as the `sender`
    /// or `receiver` role in a VHTLC depending on swap direction.
    fn public_key(&self) -> XOnlyPublicKey;

    /// Schnorr-signs a BIP-341 sighash for a VHTLC script-path spend. The
    /// wallet owns the secret key; callers only ever see signatures.
    async fn sign_schnorr(&self, message: &Message) -> Result<schnorr::Signature>;

    /// Lists spendable VTXOs at an Ark address, used to find VHTLC funds
    /// that are ready to claim or refund.
    async fn list_vtxos(&self, address: &ArkAddress) -> Result<Vec<VtxoInfo>>;

    /// Sends funds from the wallet's own balance to an Ark address, used by
    /// the submarine engine to lock funds into a freshly created VHTLC.
    async fn send_to_address(&self, address: &ArkAddress, amount: Amount) -> Result<String>;

    /// Submits a fully witnessed Ark transaction spending the given VTXOs,
    /// returning the resulting Ark txid once the server countersigns and
    /// broadcasts it.
    async fn submit_ark_transaction(
        &self,
        inputs: &[VtxoInfo],
        witnesses: &[Vec<Vec<u8>>],
        output_address: &ArkAddress,
        output_amount: Amount,
    ) -> Result<String>;
}

/// Chain-info the engines need but do not own: dust limit, address HRP, the
/// server's own pubkey, and the exit delay it enforces.
#[async_trait]
pub trait ArkInfoProvider: Send + Sync {
    fn server_pubkey(&self) -> XOnlyPublicKey;
    fn dust_amount(&self) -> Amount;
    fn hrp(&self) -> &'static str;
    async fn unilateral_exit_delay(&self) -> Result<bitcoin::Sequence>;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod stub {
    use super::*;
    use bitcoin::secp256k1::{Keypair, Secp256k1};
    use std::sync::Mutex;

    /// In-memory wallet stub: signs for real with a fixed key, serves VTXOs
    /// and records submitted transactions from fixed lists so engine tests
    /// can assert on what was sent without touching any network.
    pub struct StubWallet {
        keypair: Keypair,
        vtxos: Mutex<Vec<VtxoInfo>>,
        pub submitted: Mutex<Vec<(ArkAddress, Amount)>>,
        pub sent: Mutex<Vec<(ArkAddress, Amount)>>,
    }

    impl StubWallet {
        pub fn new(vtxos: Vec<VtxoInfo>) -> Self {
            let secp = Secp256k1::new();
            let keypair = Keypair::from_seckey_slice(&secp, &[0x11; 32]).expect("valid seckey");
            Self {
                keypair,
                vtxos: Mutex::new(vtxos),
                submitted: Mutex::new(Vec::new()),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Wallet for StubWallet {
        fn public_key(&self) -> XOnlyPublicKey {
            self.keypair.x_only_public_key().0
        }

        async fn sign_schnorr(&self, message: &Message) -> Result<schnorr::Signature> {
            let secp = Secp256k1::new();
            Ok(secp.sign_schnorr_no_aux_rand(message, &self.keypair))
        }

        async fn list_vtxos(&self, _address: &ArkAddress) -> Result<Vec<VtxoInfo>> {
            Ok(self.vtxos.lock().unwrap().clone())
        }

        async fn send_to_address(&self, address: &ArkAddress, amount: Amount) -> Result<String> {
            self.sent.lock().unwrap().push((*address, amount));
            Ok("stub-txid".to_string())
        }

        async fn submit_ark_transaction(
            &self,
            inputs: &[VtxoInfo],
            _witnesses: &[Vec<Vec<u8>>],
            output_address: &ArkAddress,
            output_amount: Amount,
        ) -> Result<String> {
            self.vtxos
                .lock()
                .unwrap()
                .retain(|v| !inputs.iter().any(|i| i.outpoint == v.outpoint));
            self.submitted
                .lock()
                .unwrap()
                .push((*output_address, output_amount));
            Ok("stub-ark-txid".to_string())
        }
    }

    pub struct StubArkInfo {
        pub server_pubkey: XOnlyPublicKey,
    }

    #[async_trait]
    impl ArkInfoProvider for StubArkInfo {
        fn server_pubkey(&self) -> XOnlyPublicKey {
            self.server_pubkey
        }

        fn dust_amount(&self) -> Amount {
            Amount::from_sat(546)
        }

        fn hrp(&self) -> &'static str {
            "tark"
        }

        async fn unilateral_exit_delay(&self) -> Result<bitcoin::Sequence> {
            Ok(bitcoin::Sequence::from_height(144))
        }
    }
}
