//! Ark address encoding: bech32m over `serverPubkey || vtxoTaprootKey`.
//!
//! Two x-only keys are packed into the data payload so that a wallet can
//! recover which Ark server to talk to directly from an address, instead of
//! requiring the caller to supply the server pubkey out of band.

use crate::error::{Error, Result};
use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32m, Hrp};
use bitcoin::secp256k1::XOnlyPublicKey;
use bitcoin::Network;

const MAINNET_HRP: &str = "ark";
const OTHER_HRP: &str = "tark";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArkAddress {
    network: Network,
    server: XOnlyPublicKey,
    vtxo_taproot_key: XOnlyPublicKey,
}

impl ArkAddress {
    pub fn new(network: Network, server: XOnlyPublicKey, vtxo_taproot_key: XOnlyPublicKey) -> Self {
        Self {
            network,
            server,
            vtxo_taproot_key,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn server(&self) -> XOnlyPublicKey {
        self.server
    }

    pub fn vtxo_taproot_key(&self) -> XOnlyPublicKey {
        self.vtxo_taproot_key
    }

    fn hrp_str(network: Network) -> &'static str {
        match network {
            Network::Bitcoin => MAINNET_HRP,
            _ => OTHER_HRP,
        }
    }

    pub fn encode(&self) -> String {
        let hrp = Hrp::parse(Self::hrp_str(self.network)).expect("static HRP is valid");
        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(&self.server.serialize());
        data.extend_from_slice(&self.vtxo_taproot_key.serialize());
        bech32::encode::<Bech32m>(hrp, &data).expect("fixed-size payload always encodes")
    }

    pub fn decode(address: &str) -> Result<Self> {
        let parsed = CheckedHrpstring::new::<Bech32m>(address)
            .map_err(|e| Error::validation(format!("invalid bech32m address: {e}")))?;
        let hrp = parsed.hrp();
        let network = match hrp.as_str() {
            MAINNET_HRP => Network::Bitcoin,
            OTHER_HRP => Network::Testnet,
            other => {
                return Err(Error::validation(format!(
                    "unrecognised address HRP: {other}"
                )))
            }
        };

        let data: Vec<u8> = parsed.byte_iter().collect();
        if data.len() != 64 {
            return Err(Error::validation(format!(
                "ark address payload must be 64 bytes, got {}",
                data.len()
            )));
        }

        let server = XOnlyPublicKey::from_slice(&data[..32])
            .map_err(|e| Error::validation(format!("invalid server pubkey in address: {e}")))?;
        let vtxo_taproot_key = XOnlyPublicKey::from_slice(&data[32..])
            .map_err(|e| Error::validation(format!("invalid vtxo key in address: {e}")))?;

        Ok(Self {
            network,
            server,
            vtxo_taproot_key,
        })
    }
}

impl std::fmt::Display for ArkAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}
