//! Supported networks and the config each one implies.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArkNetwork {
    Mainnet,
    Testnet,
    Signet,
    Mutinynet,
    Regtest,
}

impl ArkNetwork {
    pub fn to_bitcoin_network(self) -> bitcoin::Network {
        match self {
            ArkNetwork::Mainnet => bitcoin::Network::Bitcoin,
            ArkNetwork::Testnet => bitcoin::Network::Testnet,
            ArkNetwork::Signet | ArkNetwork::Mutinynet => bitcoin::Network::Signet,
            ArkNetwork::Regtest => bitcoin::Network::Regtest,
        }
    }

    pub fn default_api_url(self) -> &'static str {
        match self {
            ArkNetwork::Mainnet => "https://api.boltz.exchange",
            ArkNetwork::Testnet => "https://api.testnet.boltz.exchange",
            ArkNetwork::Signet => "https://api.signet.boltz.exchange",
            ArkNetwork::Mutinynet => "https://api.mutinynet.boltz.exchange",
            ArkNetwork::Regtest => "http://localhost:9001",
        }
    }

    /// Derives the WebSocket endpoint from an HTTP API URL, matching
    /// scheme (`ws` for `http`, `wss` for `https`).
    pub fn derive_ws_url(api_url: &str) -> String {
        if let Some(rest) = api_url.strip_prefix("https://") {
            format!("wss://{rest}/v2/ws")
        } else if let Some(rest) = api_url.strip_prefix("http://") {
            format!("ws://{rest}/v2/ws")
        } else {
            format!("{api_url}/v2/ws")
        }
    }
}

impl std::fmt::Display for ArkNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArkNetwork::Mainnet => "mainnet",
            ArkNetwork::Testnet => "testnet",
            ArkNetwork::Signet => "signet",
            ArkNetwork::Mutinynet => "mutinynet",
            ArkNetwork::Regtest => "regtest",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_wss_from_https() {
        assert_eq!(
            ArkNetwork::derive_ws_url("https://api.boltz.exchange"),
            "wss://api.boltz.exchange/v2/ws"
        );
    }

    #[test]
    fn derives_ws_from_http() {
        assert_eq!(
            ArkNetwork::derive_ws_url("http://localhost:9001"),
            "ws://localhost:9001/v2/ws"
        );
    }
}
