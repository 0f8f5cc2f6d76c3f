//! Top-level configuration (§6.1). Built directly, no config-file layer.

use crate::network::ArkNetwork;

#[derive(Debug, Clone)]
pub struct Config {
    pub network: ArkNetwork,
    pub api_url: String,
    pub ws_url: String,
    pub enable_auto_actions: bool,
    pub poll_interval_ms: u64,
    pub poll_retry_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

impl Config {
    /// Fills in network-appropriate defaults for `apiUrl`/`wsUrl`; override
    /// either field afterwards to point at a self-hosted provider.
    pub fn for_network(network: ArkNetwork) -> Self {
        let api_url = network.default_api_url().to_string();
        let ws_url = ArkNetwork::derive_ws_url(&api_url);
        Self {
            network,
            api_url,
            ws_url,
            enable_auto_actions: true,
            poll_interval_ms: 30_000,
            poll_retry_delay_ms: 1_000,
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 60_000,
        }
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into();
        self.ws_url = ArkNetwork::derive_ws_url(&api_url);
        self.api_url = api_url;
        self
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_network_derives_matching_ws_url() {
        let config = Config::for_network(ArkNetwork::Mainnet);
        assert_eq!(config.ws_url, "wss://api.boltz.exchange/v2/ws");
        assert!(config.enable_auto_actions);
    }

    #[test]
    fn with_api_url_rederives_ws_url() {
        let config =
            Config::for_network(ArkNetwork::Regtest).with_api_url("http://127.0.0.1:9001");
        assert_eq!(config.ws_url, "ws://127.0.0.1:9001/v2/ws");
    }
}
