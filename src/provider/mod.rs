//! Swap Provider Client (C2): HTTP request/response against the
//! Boltz-compatible REST surface (§4.2), plus the WebSocket transport used
//! by the monitor (§4.4, §6.3).

mod http;
mod ws;

pub use http::HttpSwapProvider;
pub use ws::{ProviderWsClient, WsEvent, WsUpdate};

use crate::error::Result;
use crate::swap::{ChainRequest, ChainResponse, ReverseRequest, ReverseResponse, SubmarineRequest, SubmarineResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapLimits {
    pub minimal: u64,
    pub maximal: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapFees {
    pub percentage: f64,
    #[serde(rename = "minerFees")]
    pub miner_fees: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapFeesAndLimits {
    pub limits: SwapLimits,
    pub fees: SwapFees,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteResponse {
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: crate::swap::SwapStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: String,
    pub hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundSubmission {
    #[serde(rename = "pubNonce")]
    pub pub_nonce: String,
    pub signature: String,
    pub transaction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoSignedRefund {
    pub transaction: String,
    #[serde(rename = "pubNonce")]
    pub pub_nonce: String,
    pub signature: String,
}

/// The provider's HTTP surface, named out of scope in §1 but given a
/// concrete implementation here against the documented wire format; the
/// trait seam lets tests substitute a fake.
#[async_trait]
pub trait SwapProvider: Send + Sync {
    fn api_url(&self) -> &str;
    fn ws_url(&self) -> &str;

    async fn get_submarine_fees(&self) -> Result<SwapFeesAndLimits>;
    async fn get_reverse_fees(&self) -> Result<SwapFeesAndLimits>;
    async fn get_chain_fees(&self) -> Result<SwapFeesAndLimits>;

    async fn create_submarine_swap(&self, request: &SubmarineRequest) -> Result<(String, SubmarineResponse)>;
    async fn create_reverse_swap(&self, request: &ReverseRequest) -> Result<(String, ReverseResponse)>;
    async fn create_chain_swap(&self, request: &ChainRequest) -> Result<(String, ChainResponse)>;

    async fn get_swap_status(&self, id: &str) -> Result<StatusResponse>;

    async fn submit_submarine_refund(&self, id: &str, refund: &RefundSubmission) -> Result<CoSignedRefund>;
    async fn get_submarine_preimage(&self, id: &str) -> Result<String>;
    async fn get_reverse_transaction(&self, id: &str) -> Result<TransactionResponse>;

    async fn get_chain_quote(&self, id: &str) -> Result<QuoteResponse>;
    async fn post_chain_quote(&self, id: &str, amount: u64) -> Result<QuoteResponse>;
}
