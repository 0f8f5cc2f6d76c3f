//! Concrete HTTP client against the Boltz-compatible REST surface (§4.2).

use super::{
    CoSignedRefund, QuoteResponse, RefundSubmission, StatusResponse, SwapFeesAndLimits,
    SwapProvider, TransactionResponse,
};
use crate::error::{Error, Result};
use crate::swap::{ChainRequest, ChainResponse, ReverseRequest, ReverseResponse, SubmarineRequest, SubmarineResponse};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub struct HttpSwapProvider {
    api_url: String,
    ws_url: String,
    client: reqwest::Client,
}

impl HttpSwapProvider {
    pub fn new(api_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ws_url: ws_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url.trim_end_matches('/'))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::network(None, format!("GET {url} failed: {e}")))?;
        Self::parse_response(response, &url).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::network(None, format!("POST {url} failed: {e}")))?;
        Self::parse_response(response, &url).await
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> Result<T> {
        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| Error::network(Some(status.as_u16()), format!("failed to read body from {url}: {e}")))?;

        tracing::debug!(%url, status = status.as_u16(), "provider response");

        if !status.is_success() {
            let error_data: Option<Value> = serde_json::from_str(&body_text).ok();
            return Err(Error::network_with_body(
                Some(status.as_u16()),
                format!("provider returned {status} for {url}"),
                error_data.unwrap_or(Value::String(body_text)),
            ));
        }

        serde_json::from_str(&body_text)
            .map_err(|e| Error::schema(format!("could not parse response from {url}: {e}. body: {body_text}")))
    }
}

#[derive(serde::Deserialize)]
struct CreateSwapEnvelope<T> {
    id: String,
    #[serde(flatten)]
    rest: T,
}

#[async_trait]
impl SwapProvider for HttpSwapProvider {
    fn api_url(&self) -> &str {
        &self.api_url
    }

    fn ws_url(&self) -> &str {
        &self.ws_url
    }

    async fn get_submarine_fees(&self) -> Result<SwapFeesAndLimits> {
        self.get("/v2/swap/submarine").await
    }

    async fn get_reverse_fees(&self) -> Result<SwapFeesAndLimits> {
        self.get("/v2/swap/reverse").await
    }

    async fn get_chain_fees(&self) -> Result<SwapFeesAndLimits> {
        self.get("/v2/swap/chain").await
    }

    async fn create_submarine_swap(&self, request: &SubmarineRequest) -> Result<(String, SubmarineResponse)> {
        let envelope: CreateSwapEnvelope<SubmarineResponse> =
            self.post("/v2/swap/submarine", request).await?;
        Ok((envelope.id, envelope.rest))
    }

    async fn create_reverse_swap(&self, request: &ReverseRequest) -> Result<(String, ReverseResponse)> {
        let envelope: CreateSwapEnvelope<ReverseResponse> = self.post("/v2/swap/reverse", request).await?;
        Ok((envelope.id, envelope.rest))
    }

    async fn create_chain_swap(&self, request: &ChainRequest) -> Result<(String, ChainResponse)> {
        let envelope: CreateSwapEnvelope<ChainResponse> = self.post("/v2/swap/chain", request).await?;
        Ok((envelope.id, envelope.rest))
    }

    async fn get_swap_status(&self, id: &str) -> Result<StatusResponse> {
        self.get(&format!("/v2/swap/{id}")).await
    }

    async fn submit_submarine_refund(&self, id: &str, refund: &RefundSubmission) -> Result<CoSignedRefund> {
        self.post(&format!("/v2/swap/submarine/{id}/refund/ark"), refund).await
    }

    async fn get_submarine_preimage(&self, id: &str) -> Result<String> {
        #[derive(serde::Deserialize)]
        struct Preimage {
            preimage: String,
        }
        let response: Preimage = self.get(&format!("/v2/swap/submarine/{id}/preimage")).await?;
        Ok(response.preimage)
    }

    async fn get_reverse_transaction(&self, id: &str) -> Result<TransactionResponse> {
        self.get(&format!("/v2/swap/reverse/{id}/transaction")).await
    }

    async fn get_chain_quote(&self, id: &str) -> Result<QuoteResponse> {
        self.get(&format!("/v2/swap/chain/{id}/quote")).await
    }

    async fn post_chain_quote(&self, id: &str, amount: u64) -> Result<QuoteResponse> {
        #[derive(serde::Serialize)]
        struct Body {
            amount: u64,
        }
        self.post(&format!("/v2/swap/chain/{id}/quote"), &Body { amount }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn get_swap_status_parses_dotted_status_tag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/swap/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "transaction.mempool"
            })))
            .mount(&server)
            .await;

        let provider = HttpSwapProvider::new(server.uri(), "ws://unused");
        let status = provider.get_swap_status("abc123").await.unwrap();
        assert_eq!(status.status, crate::swap::SwapStatus::TransactionMempool);
    }

    #[tokio::test]
    async fn non_2xx_response_is_a_network_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/swap/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "swap not found"
            })))
            .mount(&server)
            .await;

        let provider = HttpSwapProvider::new(server.uri(), "ws://unused");
        let err = provider.get_swap_status("missing").await.unwrap_err();
        match err {
            Error::Network { status_code, error_data, .. } => {
                assert_eq!(status_code, Some(404));
                assert!(error_data.is_some());
            }
            other => panic!("expected Network error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_response_is_a_schema_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/swap/weird"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let provider = HttpSwapProvider::new(server.uri(), "ws://unused");
        let err = provider.get_swap_status("weird").await.unwrap_err();
        assert!(matches!(err, Error::Schema(_)));
    }
}
