use serde::de::DeserializeOwned;
use stressrpc_common::{ErrorResponse, GaugeResponse, RpcError, StatusCode};

use crate::histogram::HistogramSnapshot;

/// Polls a running harness' metrics endpoint. Every call resets the remote histogram.
pub struct MetricsClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl MetricsClient {
    /// `addr` is the endpoint's `host:port`.
    pub fn new(addr: &str) -> Self {
        Self { base_url: format!("http://{addr}"), http_client: reqwest::Client::new() }
    }

    pub async fn histogram(&self) -> Result<HistogramSnapshot, RpcError> {
        self.get("/histogram").await
    }

    pub async fn all_gauges(&self) -> Result<Vec<GaugeResponse>, RpcError> {
        self.get("/gauges").await
    }

    pub async fn gauge(&self, name: &str) -> Result<GaugeResponse, RpcError> {
        self.get(&format!("/gauges/{name}")).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RpcError> {
        let response = self
            .http_client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|e| RpcError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match response.json::<ErrorResponse>().await {
                Ok(envelope) => envelope.into(),
                Err(_) => RpcError::status(StatusCode::Unknown, format!("Server returned status: {}", status)),
            });
        }

        response.json().await.map_err(|e| RpcError::Decode(e.to_string()))
    }
}
