use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::models::{
    BatchSummary, CreateItemsRequest, CreateStoresRequest, Item, LookupRequest, LookupResult,
    RecordSaleRequest, SaleReceipt, Store, StoreConfig, StoreSummary,
};

/// Error body produced by the server's `ApiError`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client that delegates store operations to a running
/// `stockroom` daemon.
pub struct HttpStoreClient {
    client: Client,
    base_url: String,
}

impl HttpStoreClient {
    /// Create a new client targeting the given base URL
    /// (e.g. "http://127.0.0.1:7878").
    pub fn new<S: Into<String>>(base_url: S) -> Result<Self> {
        let base_url = base_url.into();
        let parsed = url::Url::parse(&base_url)
            .with_context(|| format!("invalid server URL `{base_url}`"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "server URL must use http or https; got `{base_url}`"
            ));
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, base_url })
    }

    /// Execute a lookup via `POST /v1/search`.
    pub fn search(&self, request: &LookupRequest) -> Result<LookupResult> {
        self.post_json("/v1/search", request)
    }

    pub fn create_items(&self, request: &CreateItemsRequest) -> Result<BatchSummary<Item>> {
        self.post_json("/v1/items", request)
    }

    pub fn create_stores(&self, request: &CreateStoresRequest) -> Result<BatchSummary<Store>> {
        self.post_json("/v1/stores", request)
    }

    pub fn record_sale(&self, request: &RecordSaleRequest) -> Result<SaleReceipt> {
        self.post_json("/v1/sales", request)
    }

    /// Inspect a store via `POST /v1/store/info`.
    pub fn store_info(&self, config: &StoreConfig) -> Result<StoreSummary> {
        self.post_json("/v1/store/info", config)
    }

    fn post_json<T, R>(&self, path: &str, body: &T) -> Result<R>
    where
        T: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let url = self.url_for(path);
        tracing::debug!(%url, "delegating request to server");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .with_context(|| format!("failed to send request to {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorBody>()
                .map(|body| body.error)
                .unwrap_or_else(|_| status.to_string());
            return Err(anyhow!("server returned {status} for {url}: {message}"));
        }

        let value = response
            .json::<R>()
            .context("failed to decode JSON response from server")?;

        Ok(value)
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_validated_and_normalized() {
        let client = HttpStoreClient::new("http://127.0.0.1:7878/").expect("client");
        assert_eq!(client.url_for("/v1/search"), "http://127.0.0.1:7878/v1/search");

        assert!(HttpStoreClient::new("127.0.0.1:7878").is_err());
        assert!(HttpStoreClient::new("ftp://example.com").is_err());
    }
}
