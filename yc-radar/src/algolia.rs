/*!
Algolia search transport backing the YC company directory
*/

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::json;
use tracing::debug;

use crate::radar::{
    catalog::{CatalogTransport, QueryRequest, QueryResponse},
    config::CatalogConfig,
    error::{RadarError, TransportError},
};

pub struct AlgoliaTransport {
    app_id: String,
    client: reqwest::Client,
}

impl AlgoliaTransport {
    pub fn new(config: &CatalogConfig) -> Result<Self, RadarError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-Algolia-Application-Id", header_value(&config.app_id)?);
        headers.insert("X-Algolia-API-Key", header_value(&config.api_key)?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RadarError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            app_id: config.app_id.clone(),
            client,
        })
    }

    pub fn query_url(&self, index: &str) -> String {
        format!("https://{}-dsn.algolia.net/1/indexes/{}/query", self.app_id, index)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, RadarError> {
    HeaderValue::from_str(value)
        .map_err(|_| RadarError::Config("Algolia credentials contain invalid header characters".to_string()))
}

#[async_trait]
impl CatalogTransport for AlgoliaTransport {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError> {
        let url = self.query_url(&request.index);
        debug!("POST {} params={}", url, request.params);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "params": request.params }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}
