/*!
Queries against the remote company directory: total count, launch-date
window, and full enumeration split by a facet
*/

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::radar::{
    config::CatalogConfig,
    entity::Entity,
    error::TransportError,
    retry::RetryPolicy,
};

/// One search request: which index, and the URL-style parameter string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub index: String,
    pub params: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(rename = "nbHits", default)]
    pub nb_hits: u64,
    #[serde(default)]
    pub hits: Vec<Entity>,
    /// facet name -> facet value -> count
    #[serde(default)]
    pub facets: HashMap<String, HashMap<String, u64>>,
}

/// Request/response plumbing to the search backend. Single attempt per call;
/// retries are applied by [`CatalogClient`].
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, TransportError>;
}

/// The three query shapes the reconciliation engine relies on
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Total number of entities in the catalog
    async fn fetch_count(&self) -> Result<u64, TransportError>;

    /// Entities launched after `timestamp`, capped at one page. Not authoritative.
    async fn fetch_since(&self, timestamp: i64) -> Result<Vec<Entity>, TransportError>;

    /// Every entity, one capped query per partition
    async fn fetch_all_partitioned(&self) -> Result<Vec<Entity>, TransportError>;
}

pub struct CatalogClient {
    transport: Box<dyn CatalogTransport>,
    config: CatalogConfig,
    retry: RetryPolicy,
}

impl CatalogClient {
    pub fn new(transport: Box<dyn CatalogTransport>, config: CatalogConfig, retry: RetryPolicy) -> Self {
        Self {
            transport,
            config,
            retry,
        }
    }

    async fn query(&self, index: &str, params: String) -> Result<QueryResponse, TransportError> {
        let request = QueryRequest {
            index: index.to_string(),
            params,
        };
        let transport = &self.transport;
        let request = &request;
        let what = format!("catalog query on {}", index);
        self.retry.run(&what, move || transport.query(request)).await
    }

    fn facet_overview_params(&self) -> String {
        format!("hitsPerPage=0&facets={}", self.config.partition_facet)
    }

    /// Partition keys with their entity counts, sorted by key
    pub async fn partition_keys(&self) -> Result<Vec<(String, u64)>, TransportError> {
        let response = self
            .query(&self.config.primary_index, self.facet_overview_params())
            .await?;
        let mut keys: Vec<(String, u64)> = response
            .facets
            .get(&self.config.partition_facet)
            .map(|values| values.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();
        keys.sort();
        info!(
            "Found {} {} partitions, total: {}",
            keys.len(),
            self.config.partition_facet,
            keys.iter().map(|(_, n)| n).sum::<u64>()
        );
        Ok(keys)
    }

    async fn fetch_partition(&self, key: &str) -> Result<Vec<Entity>, TransportError> {
        let params = format!(
            "hitsPerPage={}&facetFilters=[\"{}:{}\"]",
            self.config.page_cap, self.config.partition_facet, key
        );
        Ok(self.query(&self.config.primary_index, params).await?.hits)
    }

    fn pause(&self) -> Duration {
        self.config.partition_pause()
    }
}

#[async_trait]
impl Catalog for CatalogClient {
    async fn fetch_count(&self) -> Result<u64, TransportError> {
        let response = self
            .query(&self.config.primary_index, self.facet_overview_params())
            .await?;
        info!("Current directory count: {}", response.nb_hits);
        Ok(response.nb_hits)
    }

    async fn fetch_since(&self, timestamp: i64) -> Result<Vec<Entity>, TransportError> {
        let params = format!(
            "hitsPerPage={}&numericFilters=[\"launched_at>{}\"]",
            self.config.page_cap, timestamp
        );
        let hits = self.query(&self.config.launch_index, params).await?.hits;
        info!("Fetched {} hits launched after {}", hits.len(), timestamp);
        if hits.len() >= self.config.page_cap {
            warn!(
                "Window query hit the page cap of {}; later launches may be missing",
                self.config.page_cap
            );
        }
        Ok(hits)
    }

    async fn fetch_all_partitioned(&self) -> Result<Vec<Entity>, TransportError> {
        let keys = self.partition_keys().await?;
        let mut all_hits = Vec::new();
        for (i, (key, expected)) in keys.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pause()).await;
            }
            debug!("  [{}/{}] Fetching partition: {}", i + 1, keys.len(), key);
            if (*expected as usize) > self.config.page_cap {
                warn!(
                    "Partition {} holds {} entities, above the page cap of {}",
                    key, expected, self.config.page_cap
                );
            }
            all_hits.extend(self.fetch_partition(key).await?);
        }
        info!(
            "Full fetch complete: {} companies across {} partitions",
            all_hits.len(),
            keys.len()
        );
        Ok(all_hits)
    }
}
