use crate::prelude::*;

use async_trait::async_trait;
use puppetlens_query::{OrderBy, Query};
use serde_json::Value;

pub mod client;
mod types;

pub use client::PuppetDbClient;
pub use types::*;

/// Parameters shared by the `/pdb/query/v4` entity endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub query: Option<Query>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub include_total: bool,
}

impl QueryParams {
    pub fn with_query(query: Option<Query>) -> Self {
        QueryParams {
            query,
            ..Default::default()
        }
    }
}

/// A page of records plus the `X-Records` total when it was requested.
#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricVersion {
    V1,
    /// Jolokia based API, the only one enabled by default since 6.9.1.
    V2,
}

#[async_trait]
pub trait PuppetDb: Send + Sync {
    async fn environments(&self) -> Result<Vec<String>>;
    async fn nodes(&self, params: QueryParams) -> Result<Paged<NodeRecord>>;
    /// Runs an `extract` count query against the nodes endpoint.
    async fn node_count(&self, query: &Query) -> Result<u64>;
    async fn catalog(&self, certname: &str) -> Result<Catalog>;
    async fn facts(&self, params: QueryParams) -> Result<Vec<FactRecord>>;
    async fn inventory(&self, params: QueryParams) -> Result<Paged<InventoryRecord>>;
    async fn server_version(&self) -> Result<ServerVersion>;
    /// Reads the attributes of a metrics mbean.
    async fn metric(&self, mbean: &str, version: MetricVersion) -> Result<Value>;
}
