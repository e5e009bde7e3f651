//! In-memory [`PuppetDb`] for tests: canned data plus a log of every call.

use crate::errors::ErrorKind;
use crate::prelude::*;
use crate::puppetdb::{
    Catalog, FactRecord, InventoryRecord, MetricVersion, NodeRecord, Paged, PuppetDb,
    QueryParams, ServerVersion,
};

use async_trait::async_trait;
use puppetlens_query::Query;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Environments,
    Nodes(QueryParams),
    NodeCount(Query),
    Catalog(String),
    Facts(QueryParams),
    Inventory(QueryParams),
    ServerVersion,
    Metric(String, MetricVersion),
}

#[derive(Debug)]
pub struct InMemoryPuppetDb {
    pub environments: Vec<String>,
    pub nodes: Vec<NodeRecord>,
    pub node_count: u64,
    pub catalogs: HashMap<String, Catalog>,
    pub facts: Vec<FactRecord>,
    pub inventory: Vec<InventoryRecord>,
    pub version: ServerVersion,
    pub num_nodes_metric: u64,
    /// When set, every call fails with this PuppetDB status.
    pub fail_with: Option<u16>,
    pub log: Mutex<Vec<Call>>,
}

impl Default for InMemoryPuppetDb {
    fn default() -> Self {
        InMemoryPuppetDb {
            environments: vec!["production".to_string(), "staging".to_string()],
            nodes: Vec::new(),
            node_count: 0,
            catalogs: HashMap::new(),
            facts: Vec::new(),
            inventory: Vec::new(),
            version: ServerVersion::new(7, 12, 0),
            num_nodes_metric: 0,
            fail_with: None,
            log: Mutex::new(Vec::new()),
        }
    }
}

fn page<T: Clone>(items: &[T], params: &QueryParams) -> Paged<T> {
    let offset = params.offset.unwrap_or(0) as usize;
    let limit = params.limit.map(|l| l as usize).unwrap_or(usize::MAX);
    Paged {
        items: items.iter().skip(offset).take(limit).cloned().collect(),
        total: params.include_total.then_some(items.len() as u64),
    }
}

impl InMemoryPuppetDb {
    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> Result<()> {
        let failure = self.fail_with.map(|status| ErrorKind::RemoteStatus {
            status,
            url: format!("{call:?}"),
            body: json!({"error": "unavailable"}).to_string(),
        });
        self.log.lock().unwrap().push(call);
        match failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PuppetDb for InMemoryPuppetDb {
    async fn environments(&self) -> Result<Vec<String>> {
        self.record(Call::Environments)?;
        Ok(self.environments.clone())
    }

    async fn nodes(&self, params: QueryParams) -> Result<Paged<NodeRecord>> {
        let page = page(&self.nodes, &params);
        self.record(Call::Nodes(params))?;
        Ok(page)
    }

    async fn node_count(&self, query: &Query) -> Result<u64> {
        self.record(Call::NodeCount(query.clone()))?;
        Ok(self.node_count)
    }

    async fn catalog(&self, certname: &str) -> Result<Catalog> {
        self.record(Call::Catalog(certname.to_string()))?;
        self.catalogs.get(certname).cloned().ok_or_else(|| {
            ErrorKind::RemoteStatus {
                status: 404,
                url: format!("/pdb/query/v4/catalogs/{certname}"),
                body: json!({"error": format!("Could not find catalog for {certname}")})
                    .to_string(),
            }
            .into()
        })
    }

    async fn facts(&self, params: QueryParams) -> Result<Vec<FactRecord>> {
        self.record(Call::Facts(params))?;
        Ok(self.facts.clone())
    }

    async fn inventory(&self, params: QueryParams) -> Result<Paged<InventoryRecord>> {
        let page = page(&self.inventory, &params);
        self.record(Call::Inventory(params))?;
        Ok(page)
    }

    async fn server_version(&self) -> Result<ServerVersion> {
        self.record(Call::ServerVersion)?;
        Ok(self.version)
    }

    async fn metric(&self, mbean: &str, version: MetricVersion) -> Result<Value> {
        self.record(Call::Metric(mbean.to_string(), version))?;
        Ok(json!({ "Value": self.num_nodes_metric }))
    }
}
