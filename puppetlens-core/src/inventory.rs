//! Inventory table assembly.
//!
//! Two strategies produce the same [`FactTable`]: [`ServerSideFactTable`]
//! pages through `/inventory` and lets PuppetDB count the nodes, while
//! [`ClientSideFactTable`] pulls the configured facts for every node from
//! `/facts` and groups them locally.

use crate::config::{FactTemplates, Settings};
use crate::environment::is_all;
use crate::pagination::PageRequest;
use crate::prelude::*;
use crate::puppetdb::{PuppetDb, QueryParams};

use async_trait::async_trait;
use puppetlens_query::Query;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Node name → fact name → rendered value.
pub type FactRows = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactTable {
    pub rows: FactRows,
    pub total: u64,
}

#[async_trait]
pub trait FactTableBuilder: Send + Sync {
    /// Whether paging happens in PuppetDB. The page's grid uses this to pick
    /// server-side or client-side processing.
    fn is_server_side(&self) -> bool;

    async fn build(&self, db: &dyn PuppetDb, env: &str, page: &PageRequest) -> Result<FactTable>;
}

/// Picks the strategy configured by `SERVER_SIDE_QUERIES`.
pub fn fact_table_builder(settings: &Settings) -> Arc<dyn FactTableBuilder> {
    let names = settings.inventory_fact_names();
    let templates = settings.inventory_fact_templates.clone();
    if settings.server_side_queries {
        Arc::new(ServerSideFactTable::new(names, templates))
    } else {
        Arc::new(ClientSideFactTable::new(names, templates))
    }
}

/// Renders the configured facts of one node. Facts the node lacks render
/// from an empty value so every row has every column.
fn render_row<'a, F>(
    fact_names: &[String],
    templates: &FactTemplates,
    env: &str,
    mut lookup: F,
) -> BTreeMap<String, String>
where
    F: FnMut(&str) -> Option<&'a Value>,
{
    let empty = Value::String(String::new());
    fact_names
        .iter()
        .map(|name| {
            let rendered = match lookup(name) {
                Some(raw) => templates.render(name, raw, env),
                None => templates.render(name, &empty, env),
            };
            (name.clone(), rendered)
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ServerSideFactTable {
    fact_names: Vec<String>,
    templates: FactTemplates,
}

impl ServerSideFactTable {
    pub fn new(fact_names: Vec<String>, templates: FactTemplates) -> Self {
        ServerSideFactTable {
            fact_names,
            templates,
        }
    }

    pub fn query(env: &str) -> Option<Query> {
        if is_all(env) {
            None
        } else {
            Some(Query::and(vec![Query::equals("environment", env)]))
        }
    }
}

#[async_trait]
impl FactTableBuilder for ServerSideFactTable {
    fn is_server_side(&self) -> bool {
        true
    }

    async fn build(&self, db: &dyn PuppetDb, env: &str, page: &PageRequest) -> Result<FactTable> {
        let mut params = page.to_query_params(Self::query(env));
        params.order_by = None;
        let records = db.inventory(params).await?;
        let rows: FactRows = records
            .items
            .iter()
            .map(|record| {
                let row = render_row(&self.fact_names, &self.templates, env, |name| {
                    record.facts.get(name)
                });
                (record.certname.clone(), row)
            })
            .collect();
        let total = records.total.unwrap_or(rows.len() as u64);
        debug!(env, nodes = rows.len(), total, "built inventory from /inventory");
        Ok(FactTable { rows, total })
    }
}

#[derive(Debug, Clone)]
pub struct ClientSideFactTable {
    fact_names: Vec<String>,
    templates: FactTemplates,
}

impl ClientSideFactTable {
    pub fn new(fact_names: Vec<String>, templates: FactTemplates) -> Self {
        ClientSideFactTable {
            fact_names,
            templates,
        }
    }

    pub fn query(env: &str, fact_names: &[String]) -> Query {
        let mut filters = vec![Query::any_equals("name", fact_names.iter().cloned())];
        if !is_all(env) {
            filters.push(Query::equals("environment", env));
        }
        Query::and(filters)
    }
}

#[async_trait]
impl FactTableBuilder for ClientSideFactTable {
    fn is_server_side(&self) -> bool {
        false
    }

    async fn build(&self, db: &dyn PuppetDb, env: &str, _page: &PageRequest) -> Result<FactTable> {
        // PuppetDB rejects an empty `or`.
        if self.fact_names.is_empty() {
            return Ok(FactTable::default());
        }
        let query = Self::query(env, &self.fact_names);
        let facts = db.facts(QueryParams::with_query(Some(query))).await?;

        let mut by_node: BTreeMap<&str, BTreeMap<&str, &Value>> = BTreeMap::new();
        for fact in &facts {
            by_node
                .entry(fact.certname.as_str())
                .or_default()
                .insert(fact.name.as_str(), &fact.value);
        }

        let rows: FactRows = by_node
            .into_iter()
            .map(|(certname, values)| {
                let row = render_row(&self.fact_names, &self.templates, env, |name| {
                    values.get(name).copied()
                });
                (certname.to_string(), row)
            })
            .collect();
        let total = rows.len() as u64;
        debug!(env, nodes = total, facts = facts.len(), "built inventory from /facts");
        Ok(FactTable { rows, total })
    }
}
