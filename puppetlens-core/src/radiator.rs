use crate::config::Settings;
use crate::environment::is_all;
use crate::errors::ErrorKind;
use crate::prelude::*;
use crate::puppetdb::{MetricVersion, PuppetDb, QueryParams, ServerVersion};
use crate::status::{derive_status, NodeStatus};

use chrono::{DateTime, Utc};
use puppetlens_query::Query;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::IntoEnumIterator;
use tracing::debug;

const NUM_NODES_MBEAN: &str = "puppetlabs.puppetdb.population";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub count: u64,
    pub percent: u64,
}

/// Per-status node counts for the radiator view.
///
/// Serializes flat: `changed`, `changed_percent`, ... for every status, plus
/// `total`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadiatorStats {
    pub statuses: BTreeMap<NodeStatus, StatusCount>,
    pub total: u64,
}

impl RadiatorStats {
    pub fn get(&self, status: NodeStatus) -> StatusCount {
        self.statuses.get(&status).copied().unwrap_or_default()
    }
}

impl Serialize for RadiatorStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.statuses.len() * 2 + 1))?;
        for status in NodeStatus::iter() {
            let entry = self.get(status);
            map.serialize_entry(status.as_ref(), &entry.count)?;
            map.serialize_entry(&format!("{status}_percent"), &entry.percent)?;
        }
        map.serialize_entry("total", &self.total)?;
        map.end()
    }
}

/// `floor(100 * count / total)`, 0 when there are no nodes at all.
pub fn percent(count: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (count.saturating_mul(100) / total).min(100)
}

/// Counts statuses and derives percentages against `total`, the node count
/// PuppetDB reports for the environment rather than the number of statuses
/// seen here.
pub fn aggregate<I, S>(statuses: I, total: u64) -> RadiatorStats
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts: BTreeMap<NodeStatus, u64> = NodeStatus::iter().map(|s| (s, 0)).collect();
    for status in statuses {
        *counts
            .entry(NodeStatus::classify(status.as_ref()))
            .or_default() += 1;
    }
    let statuses = counts
        .into_iter()
        .map(|(status, count)| {
            (
                status,
                StatusCount {
                    count,
                    percent: percent(count, total),
                },
            )
        })
        .collect();
    RadiatorStats { statuses, total }
}

/// Chooses the metrics API and mbean name for the node population metric.
pub fn metric_params(version: ServerVersion) -> (String, MetricVersion) {
    let query_type = if version < ServerVersion::new(4, 0, 0) {
        "type=default,"
    } else {
        ""
    };
    let metric_version = if version < ServerVersion::new(6, 9, 1) {
        MetricVersion::V1
    } else {
        MetricVersion::V2
    };
    (
        format!("{NUM_NODES_MBEAN}:{query_type}name=num-nodes"),
        metric_version,
    )
}

fn environment_filter(env: &str) -> Option<Query> {
    if is_all(env) {
        None
    } else {
        Some(Query::and(vec![Query::equals("catalog_environment", env)]))
    }
}

async fn total_nodes(db: &dyn PuppetDb, env: &str) -> Result<u64> {
    match environment_filter(env) {
        Some(filter) => db.node_count(&Query::count(Some(filter))).await,
        None => {
            let version = db.server_version().await?;
            let (mbean, metric_version) = metric_params(version);
            debug!(%version, %mbean, ?metric_version, "reading node population metric");
            let metric = db.metric(&mbean, metric_version).await?;
            metric_value(&metric).ok_or_else(|| {
                ErrorKind::UnexpectedResponse(format!("metric {mbean} has no Value: {metric}"))
                    .into()
            })
        }
    }
}

fn metric_value(metric: &Value) -> Option<u64> {
    let value = metric.get("Value")?;
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
}

/// Builds the radiator stats for `env`.
pub async fn radiator(
    db: &dyn PuppetDb,
    settings: &Settings,
    env: &str,
    now: DateTime<Utc>,
) -> Result<RadiatorStats> {
    let total = total_nodes(db, env).await?;
    let nodes = db
        .nodes(QueryParams::with_query(environment_filter(env)))
        .await?;
    let statuses = nodes
        .items
        .iter()
        .map(|node| derive_status(node, settings.unresponsive_hours, now));
    Ok(aggregate(statuses, total))
}
