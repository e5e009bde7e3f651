use crate::config::Settings;
use crate::environment::is_all;
use crate::errors::ErrorKind;
use crate::pagination::{Column, PageRequest};
use crate::prelude::*;
use crate::puppetdb::{Catalog, PuppetDb};

use chrono::{DateTime, Utc};
use puppetlens_query::Query;
use serde::Serialize;
use tracing::warn;

/// Columns of the catalog listing grid.
pub const CATALOG_COLUMNS: &[Column] = &[
    Column {
        attr: "certname",
        filter: Some("certname"),
        name: "Hostname",
    },
    Column {
        attr: "catalog_timestamp",
        filter: None,
        name: "Compile Time",
    },
    Column {
        attr: "form",
        filter: None,
        name: "Compare",
    },
];

/// Separator between the two certnames of a comparison route segment.
pub const COMPARE_SEPARATOR: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRow {
    pub certname: String,
    pub catalog_timestamp: Option<DateTime<Utc>>,
    /// Node the listed catalog would be compared against, if any.
    pub form: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogListing {
    pub rows: Vec<CatalogRow>,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogComparison {
    pub compare: Catalog,
    pub against: Catalog,
}

/// Rejects the request when the catalog interface is turned off.
pub fn ensure_enabled(settings: &Settings) -> Result<()> {
    if settings.enable_catalog {
        Ok(())
    } else {
        warn!("Access to catalog interface disabled by administrator");
        Err(ErrorKind::FeatureDisabled("catalog".to_string()).into())
    }
}

/// Splits `compare...against`. Returns `None` for a plain certname.
pub fn split_compare(segment: &str) -> Option<(&str, &str)> {
    segment
        .split_once(COMPARE_SEPARATOR)
        .filter(|(compare, against)| !compare.is_empty() && !against.is_empty())
}

/// Nodes that have a compiled catalog, optionally in `env` and matching the
/// `search` regular expression.
pub fn listing_query(env: &str, search: Option<&str>) -> Query {
    let mut filters = Vec::with_capacity(3);
    if !is_all(env) {
        filters.push(Query::equals("catalog_environment", env));
    }
    if let Some(search) = search {
        filters.push(Query::regex("certname", search));
    }
    filters.push(Query::null("catalog_timestamp", false));
    Query::and(filters)
}

pub async fn list_catalogs(
    db: &dyn PuppetDb,
    env: &str,
    compare: Option<&str>,
    page: &PageRequest,
) -> Result<CatalogListing> {
    let query = listing_query(env, page.search.as_deref());
    let nodes = db.nodes(page.to_query_params(Some(query))).await?;
    let rows: Vec<CatalogRow> = nodes
        .items
        .into_iter()
        .map(|node| CatalogRow {
            certname: node.certname,
            catalog_timestamp: node.catalog_timestamp,
            form: compare.map(str::to_string),
        })
        .collect();
    let total = nodes.total.unwrap_or(rows.len() as u64);
    Ok(CatalogListing { rows, total })
}

pub async fn fetch_catalog(db: &dyn PuppetDb, certname: &str) -> Result<Catalog> {
    db.catalog(certname).await
}

/// Fetches both catalogs one after the other; either failure aborts.
pub async fn compare_catalogs(
    db: &dyn PuppetDb,
    compare: &str,
    against: &str,
) -> Result<CatalogComparison> {
    let compare = db.catalog(compare).await?;
    let against = db.catalog(against).await?;
    Ok(CatalogComparison { compare, against })
}
