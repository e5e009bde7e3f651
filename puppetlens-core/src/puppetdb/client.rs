use crate::config::PuppetDbSettings;
use crate::errors::ErrorKind;
use crate::prelude::*;

use super::{
    Catalog, FactRecord, InventoryRecord, MetricVersion, NodeRecord, Paged, PuppetDb,
    QueryParams, ServerVersion,
};
use async_trait::async_trait;
use puppetlens_query::Query;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

const QUERY_PREFIX: [&str; 3] = ["pdb", "query", "v4"];
const TOTAL_HEADER: &str = "X-Records";

/// PuppetDB REST client over `reqwest`.
#[derive(Debug, Clone)]
pub struct PuppetDbClient {
    client: Client,
    base_url: Url,
}

#[derive(Deserialize)]
struct EnvironmentRecord {
    name: String,
}

#[derive(Deserialize)]
struct VersionRecord {
    version: String,
}

impl PuppetDbClient {
    pub fn new(settings: &PuppetDbSettings) -> Result<Self> {
        let base = settings.base_url();
        let base_url = Url::parse(&base)
            .map_err(|err| ErrorKind::InvalidBaseUrl(format!("{base}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ErrorKind::InvalidBaseUrl(base).into());
        }
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("puppetlens/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(PuppetDbClient { client, base_url })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ErrorKind::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn query_url(&self, entity: &[&str], params: &QueryParams) -> Result<Url> {
        let segments: Vec<&str> = QUERY_PREFIX.iter().chain(entity).copied().collect();
        let mut url = self.url(&segments)?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(query) = &params.query {
                pairs.append_pair("query", &query.to_string());
            }
            if let Some(order_by) = params.order_by.as_ref().filter(|o| !o.is_empty()) {
                pairs.append_pair("order_by", &order_by.to_string());
            }
            if let Some(limit) = params.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            if let Some(offset) = params.offset {
                pairs.append_pair("offset", &offset.to_string());
            }
            if params.include_total {
                pairs.append_pair("include_total", "true");
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<(T, Option<u64>)> {
        debug!(%url, "PuppetDB request");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ErrorKind::RemoteStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            }
            .into());
        }
        let total = response
            .headers()
            .get(TOTAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.json::<T>().await?;
        Ok((body, total))
    }

    async fn query_entity<T: DeserializeOwned>(
        &self,
        entity: &[&str],
        params: &QueryParams,
    ) -> Result<Paged<T>> {
        let url = self.query_url(entity, params)?;
        let (items, total) = self.get_json::<Vec<T>>(url).await?;
        Ok(Paged { items, total })
    }
}

#[async_trait]
impl PuppetDb for PuppetDbClient {
    async fn environments(&self) -> Result<Vec<String>> {
        let page: Paged<EnvironmentRecord> = self
            .query_entity(&["environments"], &QueryParams::default())
            .await?;
        Ok(page.items.into_iter().map(|env| env.name).collect())
    }

    async fn nodes(&self, params: QueryParams) -> Result<Paged<NodeRecord>> {
        self.query_entity(&["nodes"], &params).await
    }

    async fn node_count(&self, query: &Query) -> Result<u64> {
        let params = QueryParams::with_query(Some(query.clone()));
        let page: Paged<Value> = self.query_entity(&["nodes"], &params).await?;
        page.items
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                ErrorKind::UnexpectedResponse(format!(
                    "count query returned {:?}",
                    page.items
                ))
                .into()
            })
    }

    async fn catalog(&self, certname: &str) -> Result<Catalog> {
        let url = self.url(&["pdb", "query", "v4", "catalogs", certname])?;
        let (catalog, _) = self.get_json::<Catalog>(url).await?;
        Ok(catalog)
    }

    async fn facts(&self, params: QueryParams) -> Result<Vec<FactRecord>> {
        let page = self.query_entity(&["facts"], &params).await?;
        Ok(page.items)
    }

    async fn inventory(&self, params: QueryParams) -> Result<Paged<InventoryRecord>> {
        self.query_entity(&["inventory"], &params).await
    }

    async fn server_version(&self) -> Result<ServerVersion> {
        let url = self.url(&["pdb", "meta", "v1", "version"])?;
        let (record, _) = self.get_json::<VersionRecord>(url).await?;
        record
            .version
            .parse()
            .map_err(|err: String| ErrorKind::UnexpectedResponse(err).into())
    }

    async fn metric(&self, mbean: &str, version: MetricVersion) -> Result<Value> {
        match version {
            MetricVersion::V1 => {
                let url = self.url(&["metrics", "v1", "mbeans", mbean])?;
                let (value, _) = self.get_json::<Value>(url).await?;
                Ok(value)
            }
            MetricVersion::V2 => {
                let url = self.url(&["metrics", "v2", "read", mbean])?;
                let (mut body, _) = self.get_json::<Value>(url).await?;
                match body.get_mut("value").map(Value::take) {
                    Some(value) if !value.is_null() => Ok(value),
                    _ => Err(ErrorKind::UnexpectedResponse(format!(
                        "metric {mbean} has no value: {body}"
                    ))
                    .into()),
                }
            }
        }
    }
}
