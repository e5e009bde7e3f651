use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A row of `/pdb/query/v4/nodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeRecord {
    pub certname: String,
    pub deactivated: Option<DateTime<Utc>>,
    pub expired: Option<DateTime<Utc>>,
    pub catalog_timestamp: Option<DateTime<Utc>>,
    pub facts_timestamp: Option<DateTime<Utc>>,
    pub report_timestamp: Option<DateTime<Utc>>,
    pub catalog_environment: Option<String>,
    pub facts_environment: Option<String>,
    pub report_environment: Option<String>,
    pub latest_report_status: Option<String>,
    pub latest_report_noop: Option<bool>,
    pub latest_report_noop_pending: Option<bool>,
    pub latest_report_hash: Option<String>,
    pub cached_catalog_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRecord {
    pub certname: String,
    pub name: String,
    pub value: Value,
    #[serde(default)]
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryRecord {
    pub certname: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub environment: Option<String>,
    pub facts: Map<String, Value>,
    pub trusted: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub certname: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub producer_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transaction_uuid: Option<String>,
    #[serde(default)]
    pub catalog_uuid: Option<String>,
    #[serde(default)]
    pub code_id: Option<String>,
    #[serde(default, deserialize_with = "inline_or_wrapped")]
    pub resources: Vec<CatalogResource>,
    #[serde(default, deserialize_with = "inline_or_wrapped")]
    pub edges: Vec<CatalogEdge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub title: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRef {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub title: String,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.resource_type, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEdge {
    pub source: ResourceRef,
    pub target: ResourceRef,
    pub relationship: String,
}

/// `resources` and `edges` come back either inline or as
/// `{"href": ..., "data": [...]}` depending on the endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum Embedded<T> {
    Inline(Vec<T>),
    Wrapped {
        #[serde(default = "Vec::new")]
        data: Vec<T>,
    },
}

fn inline_or_wrapped<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match Option::<Embedded<T>>::deserialize(deserializer)? {
        Some(Embedded::Inline(items)) | Some(Embedded::Wrapped { data: items }) => items,
        None => Vec::new(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        ServerVersion {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for ServerVersion {
    type Err = String;

    /// Accepts `7.12.1`, `6.9` and suffixed forms such as `8.0.0-SNAPSHOT`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let core = s
            .trim()
            .split(|c: char| c == '-' || c == '+')
            .next()
            .unwrap_or_default();
        let mut parts = core.split('.').map(|part| part.parse::<u32>());
        let mut next = || -> Result<u32, String> {
            match parts.next() {
                None => Ok(0),
                Some(part) => part.map_err(|err| format!("invalid version `{s}`: {err}")),
            }
        };
        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        Ok(ServerVersion::new(major, minor, patch))
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_wrapped_and_inline_resources() {
        let wrapped: Catalog = serde_json::from_value(json!({
            "certname": "web01",
            "version": "1700000000",
            "resources": {"href": "/pdb/query/v4/catalogs/web01/resources", "data": [
                {"type": "File", "title": "/etc/motd", "tags": ["file"], "exported": false,
                 "file": "/etc/puppetlabs/code/site.pp", "line": 4, "parameters": {"ensure": "file"}}
            ]},
            "edges": {"href": "/pdb/query/v4/catalogs/web01/edges", "data": [
                {"source": {"type": "Class", "title": "Main"},
                 "target": {"type": "File", "title": "/etc/motd"},
                 "relationship": "contains"}
            ]}
        }))
        .unwrap();
        assert_eq!(wrapped.resources.len(), 1);
        assert_eq!(wrapped.resources[0].resource_type, "File");
        assert_eq!(wrapped.edges[0].target.to_string(), "File[/etc/motd]");

        let inline: Catalog = serde_json::from_value(json!({
            "certname": "web02",
            "resources": [{"type": "Class", "title": "Main"}],
        }))
        .unwrap();
        assert_eq!(inline.resources[0].title, "Main");
        assert!(inline.edges.is_empty());
    }

    #[test]
    fn parses_server_versions() {
        assert_eq!(
            "7.12.1".parse::<ServerVersion>(),
            Ok(ServerVersion::new(7, 12, 1))
        );
        assert_eq!(
            "8.0.0-SNAPSHOT".parse::<ServerVersion>(),
            Ok(ServerVersion::new(8, 0, 0))
        );
        assert_eq!("6.9".parse::<ServerVersion>(), Ok(ServerVersion::new(6, 9, 0)));
        assert!("seven".parse::<ServerVersion>().is_err());
        assert!(ServerVersion::new(6, 9, 1) > ServerVersion::new(6, 8, 12));
    }
}
