use askama::Template;
use puppetlens_core::pagination::Column;
use puppetlens_core::puppetdb::{Catalog, CatalogResource};
use puppetlens_core::radiator::RadiatorStats;
use puppetlens_core::status::NodeStatus;
use strum::IntoEnumIterator;

/// Seconds between reloads of the radiator page.
const RADIATOR_REFRESH_SECONDS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Catalogs,
    Radiator,
    Inventory,
}

impl Section {
    fn path(self) -> &'static str {
        match self {
            Section::Catalogs => "catalogs",
            Section::Radiator => "radiator",
            Section::Inventory => "inventory",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Section::Catalogs => "Catalogs",
            Section::Radiator => "Radiator",
            Section::Inventory => "Inventory",
        }
    }
}

pub fn env_url(env: &str, path: &str) -> String {
    format!("/{env}/{path}")
}

#[derive(Debug, Clone)]
pub struct Link {
    pub label: String,
    pub href: String,
    pub active: bool,
}

/// Navigation bar and environment selector shared by every page.
#[derive(Debug, Clone)]
pub struct Nav {
    pub current_env: String,
    pub sections: Vec<Link>,
    pub envs: Vec<Link>,
}

impl Nav {
    pub fn new(envs: &[String], current_env: &str, section: Section) -> Self {
        let sections = [Section::Catalogs, Section::Radiator, Section::Inventory]
            .into_iter()
            .map(|s| Link {
                label: s.label().to_string(),
                href: env_url(current_env, s.path()),
                active: s == section,
            })
            .collect();
        let envs = std::iter::once("*")
            .chain(envs.iter().map(String::as_str))
            .map(|env| Link {
                label: if env == "*" { "All".to_string() } else { env.to_string() },
                href: env_url(env, section.path()),
                active: env == current_env,
            })
            .collect();
        Nav {
            current_env: current_env.to_string(),
            sections,
            envs,
        }
    }
}

#[derive(Template)]
#[template(path = "catalogs.html")]
pub struct CatalogsPage {
    pub nav: Nav,
    pub compare: Option<String>,
    pub headers: Vec<&'static str>,
    pub data_url: String,
}

impl CatalogsPage {
    pub fn new(nav: Nav, compare: Option<String>, columns: &[Column]) -> Self {
        let data_url = match &compare {
            Some(compare) => env_url(&nav.current_env, &format!("catalogs/compare/{compare}/json")),
            None => env_url(&nav.current_env, "catalogs/json"),
        };
        CatalogsPage {
            nav,
            compare,
            headers: columns.iter().map(|c| c.name).collect(),
            data_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceView {
    pub kind: String,
    pub title: String,
    pub location: String,
    pub parameters: String,
}

impl From<&CatalogResource> for ResourceView {
    fn from(resource: &CatalogResource) -> Self {
        let location = match (&resource.file, resource.line) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.clone(),
            _ => String::new(),
        };
        ResourceView {
            kind: resource.resource_type.clone(),
            title: resource.title.clone(),
            location,
            parameters: serde_json::to_string_pretty(&resource.parameters).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EdgeView {
    pub source: String,
    pub relationship: String,
    pub target: String,
}

/// A catalog flattened into display strings.
#[derive(Debug, Clone)]
pub struct CatalogView {
    pub certname: String,
    pub version: String,
    pub environment: String,
    pub producer_timestamp: String,
    pub transaction_uuid: String,
    pub resources: Vec<ResourceView>,
    pub edges: Vec<EdgeView>,
}

impl From<&Catalog> for CatalogView {
    fn from(catalog: &Catalog) -> Self {
        CatalogView {
            certname: catalog.certname.clone(),
            version: catalog.version.clone().unwrap_or_default(),
            environment: catalog.environment.clone().unwrap_or_default(),
            producer_timestamp: catalog
                .producer_timestamp
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_default(),
            transaction_uuid: catalog.transaction_uuid.clone().unwrap_or_default(),
            resources: catalog.resources.iter().map(ResourceView::from).collect(),
            edges: catalog
                .edges
                .iter()
                .map(|edge| EdgeView {
                    source: edge.source.to_string(),
                    relationship: edge.relationship.clone(),
                    target: edge.target.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "catalog.html")]
pub struct CatalogPage {
    pub nav: Nav,
    pub catalog: CatalogView,
}

#[derive(Template)]
#[template(path = "catalog_compare.html")]
pub struct CatalogComparePage {
    pub nav: Nav,
    pub title: String,
    /// The compared catalog first, the reference catalog second.
    pub catalogs: Vec<CatalogView>,
}

impl CatalogComparePage {
    pub fn new(nav: Nav, compare: &Catalog, against: &Catalog) -> Self {
        CatalogComparePage {
            nav,
            title: format!("{} vs {}", compare.certname, against.certname),
            catalogs: vec![CatalogView::from(compare), CatalogView::from(against)],
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatRow {
    pub status: String,
    pub count: u64,
    pub percent: u64,
}

#[derive(Template)]
#[template(path = "radiator.html")]
pub struct RadiatorPage {
    pub nav: Nav,
    pub rows: Vec<StatRow>,
    pub total: u64,
    pub refresh_seconds: u32,
}

impl RadiatorPage {
    pub fn new(nav: Nav, stats: &RadiatorStats) -> Self {
        let rows = NodeStatus::iter()
            .map(|status| {
                let entry = stats.get(status);
                StatRow {
                    status: status.to_string(),
                    count: entry.count,
                    percent: entry.percent,
                }
            })
            .collect();
        RadiatorPage {
            nav,
            rows,
            total: stats.total,
            refresh_seconds: RADIATOR_REFRESH_SECONDS,
        }
    }
}

#[derive(Template)]
#[template(path = "inventory.html")]
pub struct InventoryPage {
    pub nav: Nav,
    /// Fact labels, in column order after the node name.
    pub headers: Vec<String>,
    pub server_side: bool,
    pub data_url: String,
}

impl InventoryPage {
    pub fn new(nav: Nav, headers: Vec<String>, server_side: bool) -> Self {
        let data_url = env_url(&nav.current_env, "inventory/json");
        InventoryPage {
            nav,
            headers,
            server_side,
            data_url,
        }
    }
}
