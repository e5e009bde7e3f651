use crate::errors::Result;
use crate::pages::{
    CatalogComparePage, CatalogPage, CatalogView, CatalogsPage, InventoryPage, Nav,
    RadiatorPage, Section,
};
use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use puppetlens_core::catalogs::{self, CatalogRow, CATALOG_COLUMNS};
use puppetlens_core::config::{escape_html, Settings};
use puppetlens_core::environment;
use puppetlens_core::inventory::{fact_table_builder, FactTableBuilder};
use puppetlens_core::pagination::{Column, GridParams, PageRequest};
use puppetlens_core::puppetdb::PuppetDb;
use puppetlens_core::radiator::{self, RadiatorStats};
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub puppetdb: Arc<dyn PuppetDb>,
    pub facts: Arc<dyn FactTableBuilder>,
}

impl AppState {
    pub fn new(settings: Settings, puppetdb: Arc<dyn PuppetDb>) -> Self {
        let facts = fact_table_builder(&settings);
        AppState {
            settings: Arc::new(settings),
            puppetdb,
            facts,
        }
    }

    fn default_env(&self) -> String {
        self.settings.default_environment.clone()
    }
}

pub fn create_route(state: AppState) -> Router {
    Router::new()
        .route("/catalogs", get(catalogs_default))
        .route("/{env}/catalogs", get(catalogs_env))
        .route("/catalogs/json", get(catalogs_json_default))
        .route("/{env}/catalogs/json", get(catalogs_json_env))
        .route("/catalogs/compare/{compare}", get(compare_default))
        .route("/{env}/catalogs/compare/{compare}", get(compare_env))
        .route("/catalogs/compare/{compare}/json", get(compare_json_default))
        .route("/{env}/catalogs/compare/{compare}/json", get(compare_json_env))
        .route("/catalog/{node}", get(catalog_default))
        .route("/{env}/catalog/{node}", get(catalog_env))
        .route("/radiator", get(radiator_default))
        .route("/{env}/radiator", get(radiator_env))
        .route("/inventory", get(inventory_default))
        .route("/{env}/inventory", get(inventory_env))
        .route("/inventory/json", get(inventory_json_default))
        .route("/{env}/inventory/json", get(inventory_json_env))
        .route("/static/app.js", get(app_js))
        .with_state(state)
}

fn render<T: Template>(page: &T) -> Result<Html<String>> {
    Ok(Html(page.render()?))
}

/// True when any media type listed in `Accept` is `application/json`.
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|media| media.split(';').next())
        .any(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

// Catalog listing

async fn catalogs_default(State(state): State<AppState>) -> Result<Html<String>> {
    let env = state.default_env();
    catalogs_page(state, env, None).await
}

async fn catalogs_env(
    State(state): State<AppState>,
    Path(env): Path<String>,
) -> Result<Html<String>> {
    catalogs_page(state, env, None).await
}

async fn compare_default(
    State(state): State<AppState>,
    Path(compare): Path<String>,
) -> Result<Html<String>> {
    let env = state.default_env();
    compare_dispatch(state, env, compare).await
}

async fn compare_env(
    State(state): State<AppState>,
    Path((env, compare)): Path<(String, String)>,
) -> Result<Html<String>> {
    compare_dispatch(state, env, compare).await
}

/// `compare...against` renders the comparison, a single certname the listing
/// with that node preselected as the comparison base.
async fn compare_dispatch(state: AppState, env: String, compare: String) -> Result<Html<String>> {
    match catalogs::split_compare(&compare) {
        Some((compare, against)) => {
            catalog_compare(state, env, compare.to_string(), against.to_string()).await
        }
        None => catalogs_page(state, env, Some(compare)).await,
    }
}

#[tracing::instrument(level = "INFO", skip(state))]
async fn catalogs_page(
    state: AppState,
    env: String,
    compare: Option<String>,
) -> Result<Html<String>> {
    catalogs::ensure_enabled(&state.settings)?;
    let envs = environment::fetch_and_resolve(state.puppetdb.as_ref(), &env).await?;
    let nav = Nav::new(&envs, &env, Section::Catalogs);
    render(&CatalogsPage::new(nav, compare, CATALOG_COLUMNS))
}

#[tracing::instrument(level = "INFO", skip(state))]
async fn catalog_compare(
    state: AppState,
    env: String,
    compare: String,
    against: String,
) -> Result<Html<String>> {
    catalogs::ensure_enabled(&state.settings)?;
    let envs = environment::fetch_and_resolve(state.puppetdb.as_ref(), &env).await?;
    let comparison =
        catalogs::compare_catalogs(state.puppetdb.as_ref(), &compare, &against).await?;
    render(&CatalogComparePage::new(
        Nav::new(&envs, &env, Section::Catalogs),
        &comparison.compare,
        &comparison.against,
    ))
}

// Catalog listing data

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogsData {
    pub draw: i64,
    pub total: u64,
    pub total_filtered: u64,
    pub columns: &'static [Column],
    pub catalogs: Vec<CatalogRow>,
    pub envs: Vec<String>,
    pub current_env: String,
}

async fn catalogs_json_default(
    State(state): State<AppState>,
    Query(params): Query<GridParams>,
) -> Result<Json<CatalogsData>> {
    let env = state.default_env();
    catalogs_data(state, env, None, params).await
}

async fn catalogs_json_env(
    State(state): State<AppState>,
    Path(env): Path<String>,
    Query(params): Query<GridParams>,
) -> Result<Json<CatalogsData>> {
    catalogs_data(state, env, None, params).await
}

async fn compare_json_default(
    State(state): State<AppState>,
    Path(compare): Path<String>,
    Query(params): Query<GridParams>,
) -> Result<Json<CatalogsData>> {
    let env = state.default_env();
    catalogs_data(state, env, Some(compare), params).await
}

async fn compare_json_env(
    State(state): State<AppState>,
    Path((env, compare)): Path<(String, String)>,
    Query(params): Query<GridParams>,
) -> Result<Json<CatalogsData>> {
    catalogs_data(state, env, Some(compare), params).await
}

#[tracing::instrument(level = "INFO", skip(state))]
async fn catalogs_data(
    state: AppState,
    env: String,
    compare: Option<String>,
    params: GridParams,
) -> Result<Json<CatalogsData>> {
    catalogs::ensure_enabled(&state.settings)?;
    let envs = environment::fetch_and_resolve(state.puppetdb.as_ref(), &env).await?;
    let page = PageRequest::from_grid_with_order(
        &params,
        CATALOG_COLUMNS,
        state.settings.normal_table_count,
    )?;
    let listing =
        catalogs::list_catalogs(state.puppetdb.as_ref(), &env, compare.as_deref(), &page).await?;
    Ok(Json(CatalogsData {
        draw: page.draw,
        total: listing.total,
        total_filtered: listing.total,
        columns: CATALOG_COLUMNS,
        catalogs: listing.rows,
        envs,
        current_env: env,
    }))
}

// Single catalog

async fn catalog_default(
    State(state): State<AppState>,
    Path(node): Path<String>,
) -> Result<Html<String>> {
    let env = state.default_env();
    catalog_node(state, env, node).await
}

async fn catalog_env(
    State(state): State<AppState>,
    Path((env, node)): Path<(String, String)>,
) -> Result<Html<String>> {
    catalog_node(state, env, node).await
}

#[tracing::instrument(level = "INFO", skip(state))]
async fn catalog_node(state: AppState, env: String, node: String) -> Result<Html<String>> {
    catalogs::ensure_enabled(&state.settings)?;
    let envs = environment::fetch_and_resolve(state.puppetdb.as_ref(), &env).await?;
    let catalog = catalogs::fetch_catalog(state.puppetdb.as_ref(), &node).await?;
    render(&CatalogPage {
        nav: Nav::new(&envs, &env, Section::Catalogs),
        catalog: CatalogView::from(&catalog),
    })
}

// Radiator

async fn radiator_default(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let env = state.default_env();
    radiator_view(state, env, headers).await
}

async fn radiator_env(
    State(state): State<AppState>,
    Path(env): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    radiator_view(state, env, headers).await
}

#[tracing::instrument(level = "INFO", skip(state, headers))]
async fn radiator_view(state: AppState, env: String, headers: HeaderMap) -> Result<Response> {
    let envs = environment::fetch_and_resolve(state.puppetdb.as_ref(), &env).await?;
    let stats: RadiatorStats =
        radiator::radiator(state.puppetdb.as_ref(), &state.settings, &env, Utc::now()).await?;
    if wants_json(&headers) {
        return Ok(Json(stats).into_response());
    }
    let page = RadiatorPage::new(Nav::new(&envs, &env, Section::Radiator), &stats);
    Ok(render(&page)?.into_response())
}

// Inventory

async fn inventory_default(State(state): State<AppState>) -> Result<Html<String>> {
    let env = state.default_env();
    inventory_page(state, env).await
}

async fn inventory_env(
    State(state): State<AppState>,
    Path(env): Path<String>,
) -> Result<Html<String>> {
    inventory_page(state, env).await
}

#[tracing::instrument(level = "INFO", skip(state))]
async fn inventory_page(state: AppState, env: String) -> Result<Html<String>> {
    let envs = environment::fetch_and_resolve(state.puppetdb.as_ref(), &env).await?;
    let page = InventoryPage::new(
        Nav::new(&envs, &env, Section::Inventory),
        state.settings.inventory_fact_labels(),
        state.facts.is_server_side(),
    );
    render(&page)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryData {
    pub draw: i64,
    pub total: u64,
    pub total_filtered: u64,
    /// One row per node: the certname followed by the configured facts. Every
    /// cell is HTML.
    pub fact_data: Vec<Vec<String>>,
    pub columns: Vec<String>,
}

async fn inventory_json_default(
    State(state): State<AppState>,
    Query(params): Query<GridParams>,
) -> Result<Json<InventoryData>> {
    let env = state.default_env();
    inventory_data(state, env, params).await
}

async fn inventory_json_env(
    State(state): State<AppState>,
    Path(env): Path<String>,
    Query(params): Query<GridParams>,
) -> Result<Json<InventoryData>> {
    inventory_data(state, env, params).await
}

#[tracing::instrument(level = "INFO", skip(state))]
async fn inventory_data(
    state: AppState,
    env: String,
    params: GridParams,
) -> Result<Json<InventoryData>> {
    environment::fetch_and_resolve(state.puppetdb.as_ref(), &env).await?;
    let page = PageRequest::from_grid(&params, state.settings.normal_table_count);
    let table = state
        .facts
        .build(state.puppetdb.as_ref(), &env, &page)
        .await?;
    let columns = state.settings.inventory_fact_names();
    let fact_data = table
        .rows
        .into_iter()
        .map(|(certname, mut values)| {
            std::iter::once(escape_html(&certname))
                .chain(
                    columns
                        .iter()
                        .map(|name| values.remove(name).unwrap_or_default()),
                )
                .collect()
        })
        .collect();
    Ok(Json(InventoryData {
        draw: page.draw,
        total: table.total,
        total_filtered: table.total,
        fact_data,
        columns,
    }))
}

async fn app_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("../static/app.js"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn detects_json_in_accept_list() {
        assert!(wants_json(&accept("application/json")));
        assert!(wants_json(&accept("text/html, application/json;q=0.9")));
        assert!(!wants_json(&accept("text/html,application/xhtml+xml")));
        assert!(!wants_json(&HeaderMap::new()));
    }
}
