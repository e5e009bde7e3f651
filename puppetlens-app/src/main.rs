use axum::http::header;
use axum::middleware::map_response;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use axum_prometheus::PrometheusMetricLayer;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use puppetlens_app::routes::{self, AppState};
use puppetlens_app::{errors, logger};
use puppetlens_core::config::{
    default_inventory_facts, parse_fact_templates, parse_inventory_fact, FactTemplates,
    InventoryFact, PuppetDbSettings, Settings,
};
use puppetlens_core::puppetdb::PuppetDbClient;
use shadow_rs::shadow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::propagate_header::PropagateHeaderLayer;
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::trace;
use tracing::{info, warn};

shadow!(build);

#[derive(Parser, Debug)]
#[command(name = "puppetlens")]
#[command(about = "Web dashboard for PuppetDB", long_about = None)]
struct Cli {
    #[arg(long, env = "PUPPETDB_HOST", default_value = "localhost")]
    puppetdb_host: String,
    #[arg(long, env = "PUPPETDB_PORT", default_value_t = 8080)]
    puppetdb_port: u16,
    #[arg(long, env = "PUPPETDB_PROTO", default_value = "http", value_parser = ["http", "https"])]
    puppetdb_proto: String,
    /// Timeout of PuppetDB requests, in seconds.
    #[arg(long, env = "PUPPETDB_TIMEOUT", default_value_t = 20)]
    puppetdb_timeout: u64,
    #[arg(long, env = "DEFAULT_ENVIRONMENT", default_value = "production")]
    default_environment: String,
    #[arg(
        long,
        env = "ENABLE_CATALOG",
        action = ArgAction::Set,
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    enable_catalog: bool,
    #[arg(long, env = "NORMAL_TABLE_COUNT", default_value_t = 100)]
    normal_table_count: u64,
    #[arg(long, env = "UNRESPONSIVE_HOURS", default_value_t = 2)]
    unresponsive_hours: u64,
    /// Inventory columns as comma-separated `label:fact` pairs.
    #[arg(long, env = "INVENTORY_FACTS", value_delimiter = ',', value_parser = parse_inventory_fact)]
    inventory_facts: Vec<InventoryFact>,
    /// JSON object mapping a fact name to its display template.
    #[arg(long, env = "INVENTORY_FACT_TEMPLATES", value_parser = parse_fact_templates)]
    inventory_fact_templates: Option<FactTemplates>,
    #[arg(
        long,
        env = "SERVER_SIDE_QUERIES",
        action = ArgAction::Set,
        default_value_t = false,
        value_parser = BoolishValueParser::new()
    )]
    server_side_queries: bool,
    #[arg(long, env = "LOGLEVEL", default_value = "info")]
    log_level: String,
    #[arg(long, env = "HTTP_HOST", default_value = "127.0.0.1")]
    http_host: String,
    #[arg(long, env = "HTTP_PORT", default_value_t = 5000)]
    http_port: u16,
}

impl Cli {
    fn settings(&self) -> Settings {
        let inventory_facts = if self.inventory_facts.is_empty() {
            default_inventory_facts()
        } else {
            self.inventory_facts.clone()
        };
        Settings {
            puppetdb: PuppetDbSettings {
                proto: self.puppetdb_proto.clone(),
                host: self.puppetdb_host.clone(),
                port: self.puppetdb_port,
                timeout: Duration::from_secs(self.puppetdb_timeout),
            },
            default_environment: self.default_environment.clone(),
            enable_catalog: self.enable_catalog,
            normal_table_count: self.normal_table_count,
            unresponsive_hours: self.unresponsive_hours,
            inventory_facts,
            inventory_fact_templates: self.inventory_fact_templates.clone().unwrap_or_default(),
            server_side_queries: self.server_side_queries,
            log_level: self.log_level.clone(),
        }
    }
}

pub const APP_VERSION: &str = shadow_rs::formatcp!(
    "{} ({} {}), build_env: {}, {}, {}",
    build::PKG_VERSION,
    build::SHORT_COMMIT,
    build::BUILD_TIME,
    build::RUST_VERSION,
    build::RUST_CHANNEL,
    build::CARGO_VERSION
);

async fn set_version_header<B>(mut res: Response<B>) -> Response<B> {
    match APP_VERSION.parse() {
        Ok(value) => {
            res.headers_mut().insert("x-version-id", value);
        }
        Err(err) => {
            warn!("Failed to parse x-version-id header value: {err}");
        }
    }
    res
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> errors::Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings();
    logger::setup(&settings.log_level);

    info!(
        "PuppetDB: {}, default environment: {}, catalogs enabled: {}, server-side inventory: {}",
        settings.puppetdb.base_url(),
        settings.default_environment,
        settings.enable_catalog,
        settings.server_side_queries
    );
    let inventory_facts: Vec<String> = settings
        .inventory_facts
        .iter()
        .map(ToString::to_string)
        .collect();
    info!("INVENTORY_FACTS: {inventory_facts:?}");

    let puppetdb = PuppetDbClient::new(&settings.puppetdb)?;
    let state = AppState::new(settings, Arc::new(puppetdb));

    let main_router = routes::create_route(state);
    let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
    let route = Router::new()
        .merge(main_router)
        .route("/metrics", get(|| async move { metric_handle.render() }))
        .layer(prometheus_layer)
        .layer(map_response(set_version_header))
        .layer(
            trace::TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().include_headers(true))
                .on_request(trace::DefaultOnRequest::new().level(tracing::Level::DEBUG))
                .on_response(trace::DefaultOnResponse::new().level(tracing::Level::INFO)),
        )
        .layer(SetSensitiveHeadersLayer::new(std::iter::once(
            header::AUTHORIZATION,
        )))
        .layer(CompressionLayer::new())
        .layer(PropagateHeaderLayer::new(header::HeaderName::from_static(
            "x-request-id",
        )))
        .layer(CorsLayer::permissive());

    let http_listener =
        tokio::net::TcpListener::bind((cli.http_host.as_str(), cli.http_port)).await?;
    let http_addr = http_listener.local_addr()?;
    let token = CancellationToken::new();

    info!("puppetlens {APP_VERSION} is running on http://{http_addr}");

    axum::serve(
        http_listener,
        route.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(token.clone()))
    .await?;

    info!("Server shutdown");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to install signal handler: {err}");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = token.cancelled() => {},
    }
    token.cancel();

    info!("signal received, starting graceful shutdown");
}
