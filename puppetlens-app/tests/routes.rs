use axum::body::{to_bytes, Body};
use axum::Router;
use chrono::Utc;
use http::{header, Request, StatusCode};
use puppetlens_app::routes::{create_route, AppState};
use puppetlens_core::config::{FactTemplates, InventoryFact, Settings};
use puppetlens_core::puppetdb::{Catalog, FactRecord, InventoryRecord, MetricVersion, NodeRecord};
use puppetlens_core::testing::{Call, InMemoryPuppetDb};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

fn node(certname: &str, status: &str) -> NodeRecord {
    NodeRecord {
        certname: certname.to_string(),
        report_timestamp: Some(Utc::now()),
        catalog_timestamp: Some(Utc::now()),
        latest_report_status: Some(status.to_string()),
        ..Default::default()
    }
}

fn catalog(certname: &str) -> Catalog {
    Catalog {
        certname: certname.to_string(),
        environment: Some("production".to_string()),
        ..Default::default()
    }
}

fn catalogs_enabled() -> Settings {
    Settings {
        enable_catalog: true,
        ..Settings::default()
    }
}

fn app(settings: Settings, db: InMemoryPuppetDb) -> (Router, Arc<InMemoryPuppetDb>) {
    let db = Arc::new(db);
    let state = AppState::new(settings, db.clone());
    (create_route(state), db)
}

async fn get(app: Router, uri: &str, accept: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut request = Request::builder().uri(uri);
    if let Some(accept) = accept {
        request = request.header(header::ACCEPT, accept);
    }
    let response = app
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = get(app, uri, Some("application/json")).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn get_html(app: Router, uri: &str) -> (StatusCode, String) {
    let (status, body) = get(app, uri, None).await;
    (status, String::from_utf8(body).unwrap())
}

#[tokio::test]
async fn disabled_catalog_is_forbidden_without_remote_call() {
    let (app, db) = app(Settings::default(), InMemoryPuppetDb::default());
    let (status, body) = get_json(app, "/catalog/node1").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 40301);
    assert!(db.calls().is_empty(), "{:?}", db.calls());
}

#[tokio::test]
async fn disabled_catalog_gates_listing_and_data() {
    for uri in ["/catalogs", "/production/catalogs/json", "/catalogs/compare/a...b"] {
        let (app, _) = app(Settings::default(), InMemoryPuppetDb::default());
        let (status, _) = get(app, uri, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }
}

#[tokio::test]
async fn unknown_environment_is_not_found() {
    let (app, _) = app(Settings::default(), InMemoryPuppetDb::default());
    let (status, body) = get_json(app, "/dev/radiator").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 40401);
}

#[tokio::test]
async fn radiator_json_for_environment() {
    let db = InMemoryPuppetDb {
        nodes: vec![
            node("web01", "changed"),
            node("web02", "failed"),
            node("web03", "changed"),
        ],
        node_count: 4,
        ..Default::default()
    };
    let (app, db) = app(Settings::default(), db);
    let (status, body) = get_json(app, "/production/radiator").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "changed": 2, "changed_percent": 50,
            "failed": 1, "failed_percent": 25,
            "noop": 0, "noop_percent": 0,
            "skipped": 0, "skipped_percent": 0,
            "unchanged": 0, "unchanged_percent": 0,
            "unreported": 0, "unreported_percent": 0,
            "total": 4
        })
    );
    assert!(db
        .calls()
        .iter()
        .any(|call| matches!(call, Call::NodeCount(_))));
}

#[tokio::test]
async fn radiator_for_all_environments_reads_metrics() {
    let db = InMemoryPuppetDb {
        nodes: vec![node("web01", "unchanged")],
        num_nodes_metric: 1,
        ..Default::default()
    };
    let (app, db) = app(Settings::default(), db);
    let (status, body) = get_json(app, "/*/radiator").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unchanged_percent"], 100);
    assert!(db
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Metric(_, MetricVersion::V2))));
}

#[tokio::test]
async fn radiator_renders_html_without_json_accept() {
    let db = InMemoryPuppetDb {
        nodes: vec![node("web01", "failed")],
        node_count: 1,
        ..Default::default()
    };
    let (app, _) = app(Settings::default(), db);
    let (status, html) = get_html(app, "/radiator").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Total nodes: 1"), "{html}");
    assert!(html.contains(r#"href="/staging/radiator""#));
}

fn inventory_db() -> InMemoryPuppetDb {
    let facts: serde_json::Map<String, Value> =
        serde_json::from_value(json!({"os": "linux", "fqdn": "web01.example.com"})).unwrap();
    InMemoryPuppetDb {
        facts: vec![
            FactRecord {
                certname: "web01".to_string(),
                name: "os".to_string(),
                value: json!("linux"),
                environment: Some("production".to_string()),
            },
            FactRecord {
                certname: "web01".to_string(),
                name: "fqdn".to_string(),
                value: json!("web01.example.com"),
                environment: Some("production".to_string()),
            },
        ],
        inventory: vec![InventoryRecord {
            certname: "web01".to_string(),
            facts,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn inventory_settings(server_side_queries: bool) -> Settings {
    Settings {
        inventory_facts: vec![
            InventoryFact::new("OS", "os"),
            InventoryFact::new("Hostname", "fqdn"),
        ],
        inventory_fact_templates: FactTemplates::new(HashMap::from([(
            "os".to_string(),
            "OS: {{value}}".to_string(),
        )])),
        server_side_queries,
        ..Settings::default()
    }
}

#[tokio::test]
async fn inventory_json_renders_templates_in_both_modes() {
    for server_side in [false, true] {
        let (app, db) = app(inventory_settings(server_side), inventory_db());
        let (status, body) = get_json(app, "/inventory/json?draw=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "draw": 3,
                "total": 1,
                "totalFiltered": 1,
                "factData": [["web01", "OS: linux", "web01.example.com"]],
                "columns": ["os", "fqdn"]
            }),
            "server_side = {server_side}"
        );
        let used_inventory = db
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Inventory(_)));
        assert_eq!(used_inventory, server_side);
    }
}

#[tokio::test]
async fn inventory_page_lists_fact_labels() {
    let (app, _) = app(inventory_settings(true), inventory_db());
    let (status, html) = get_html(app, "/staging/inventory").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("<th>Hostname</th>"));
    assert!(html.contains(r#"data-url="/staging/inventory/json""#));
    assert!(html.contains(r#"data-server-side="true""#));
}

#[tokio::test]
async fn catalogs_json_pages_and_echoes_draw() {
    let db = InMemoryPuppetDb {
        nodes: vec![node("web01", "changed"), node("web02", "changed"), node("web03", "changed")],
        ..Default::default()
    };
    let (app, db) = app(catalogs_enabled(), db);
    let uri = "/production/catalogs/json?draw=5&start=1&length=1\
               &order%5B0%5D%5Bcolumn%5D=1&order%5B0%5D%5Bdir%5D=desc";
    let (status, body) = get_json(app, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["draw"], 5);
    assert_eq!(body["total"], 3);
    assert_eq!(body["totalFiltered"], 3);
    assert_eq!(body["currentEnv"], "production");
    assert_eq!(body["envs"], json!(["production", "staging"]));
    assert_eq!(body["catalogs"].as_array().unwrap().len(), 1);
    assert_eq!(body["catalogs"][0]["certname"], "web02");
    assert_eq!(body["columns"][0]["attr"], "certname");

    let params = db
        .calls()
        .into_iter()
        .find_map(|call| match call {
            Call::Nodes(params) => Some(params),
            _ => None,
        })
        .unwrap();
    assert_eq!(params.limit, Some(1));
    assert_eq!(params.offset, Some(1));
    assert_eq!(
        params.order_by.unwrap().to_string(),
        r#"[{"field":"catalog_timestamp","order":"desc"}]"#
    );
}

#[tokio::test]
async fn compare_listing_marks_rows_with_base_node() {
    let db = InMemoryPuppetDb {
        nodes: vec![node("web02", "changed")],
        ..Default::default()
    };
    let (app, _) = app(catalogs_enabled(), db);
    let (status, body) = get_json(app, "/catalogs/compare/web01/json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["catalogs"][0]["form"], "web01");
}

#[tokio::test]
async fn out_of_range_sort_column_is_bad_request() {
    let (app, db) = app(catalogs_enabled(), InMemoryPuppetDb::default());
    let (status, body) = get_json(app, "/catalogs/json?order%5B0%5D%5Bcolumn%5D=9").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 40001);
    assert!(!db.calls().iter().any(|call| matches!(call, Call::Nodes(_))));
}

#[tokio::test]
async fn malformed_paging_integer_is_bad_request() {
    let (app, _) = app(catalogs_enabled(), InMemoryPuppetDb::default());
    let (status, _) = get(app, "/catalogs/json?start=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn shows_single_catalog() {
    let db = InMemoryPuppetDb {
        catalogs: HashMap::from([("web01".to_string(), catalog("web01"))]),
        ..Default::default()
    };
    let (app, _) = app(catalogs_enabled(), db);
    let (status, html) = get_html(app.clone(), "/production/catalog/web01").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Catalog for web01"));

    let (status, _) = get(app, "/catalog/gone", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn compares_two_catalogs_side_by_side() {
    let db = InMemoryPuppetDb {
        catalogs: HashMap::from([
            ("web01".to_string(), catalog("web01")),
            ("web02".to_string(), catalog("web02")),
        ]),
        ..Default::default()
    };
    let (app, db) = app(catalogs_enabled(), db);
    let (status, html) = get_html(app, "/production/catalogs/compare/web01...web02").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("web01 vs web02"));
    let fetched: Vec<Call> = db
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Catalog(_)))
        .collect();
    assert_eq!(
        fetched,
        vec![
            Call::Catalog("web01".to_string()),
            Call::Catalog("web02".to_string())
        ]
    );
}

#[tokio::test]
async fn compare_with_single_node_shows_listing() {
    let (app, db) = app(catalogs_enabled(), InMemoryPuppetDb::default());
    let (status, html) = get_html(app, "/catalogs/compare/web01").await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Compare with web01"));
    assert!(html.contains(r#"data-url="/production/catalogs/compare/web01/json""#));
    assert!(!db.calls().iter().any(|call| matches!(call, Call::Catalog(_))));
}

#[tokio::test]
async fn serves_grid_script() {
    let (app, _) = app(Settings::default(), InMemoryPuppetDb::default());
    let (status, body) = get(app, "/static/app.js", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("DataTable"));
}

#[tokio::test]
async fn untemplated_fact_markup_is_escaped() {
    let db = InMemoryPuppetDb {
        facts: vec![FactRecord {
            certname: "<web01>".to_string(),
            name: "motd".to_string(),
            value: json!("<img src=x onerror=alert(1)>"),
            environment: Some("production".to_string()),
        }],
        ..Default::default()
    };
    let settings = Settings {
        inventory_facts: vec![InventoryFact::new("Motd", "motd")],
        ..Settings::default()
    };
    let (app, _) = app(settings, db);
    let (status, body) = get_json(app, "/inventory/json").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["factData"],
        json!([["&lt;web01&gt;", "&lt;img src=x onerror=alert(1)&gt;"]])
    );
}

#[tokio::test]
async fn remote_failures_are_server_errors() {
    for (status, uri) in [(503, "/production/radiator"), (400, "/production/inventory/json")] {
        let db = InMemoryPuppetDb {
            fail_with: Some(status),
            ..Default::default()
        };
        let (app, _) = app(Settings::default(), db);
        let (code, body) = get_json(app, uri).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
        assert_eq!(body["code"], 50001, "{uri}");
    }
}

#[tokio::test]
async fn remote_failure_fetching_catalog_is_server_error() {
    let db = InMemoryPuppetDb {
        fail_with: Some(503),
        ..Default::default()
    };
    let (app, _) = app(catalogs_enabled(), db);
    let (status, body) = get_json(app, "/catalog/web01").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], 50001);
}

#[tokio::test]
async fn disabled_catalog_wins_over_unknown_environment() {
    let (app, db) = app(Settings::default(), InMemoryPuppetDb::default());
    let (status, body) = get_json(app, "/dev/catalogs").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 40301);
    assert!(db.calls().is_empty());
}
