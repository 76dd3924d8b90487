//! HTTP surface tests using `tower::ServiceExt::oneshot`

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use atim::config::Config;
use atim::server::TrendServer;
use atim::trends::{BatchReport, StaticTrendProvider, TrendState};
use common::{analyzer_with_limit, RecordingSleeper, DECLINING, RISING};

const BOUNDARY: &str = "atim-form-boundary";

fn provider() -> Arc<StaticTrendProvider> {
    Arc::new(
        StaticTrendProvider::new()
            .with_values("chunky sneakers", &RISING)
            .with_values("suede boots", &DECLINING),
    )
}

fn router_with(config: Config) -> Router {
    let limit = config.trends.max_keywords_per_batch;
    let analyzer = analyzer_with_limit(provider(), Arc::new(RecordingSleeper::default()), limit);
    TrendServer::new(analyzer, config).build_router()
}

fn router() -> Router {
    router_with(Config::default())
}

/// Config writing reports into `dir` with rule-based advice only
fn upload_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.report.output_dir = dir.to_path_buf();
    config.recommendation.use_llm = false;
    config
}

/// Form part: (name, file name, content)
type Part<'a> = (&'a str, Option<&'a str>, &'a str);

fn multipart(parts: &[Part<'_>]) -> Request<Body> {
    let mut body = String::new();
    for (name, filename, content) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        match filename {
            Some(filename) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: text/csv\r\n\r\n"
            )),
            None => body.push_str(&format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")),
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

const INVENTORY_CSV: &str = "product_name,current_stock,reorder_point,unit_price\n\
Chunky Sneakers,6,30,89.99\n\
Suede Boots,150,40,139.00\n\
Clogs,20,10,55.00\n";

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_analyze_returns_ranked_report() {
    let request = post_json(
        "/api/analyze",
        json!({
            "keywords": ["Chunky Sneakers", "suede boots", "clogs"],
            "min_confidence": 0.0
        }),
    );

    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report: BatchReport = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(report.requested, 3);
    assert_eq!(report.analyzed, 2);
    assert_eq!(report.skipped_count(), 1);
    assert_eq!(report.skipped[0].keyword, "clogs");

    let states: Vec<TrendState> = report.records.iter().map(|r| r.state).collect();
    assert_eq!(states, vec![TrendState::Declining, TrendState::Rising]);
}

#[tokio::test]
async fn test_analyze_uses_configured_min_confidence() {
    let request = post_json(
        "/api/analyze",
        json!({ "keywords": ["chunky sneakers"], "max_keywords": 1 }),
    );

    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report: BatchReport = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(report.records.len(), 1);
    assert!(report.records[0].confidence >= Config::default().trends.min_confidence);
}

#[tokio::test]
async fn test_analyze_rejects_invalid_confidence() {
    let request = post_json(
        "/api/analyze",
        json!({ "keywords": ["chunky sneakers"], "min_confidence": 150.0 }),
    );

    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("min_confidence"));
}

#[tokio::test]
async fn test_analyze_rejects_zero_limit() {
    let request = post_json(
        "/api/analyze",
        json!({ "keywords": ["chunky sneakers"], "max_keywords": 0 }),
    );

    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_rejects_malformed_body() {
    let request = Request::builder()
        .method("POST")
        .uri("/api/analyze")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"keywords\": "))
        .unwrap();

    let response = router().oneshot(request).await.unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let _ = atim::metrics::init_metrics();

    let response = router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_analyze_cannot_exceed_configured_batch_limit() {
    let mut config = Config::default();
    config.trends.max_keywords_per_batch = 2;

    let keywords: Vec<String> = (0..20).map(|i| format!("keyword {i}")).collect();
    let request = post_json(
        "/api/analyze",
        json!({ "keywords": keywords, "max_keywords": 1_000_000, "min_confidence": 0.0 }),
    );

    let response = router_with(config).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report: BatchReport = serde_json::from_value(body_json(response).await).unwrap();
    assert_eq!(report.requested, 2);
    assert_eq!(report.truncated, 18);
}

#[tokio::test]
async fn test_analyze_rejects_malformed_geo() {
    let request = post_json(
        "/api/analyze",
        json!({ "keywords": ["chunky sneakers"], "geo": "US;drop" }),
    );

    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("geo"));
}

#[tokio::test]
async fn test_upload_runs_pipeline_and_serves_report() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(upload_config(dir.path()));

    let request = multipart(&[
        ("file", Some("stock.csv"), INVENTORY_CSV),
        ("min_confidence", None, "0"),
    ]);
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["inventory_summary"]["total_items"], 3);
    assert_eq!(body["inventory_summary"]["low_stock_items"], 1);

    let trending: Vec<&str> = body["trending_products"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["keyword"].as_str().unwrap())
        .collect();
    assert_eq!(trending, vec!["suede boots", "chunky sneakers"]);
    assert_eq!(body["skipped"][0]["keyword"], "clogs");

    assert_eq!(body["recommendation_source"], "rules");
    assert!(body["recommendations"].as_str().unwrap().contains("Chunky Sneakers"));
    assert_eq!(body["low_stock_count"], 1);
    assert_eq!(body["low_stock_items"][0]["product_name"], "Chunky Sneakers");
    assert_eq!(body["low_stock_items"][0]["urgency"], "urgent");

    let report_url = body["report_url"].as_str().unwrap().to_string();
    assert!(report_url.starts_with("/reports/trend_report_"));

    let response = app
        .oneshot(Request::get(report_url.as_str()).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Chunky Sneakers"));
    assert!(html.contains("Source: rules"));
}

#[tokio::test]
async fn test_upload_rejects_missing_and_non_csv_files() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(upload_config(dir.path()));

    let cases = [
        (multipart(&[("min_confidence", None, "10")]), "No file provided"),
        (multipart(&[("file", Some(""), INVENTORY_CSV)]), "No file selected"),
        (multipart(&[("file", Some("stock.xlsx"), INVENTORY_CSV)]), "Invalid file type"),
    ];

    for (request, expected) in cases {
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains(expected), "{body}");
    }

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_rejects_bad_inventory_and_fields() {
    let dir = tempfile::tempdir().unwrap();
    let app = router_with(upload_config(dir.path()));

    let missing_name = multipart(&[("file", Some("stock.csv"), "sku,stock\nA1,4\n")]);
    let response = app.clone().oneshot(missing_name).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("product_name"));

    let bad_limit = multipart(&[
        ("file", Some("stock.csv"), INVENTORY_CSV),
        ("max_keywords", None, "many"),
    ]);
    let response = app.clone().oneshot(bad_limit).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bad_confidence = multipart(&[
        ("file", Some("stock.csv"), INVENTORY_CSV),
        ("min_confidence", None, "150"),
    ]);
    let response = app.oneshot(bad_confidence).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_upload_enforces_body_limit() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = upload_config(dir.path());
    config.server.max_upload_bytes = 256;

    let mut csv = String::from("product_name,current_stock\n");
    for i in 0..50 {
        csv.push_str(&format!("Sneaker Model {i},{i}\n"));
    }

    let response = router_with(config)
        .oneshot(multipart(&[("file", Some("stock.csv"), csv.as_str())]))
        .await
        .unwrap();

    assert!(response.status().is_client_error(), "status {}", response.status());
    assert!(!dir.path().exists() || std::fs::read_dir(dir.path()).unwrap().count() == 0);
}

#[tokio::test]
async fn test_report_download_rejects_traversal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "secret").unwrap();
    let app = router_with(upload_config(dir.path()));

    for uri in ["/reports/..%2Fconfig.toml", "/reports/notes.txt", "/reports/.hidden.html"] {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
    }

    let response = app
        .oneshot(Request::get("/reports/missing.html").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
