use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;

use schema_search::config::Config;
use schema_search::embedding::EmbeddingProvider;
use schema_search::search::SearchEngine;
use schema_search::server::router;

const SNAPSHOT: &str = r#"{"tables": {
    "customers": {"name": "customers", "columns": [{"name": "email", "type": "TEXT"}, {"name": "full_name", "type": "TEXT"}]},
    "orders": {
        "name": "orders",
        "columns": [{"name": "total", "type": "NUMERIC"}],
        "foreign_keys": [{"constrained_columns": ["customer_id"], "referred_table": "customers", "referred_columns": ["id"]}]
    },
    "shipments": {
        "name": "shipments",
        "columns": [{"name": "carrier", "type": "TEXT"}],
        "foreign_keys": [{"constrained_columns": ["order_id"], "referred_table": "orders", "referred_columns": ["id"]}]
    }
}}"#;

struct TestServer {
    _tmp: TempDir,
    snapshot: PathBuf,
    addr: SocketAddr,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn write_snapshot() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let snapshot = tmp.path().join("schema.json");
    std::fs::write(&snapshot, SNAPSHOT).unwrap();
    (tmp, snapshot)
}

async fn serve(tmp: TempDir, snapshot: PathBuf, app: Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        _tmp: tmp,
        snapshot,
        addr,
    }
}

async fn start() -> TestServer {
    let (tmp, snapshot) = write_snapshot();
    let engine = SearchEngine::open(Config::minimal(snapshot.clone()), false)
        .await
        .unwrap();
    serve(tmp, snapshot, router(Arc::new(engine))).await
}

/// Answers at once, except for texts mentioning "stall", which take 5s.
struct StallingProvider;

#[async_trait]
impl EmbeddingProvider for StallingProvider {
    fn model_name(&self) -> &str {
        "stalling"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("stall")) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
    }
}

async fn start_semantic() -> TestServer {
    let (tmp, snapshot) = write_snapshot();
    let mut config = Config::minimal(snapshot.clone());
    config.search.strategy = "semantic".to_string();
    config.embedding.provider = "ollama".to_string();
    config.embedding.model = Some("stalling".to_string());
    config.embedding.dims = Some(2);
    config.embedding.timeout_secs = 1;

    let provider: Arc<dyn EmbeddingProvider> = Arc::new(StallingProvider);
    let engine = SearchEngine::with_capabilities(config, Some(provider), None, false)
        .await
        .unwrap();
    serve(tmp, snapshot, router(Arc::new(engine))).await
}

#[tokio::test]
async fn test_health_reports_index_size() {
    let server = start().await;
    let body: Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["tables"], 3);
    assert_eq!(body["chunks"], 3);
}

#[tokio::test]
async fn test_search_returns_ranked_tables() {
    let server = start().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(server.url("/search"))
        .json(&json!({"query": "customer email", "limit": 2, "hops": 2, "explain": true}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["table"], "customers");
    assert_eq!(results[0]["related_tables"], json!(["orders", "shipments"]));
    assert_eq!(results[0]["explain"]["strategy"], "fuzzy");
    assert!(results[0]["score"].as_f64().unwrap() >= results[1]["score"].as_f64().unwrap());
}

#[tokio::test]
async fn test_search_rejects_bad_requests() {
    let server = start().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/search"))
        .json(&json!({"query": "  "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "query must not be empty");

    let resp = client
        .post(server.url("/search"))
        .json(&json!({"query": "orders", "limit": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(server.url("/search"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_related_endpoint() {
    let server = start().await;

    let body: Value = reqwest::get(server.url("/tables/shipments/related?hops=2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["table"], "shipments");
    assert_eq!(body["related"], json!(["customers", "orders"]));

    let body: Value = reqwest::get(server.url("/tables/shipments/related?hops=0"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["related"], json!([]));

    let resp = reqwest::get(server.url("/tables/payments/related"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_reload_swaps_snapshot() {
    let server = start().await;
    let client = reqwest::Client::new();

    std::fs::write(
        &server.snapshot,
        r#"{"tables": {"payments": {"name": "payments", "columns": [{"name": "amount", "type": "NUMERIC"}]}}}"#,
    )
    .unwrap();

    let resp = client.post(server.url("/reload")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["tables"], 1);

    let resp = client
        .post(server.url("/search"))
        .json(&json!({"query": "payment amount"}))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["results"][0]["table"], "payments");

    std::fs::write(&server.snapshot, "garbage").unwrap();
    let resp = client.post(server.url("/reload")).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "internal");

    let health: Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["tables"], 1);
}

#[tokio::test]
async fn test_slow_query_embedding_returns_408() {
    let server = start_semantic().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/search"))
        .json(&json!({"query": "customer email"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let started = Instant::now();
    let resp = client
        .post(server.url("/search"))
        .json(&json!({"query": "stalled shipments"}))
        .send()
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(resp.status(), 408);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "timeout");
    assert_eq!(
        body["error"]["message"],
        "query embedding timed out after 1s"
    );
}
