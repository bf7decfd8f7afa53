//! Admin HTTP API tests against a server bound to a free port.

use catalog_steward::auth::AllowlistAuthorizer;
use catalog_steward::engine::{CatalogEngine, EngineSettings};
use catalog_steward::lock::CategoryLock;
use catalog_steward::server::{serve, AppState};
use catalog_steward_core::schema::FieldRegistry;
use catalog_steward_core::standardize::TemplateGenerator;
use catalog_steward_core::store::memory::InMemoryStore;
use catalog_steward_core::store::RecordStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const ADMIN: &str = "ops@example.com";

struct TestServer {
    base: String,
    store: Arc<InMemoryStore>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(EngineSettings {
            batch_delay: Duration::ZERO,
            ..EngineSettings::default()
        })
        .await
    }

    async fn start_with(settings: EngineSettings) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let engine = CatalogEngine::new(
            store.clone(),
            FieldRegistry::builtin(),
            Arc::new(TemplateGenerator::new("https://img.test/catalog")),
            settings,
        );
        let state = AppState::new(
            Arc::new(engine),
            Arc::new(AllowlistAuthorizer::new([ADMIN])),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            serve(listener, state).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            store,
            client: reqwest::Client::new(),
        }
    }

    async fn seed(&self, record: Value) {
        let key = format!("nutrient:{}", record["id"].as_str().unwrap());
        self.store.set(&key, &record).await.unwrap();
    }

    async fn get(&self, path: &str, admin: Option<&str>) -> (u16, Value) {
        let mut req = self.client.get(format!("{}{}", self.base, path));
        if let Some(email) = admin {
            req = req.header("x-admin-email", email);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, admin: Option<&str>) -> (u16, Value) {
        let mut req = self.client.post(format!("{}{}", self.base, path));
        if let Some(email) = admin {
            req = req.header("x-admin-email", email);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn test_health_needs_no_identity() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/health", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let server = TestServer::start().await;
    let (status, body) = server.get("/categories/nutrient/analysis", None).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn test_unknown_identity_is_forbidden() {
    let server = TestServer::start().await;
    let (status, body) = server
        .post("/categories/nutrient/merge", Some("intruder@example.com"))
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "forbidden");
}

#[tokio::test]
async fn test_category_errors() {
    let server = TestServer::start().await;

    let (status, body) = server.post("/categories/spices/standardize", Some(ADMIN)).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "unknown_category");

    let (status, body) = server.get("/categories/Bad%20Name/analysis", Some(ADMIN)).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_busy_category_is_conflict() {
    let server = TestServer::start().await;
    let lock = CategoryLock::acquire(
        server.store.clone(),
        "nutrient",
        "standardize",
        Duration::from_secs(60),
    )
    .await
    .unwrap();

    let (status, body) = server.post("/categories/nutrient/merge", Some(ADMIN)).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "busy");

    lock.release().await.unwrap();
    let (status, _) = server.post("/categories/nutrient/merge", Some(ADMIN)).await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn test_categories_and_fields() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/categories", Some("OPS@example.com")).await;
    assert_eq!(status, 200);
    let categories: Vec<&str> = body["categories"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c.as_str().unwrap())
        .collect();
    assert!(categories.contains(&"nutrient"));
    assert!(body["schemaVersion"].is_number());

    let (status, body) = server.get("/categories/nutrient/fields", Some(ADMIN)).await;
    assert_eq!(status, 200);
    assert_eq!(body.as_object().unwrap().len(), 15);
    assert_eq!(body["name"]["required"], true);
    assert_eq!(body["food_sources"]["type"], "array");

    let (status, body) = server.get("/categories/spices/fields", Some(ADMIN)).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_analyze_standardize_merge_flow() {
    let server = TestServer::start().await;
    server
        .seed(json!({"id": "n1", "name": "Zinc", "sources": ["USDA"]}))
        .await;
    server
        .seed(json!({
            "id": "n2",
            "name": "zinc",
            "sources": ["EFSA"],
            "description": "Zinc is an essential trace mineral.",
        }))
        .await;

    let (status, analysis) = server.get("/categories/nutrient/analysis", Some(ADMIN)).await;
    assert_eq!(status, 200);
    assert_eq!(analysis["summary"]["totalNutrients"], 2);
    assert_eq!(analysis["summary"]["duplicateGroups"], 1);
    assert_eq!(analysis["duplicates"][0]["name"], "zinc");
    assert_eq!(analysis["expectedFields"].as_array().unwrap().len(), 15);

    let (status, planned) = server
        .post("/categories/nutrient/merge?dry_run=true", Some(ADMIN))
        .await;
    assert_eq!(status, 200);
    assert_eq!(planned["dryRun"], true);
    assert_eq!(planned["mergeResults"][0]["primaryId"], "n2");
    assert!(planned.get("summary").is_none());
    assert!(server.store.get("nutrient:n1").await.unwrap().is_some());

    let (status, merged) = server.post("/categories/nutrient/merge", Some(ADMIN)).await;
    assert_eq!(status, 200);
    assert_eq!(merged["merged"], 1);
    assert_eq!(merged["deleted"], 1);
    assert_eq!(merged["finalCount"], 1);
    assert_eq!(merged["mergeResults"][0]["mergedIds"], json!(["n1"]));
    assert_eq!(merged["summary"]["totalNutrients"], 1);
    assert_eq!(merged["summary"]["duplicateGroups"], 0);

    let (status, standardized) = server
        .post("/categories/nutrient/standardize", Some(ADMIN))
        .await;
    assert_eq!(status, 200);
    assert_eq!(standardized["standardized"], 1);
    assert_eq!(standardized["processedRecords"][0]["id"], "n2");
    assert_eq!(standardized["summary"]["totalNutrients"], 1);

    let (_, again) = server
        .post("/categories/nutrient/standardize", Some(ADMIN))
        .await;
    assert_eq!(again["standardized"], 0);
}

#[tokio::test]
async fn test_disconnected_client_does_not_cancel_run() {
    let server = TestServer::start_with(EngineSettings {
        batch_size: 1,
        batch_delay: Duration::from_millis(150),
        ..EngineSettings::default()
    })
    .await;
    for i in 1..=4 {
        server
            .seed(json!({"id": format!("n{}", i), "name": format!("Nutrient {}", i)}))
            .await;
    }

    let sent = server
        .client
        .post(format!("{}/categories/nutrient/standardize", server.base))
        .header("x-admin-email", ADMIN)
        .timeout(Duration::from_millis(50))
        .send()
        .await;
    assert!(sent.is_err(), "request should time out before the run ends");

    let mut finished = false;
    for _ in 0..60 {
        let records = server.store.get_by_prefix("nutrient:").await.unwrap();
        let done = records.iter().all(|r| r.get("standardized_at").is_some());
        let unlocked = server.store.get("_locks/nutrient").await.unwrap().is_none();
        if done && unlocked {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(finished, "run was cancelled with its client or left the lock behind");

    let (status, again) = server
        .post("/categories/nutrient/standardize", Some(ADMIN))
        .await;
    assert_eq!(status, 200);
    assert_eq!(again["standardized"], 0);
}
