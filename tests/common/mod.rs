#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use error_digest::config::ElasticsearchConfig;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Minimal stand-in for the Elasticsearch endpoints the client uses.
#[derive(Default)]
pub struct MockEs {
    pub indices: HashSet<String>,
    /// (index, aggregation field) -> buckets
    pub terms: HashMap<(String, String), Vec<(String, i64)>>,
    /// (index, filtered) -> count
    pub counts: HashMap<(String, bool), i64>,
    /// index -> number of 503s to answer before succeeding
    pub flaky: Mutex<HashMap<String, usize>>,
    pub kibana_alias: Option<String>,
    pub index_pattern_id: Option<String>,
    pub requests: Mutex<Vec<(Method, String, Value)>>,
}

impl MockEs {
    pub fn with_index(mut self, index: &str) -> Self {
        self.indices.insert(index.to_string());
        self
    }

    pub fn with_terms(mut self, index: &str, field: &str, pairs: &[(&str, i64)]) -> Self {
        self.indices.insert(index.to_string());
        self.terms.insert(
            (index.to_string(), field.to_string()),
            pairs.iter().map(|(t, c)| (t.to_string(), *c)).collect(),
        );
        self
    }

    pub fn with_counts(mut self, index: &str, total: i64, filtered: i64) -> Self {
        self.indices.insert(index.to_string());
        self.counts.insert((index.to_string(), false), total);
        self.counts.insert((index.to_string(), true), filtered);
        self
    }

    pub fn with_flaky(self, index: &str, failures: usize) -> Self {
        self.flaky
            .lock()
            .unwrap()
            .insert(index.to_string(), failures);
        self
    }

    pub fn request_count(&self, path_prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, path, _)| path.starts_with(path_prefix))
            .count()
    }
}

fn not_found(index: &str) -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": { "type": "index_not_found_exception", "index": index },
            "status": 404
        })),
    )
        .into_response()
}

async fn handle(
    State(es): State<Arc<MockEs>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> axum::response::Response {
    let path = uri.path().trim_start_matches('/').to_string();
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    es.requests
        .lock()
        .unwrap()
        .push((method.clone(), path.clone(), body.clone()));

    let mut parts = path.splitn(2, '/');
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.next().unwrap_or_default().to_string();

    if first == "_alias" {
        return match &es.kibana_alias {
            Some(target) => Json(json!({ target: { "aliases": { rest: {} } } })).into_response(),
            None => (StatusCode::NOT_FOUND, Json(json!({ "status": 404 }))).into_response(),
        };
    }

    if es.kibana_alias.as_deref() == Some(first.as_str()) {
        let hits: Vec<Value> = es
            .index_pattern_id
            .iter()
            .map(|id| json!({ "_id": format!("index-pattern:{id}") }))
            .collect();
        return Json(json!({ "hits": { "hits": hits } })).into_response();
    }

    {
        let mut flaky = es.flaky.lock().unwrap();
        if let Some(remaining) = flaky.get_mut(&first) {
            if *remaining > 0 {
                *remaining -= 1;
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "unavailable" })),
                )
                    .into_response();
            }
        }
    }

    if !es.indices.contains(&first) {
        return not_found(&first);
    }

    match rest.as_str() {
        "_count" => {
            let filtered = !body.is_null();
            let count = es.counts.get(&(first, filtered)).copied().unwrap_or(0);
            Json(json!({ "count": count })).into_response()
        }
        "_search" => {
            let field = body["aggs"]
                .as_object()
                .and_then(|aggs| aggs.keys().next().cloned())
                .unwrap_or_default();
            let size = body["aggs"][field.as_str()]["terms"]["size"]
                .as_u64()
                .unwrap_or(10) as usize;
            let buckets: Vec<Value> = es
                .terms
                .get(&(first, field.clone()))
                .map(|pairs| {
                    pairs
                        .iter()
                        .take(size)
                        .map(|(term, count)| json!({ "key": term, "doc_count": count }))
                        .collect()
                })
                .unwrap_or_default();
            Json(json!({
                "hits": { "total": { "value": 0 }, "hits": [] },
                "aggregations": { field: { "buckets": buckets } }
            }))
            .into_response()
        }
        _ => (StatusCode::BAD_REQUEST, Json(json!({ "error": "unsupported" }))).into_response(),
    }
}

pub async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn spawn_es(es: MockEs) -> (String, Arc<MockEs>) {
    let es = Arc::new(es);
    let router = Router::new().fallback(handle).with_state(es.clone());
    (spawn(router).await, es)
}

/// Captures JSON payloads posted to `/hook`; `/broken` always answers 500.
#[derive(Default)]
pub struct MockHook {
    pub payloads: Mutex<Vec<Value>>,
}

async fn capture(State(hook): State<Arc<MockHook>>, Json(payload): Json<Value>) -> StatusCode {
    hook.payloads.lock().unwrap().push(payload);
    StatusCode::OK
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

pub async fn spawn_hook() -> (String, Arc<MockHook>) {
    let hook = Arc::new(MockHook::default());
    let router = Router::new()
        .route("/hook", post(capture))
        .route("/broken", post(broken))
        .with_state(hook.clone());
    (spawn(router).await, hook)
}

/// Address nothing listens on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub fn es_config(urls: Vec<String>, max_retries: u32) -> ElasticsearchConfig {
    ElasticsearchConfig {
        urls,
        index: "logs".to_string(),
        timeout_secs: 10,
        max_retries,
        kibana_url: None,
    }
}
