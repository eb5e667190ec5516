//! Purpose: Stand-in Airtable list-records endpoint for integration tests.
//! Exports: `FakeAirtable`, `SeenRequest`, `TestResult`, test credentials.
//! Role: Lets the binary run its real HTTP client against loopback.
//! Invariants: Responses are chosen by the email inside the filter formula.
//! Invariants: Every request is recorded so tests can count upstream calls.
#![allow(dead_code)]

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

pub const API_KEY: &str = "patTEST";
pub const BASE_ID: &str = "appTEST";
pub const TABLE: &str = "Client Records";

#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub base_id: String,
    pub table: String,
    pub formula: Option<String>,
    pub page_size: Option<String>,
    pub authorization: Option<String>,
}

pub struct FakeAirtable {
    pub base_url: String,
    requests: Arc<Mutex<Vec<SeenRequest>>>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl FakeAirtable {
    pub fn start() -> TestResult<Self> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = requests.clone();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let thread = std::thread::spawn(move || {
            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(_) => return,
                };
                let app = Router::new()
                    .route("/v0/:base/:table", get(list_records))
                    .with_state(state);
                let _ = axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await;
            });
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            requests,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }
}

impl Drop for FakeAirtable {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn list_records(
    State(requests): State<Arc<Mutex<Vec<SeenRequest>>>>,
    AxumPath((base_id, table)): AxumPath<(String, String)>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let authorization = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let formula = query.get("filterByFormula").cloned();
    requests
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
        .push(SeenRequest {
            base_id,
            table,
            formula: formula.clone(),
            page_size: query.get("pageSize").cloned(),
            authorization: authorization.clone(),
        });

    if authorization.as_deref() != Some(format!("Bearer {API_KEY}").as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"type": "AUTHENTICATION_REQUIRED"}})),
        )
            .into_response();
    }

    let formula = formula.unwrap_or_default();
    if formula == "{Email}=\"test1@test1.com\"" {
        return Json(json!({
            "records": [{
                "id": "rec001",
                "createdTime": "2024-01-01T00:00:00.000Z",
                "fields": {
                    "Email": "test1@test1.com",
                    "Name": "Acme",
                    "Phone": "555-0100",
                }
            }],
            "offset": "itrNEXT/rec001",
        }))
        .into_response();
    }
    if formula.contains("fail@") {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": {"type": "SERVICE_UNAVAILABLE", "message": "secret upstream detail"}})),
        )
            .into_response();
    }
    if formula.contains("badshape@") {
        return Json(json!({
            "records": [{"id": "rec002", "fields": {"Name": "No email here"}}]
        }))
        .into_response();
    }
    if formula.contains("garbage@") {
        return (StatusCode::OK, "definitely not json").into_response();
    }
    if formula == "{Email}=\"o'brien@example.com\"" {
        return Json(json!({
            "records": [{
                "id": "rec003",
                "fields": {"Email": "o'brien@example.com", "Name": "O'Brien", "Tags": ["a", "b"]}
            }]
        }))
        .into_response();
    }
    Json(json!({ "records": [] })).into_response()
}
