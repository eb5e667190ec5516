//! Purpose: Provide the HTTP/JSON lookup server and the embedded viewer page.
//! Exports: `ServeConfig`, `serve`, `validate_config`.
//! Role: Axum server wrapping `RecordFetcher` for browser and API clients.
//! Invariants: Error bodies are generic; upstream detail only reaches the logs.
//! Invariants: Each lookup performs at most one upstream request, off the async runtime.
//! Notes: CORS and frame-ancestors defaults allow embedding the viewer anywhere.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use airlookup::api::{AirtableConfig, Email, Error, ErrorKind, RecordFetcher};

pub const INVALID_EMAIL_MESSAGE: &str = "Invalid email format";
pub const FETCH_FAILED_MESSAGE: &str = "Failed to fetch Airtable data";

const VIEWER_HTML: &str = include_str!("ui/viewer.html");

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub airtable: AirtableConfig,
    pub cors_allowed_origins: Vec<String>,
    pub frame_ancestors: String,
}

#[derive(Clone)]
struct AppState {
    fetcher: RecordFetcher,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let fetcher = RecordFetcher::airtable(&config.airtable)?;
    let app = app(fetcher, &config)?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(
        bind = %config.bind,
        base_id = %config.airtable.base_id,
        table = %config.airtable.table,
        "serving airtable lookups"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    config.airtable.validate()?;

    if HeaderValue::from_str(&frame_ancestors_policy(&config.frame_ancestors)).is_err()
        || config.frame_ancestors.trim().is_empty()
    {
        return Err(Error::new(ErrorKind::Config)
            .with_message("--frame-ancestors is not a valid header value")
            .with_hint("Use '*' or a space-separated list of origins."));
    }

    for origin in &config.cors_allowed_origins {
        if origin != "*" && HeaderValue::from_str(origin).is_err() {
            return Err(Error::new(ErrorKind::Config)
                .with_message(format!("invalid --cors-origin value {origin:?}"))
                .with_hint("Use '*' or an origin like https://example.com."));
        }
    }
    if config.cors_allowed_origins.len() > 1
        && config.cors_allowed_origins.iter().any(|origin| origin == "*")
    {
        return Err(Error::new(ErrorKind::Config)
            .with_message("--cors-origin '*' cannot be combined with other origins"));
    }

    Ok(())
}

fn app(fetcher: RecordFetcher, config: &ServeConfig) -> Result<Router, Error> {
    let csp = HeaderValue::from_str(&frame_ancestors_policy(&config.frame_ancestors)).map_err(
        |err| {
            Error::new(ErrorKind::Config)
                .with_message("invalid frame-ancestors policy")
                .with_source(err)
        },
    )?;
    let state = Arc::new(AppState { fetcher });

    Ok(Router::new()
        .route("/", get(viewer))
        .route("/healthz", get(healthz))
        .route("/api/airtable", get(lookup_records))
        .layer(build_cors_layer(&config.cors_allowed_origins))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            csp,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn frame_ancestors_policy(frame_ancestors: &str) -> String {
    format!("frame-ancestors {}", frame_ancestors.trim())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| origin.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET])
        .allow_headers([HeaderName::from_static("content-type")])
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Deserialize)]
struct LookupQuery {
    email: Option<String>,
}

async fn viewer() -> Html<&'static str> {
    Html(VIEWER_HTML)
}

async fn healthz() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn lookup_records(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LookupQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            return error_response(
                Error::new(ErrorKind::InvalidInput)
                    .with_message("malformed query string")
                    .with_source(rejection),
            );
        }
    };
    let email = match query.email.as_deref().map(Email::parse) {
        Some(Ok(email)) => email,
        Some(Err(err)) => return error_response(err),
        None => {
            return error_response(
                Error::new(ErrorKind::InvalidInput).with_message("missing email parameter"),
            );
        }
    };

    let fetcher = state.fetcher.clone();
    let result = tokio::task::spawn_blocking(move || fetcher.fetch_records(&email))
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("lookup task failed")
                .with_source(err)
        })
        .and_then(|result| result);

    match result {
        Ok(records) => Json(records).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: Error) -> Response {
    let (status, message) = match err.kind() {
        ErrorKind::InvalidInput => {
            tracing::warn!(error = %err, "rejected lookup");
            (StatusCode::BAD_REQUEST, INVALID_EMAIL_MESSAGE)
        }
        ErrorKind::Upstream | ErrorKind::Config | ErrorKind::Io | ErrorKind::Internal => {
            tracing::error!(error = %err, upstream_status = ?err.status(), "airtable lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, FETCH_FAILED_MESSAGE)
        }
    };
    (status, Json(json!({ "error": message }))).into_response()
}
