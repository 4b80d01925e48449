//! HTTP Server for the partlens API.
//!
//! Provides session-scoped upload and view endpoints over the pipeline
//! snapshot.
//!
//! # API Endpoints
//!
//! | Method | Path                               | Description                   |
//! |--------|------------------------------------|-------------------------------|
//! | GET    | `/health`                          | Health check                  |
//! | POST   | `/api/sessions`                    | Create a session              |
//! | DELETE | `/api/sessions/{id}`               | Discard a session             |
//! | POST   | `/api/sessions/{id}/upload`        | Upload input files            |
//! | GET    | `/api/sessions/{id}/summary`       | Current snapshot summary      |
//! | GET    | `/api/sessions/{id}/categories`    | Columns available by category |
//! | POST   | `/api/sessions/{id}/products`      | Filtered product view         |
//! | POST   | `/api/sessions/{id}/references`    | Filtered reference view       |
//! | POST   | `/api/sessions/{id}/applications`  | Filtered application view     |
//! | GET    | `/api/sessions/{id}/options`       | Selector values               |
//! | GET    | `/api/logs?session={id}`           | SSE stream for real-time logs |

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{delete, get, post},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_error, LogEntry, LOG_BROADCASTER};
use super::session::{idle_ttl_from_env, SessionStore};
use super::types::{CategoriesResponse, SessionCreated, SnapshotSummary, TablePayload};
use crate::error::{ServerError, ServerResult};
use crate::models::TableKind;
use crate::query::{self, ProductFilter, SelectorOptions, ValueSetFilter};
use crate::transform::pipeline::{InputFile, PipelineOptions};

const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Query string of the options endpoint
#[derive(Debug, Default, Deserialize)]
struct OptionsQuery {
    category: Option<String>,
}

/// Query string of the log stream
#[derive(Debug, Default, Deserialize)]
struct LogStreamQuery {
    session: Option<String>,
}

fn session_log(id: &str, entry: LogEntry) {
    LOG_BROADCASTER.log(entry.for_session(id));
}

/// Build the application router over a session store
pub fn build_router(store: SessionStore) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}", delete(delete_session))
        .route("/api/sessions/{id}/upload", post(upload))
        .route("/api/sessions/{id}/summary", get(summary))
        .route("/api/sessions/{id}/categories", get(categories))
        .route("/api/sessions/{id}/products", post(products))
        .route("/api/sessions/{id}/references", post(references))
        .route("/api/sessions/{id}/applications", post(applications))
        .route("/api/sessions/{id}/options", get(options))
        .route("/api/logs", get(sse_logs))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .with_state(store)
}

/// Start the HTTP server
pub async fn start_server(port: u16, options: PipelineOptions) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        product_id_column = %options.product_id_column,
        category_column = %options.category_column,
        min_pivot_width = options.min_pivot_width,
        "pipeline options"
    );
    let store = SessionStore::new(options).with_idle_ttl(idle_ttl_from_env());
    tracing::info!(idle_ttl_secs = store.idle_ttl().as_secs(), "session eviction enabled");

    let sweeper = store.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = sweeper.evict_idle() {
                log_error(format!("Session eviction failed: {}", e));
            }
        }
    });

    let app = build_router(store);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("partlens server running on http://localhost:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Health check endpoint
async fn health(State(store): State<SessionStore>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "partlens",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": store.len(),
    }))
}

async fn create_session(State(store): State<SessionStore>) -> ServerResult<(StatusCode, Json<SessionCreated>)> {
    let session_id = store.create()?;
    Ok((StatusCode::CREATED, Json(SessionCreated { session_id })))
}

async fn delete_session(State(store): State<SessionStore>, Path(id): Path<String>) -> ServerResult<StatusCode> {
    store.remove(&id)?;
    session_log(&id, LogEntry::info(format!("Session {} closed", id)));
    Ok(StatusCode::NO_CONTENT)
}

/// Upload endpoint. Files are read fully before the session is touched.
async fn upload(
    State(store): State<SessionStore>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ServerResult<Json<SnapshotSummary>> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        let Some(kind) = TableKind::from_name(&name) else {
            session_log(&id, LogEntry::warning(format!("Ignoring unknown upload field '{}'", name)));
            continue;
        };
        let file_name = field.file_name().map(String::from);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;

        session_log(
            &id,
            LogEntry::info(format!(
                "📄 {} upload: {} ({} bytes)",
                kind,
                file_name.as_deref().unwrap_or("unnamed"),
                bytes.len()
            )),
        );
        files.push((kind, InputFile::new(file_name, bytes.to_vec())));
    }

    let session_id = id.clone();
    let outcome = tokio::task::spawn_blocking(move || store.upload(&session_id, files))
        .await
        .map_err(|e| ServerError::Internal(format!("pipeline task failed: {}", e)))?
        .inspect_err(|e| session_log(&id, LogEntry::error(format!("Upload failed: {}", e))))?;

    let summary = SnapshotSummary::new(&id, &outcome.snapshot, outcome.cached);
    session_log(
        &id,
        LogEntry::success(format!(
            "{} products, {} categories",
            summary.rows.products,
            summary.categories.len()
        )),
    );
    Ok(Json(summary))
}

async fn summary(State(store): State<SessionStore>, Path(id): Path<String>) -> ServerResult<Json<SnapshotSummary>> {
    let snapshot = store.snapshot(&id)?;
    Ok(Json(SnapshotSummary::new(&id, &snapshot, true)))
}

async fn categories(State(store): State<SessionStore>, Path(id): Path<String>) -> ServerResult<Json<CategoriesResponse>> {
    let snapshot = store.snapshot(&id)?;
    Ok(Json(CategoriesResponse {
        category_column: snapshot.category_column.clone(),
        categories: snapshot.category_columns.clone(),
    }))
}

async fn products(
    State(store): State<SessionStore>,
    Path(id): Path<String>,
    Json(filter): Json<ProductFilter>,
) -> ServerResult<Json<TablePayload>> {
    let snapshot = store.snapshot(&id)?;
    Ok(Json(query::product_view(&snapshot, &filter).into()))
}

async fn references(
    State(store): State<SessionStore>,
    Path(id): Path<String>,
    Json(filter): Json<ValueSetFilter>,
) -> ServerResult<Json<TablePayload>> {
    let snapshot = store.snapshot(&id)?;
    Ok(Json(query::reference_view(&snapshot, &filter).into()))
}

async fn applications(
    State(store): State<SessionStore>,
    Path(id): Path<String>,
    Json(filter): Json<ValueSetFilter>,
) -> ServerResult<Json<TablePayload>> {
    let snapshot = store.snapshot(&id)?;
    Ok(Json(query::application_view(&snapshot, &filter).into()))
}

async fn options(
    State(store): State<SessionStore>,
    Path(id): Path<String>,
    Query(params): Query<OptionsQuery>,
) -> ServerResult<Json<SelectorOptions>> {
    let snapshot = store.snapshot(&id)?;
    Ok(Json(query::selector_options(&snapshot, params.category.as_deref())))
}

/// SSE endpoint for real-time log streaming.
///
/// With `?session=` the stream carries that session's entries plus
/// server-wide ones; without it, server-wide entries only.
async fn sse_logs(Query(params): Query<LogStreamQuery>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();
    let session = params.session;

    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(entry) if entry.visible_to(session.as_deref()) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        Ok(_) => None,
        // Lagged receivers skip missed entries
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
