//! api-server — HTTP API for the library catalog workspace.
//!
//! Exposes list/create/delete over books, each routed per request to the
//! relational (SQLite) or document (MongoDB) backend by the `dataSource`
//! query parameter (`mysql` default, `mongo` case-insensitive).
//! - Responses use the `{code, message, data}` envelope from `http-common`.
//! - Repository calls run on a bounded blocking worker pool.
//! - CORS: Configurable via CORS_ALLOW_ORIGIN (origin string).
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # JSON logs, custom stores
//! LOG_FORMAT=json DB_PATH=/tmp/library.db \
//! MONGODB_URI=mongodb://localhost:27017 \
//!   cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;
mod workers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use domain::service::BookService;
use domain::{Backend, Book, BookRepository, CoreError};
use http_common::ApiResponse;
use mongo_adapter::{MongoBookRepo, MongoPool};
use serde::{Deserialize, Serialize};
use sqlite_adapter::{SqliteBookRepo, SqlitePool};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workers::WorkerPool;

type Catalog = BookService<Arc<dyn BookRepository>, Arc<dyn BookRepository>>;

#[derive(Clone)]
struct AppState {
    workers: WorkerPool<Catalog>,
}

/// Connection owners; opened at startup, closed at shutdown.
struct Pools {
    sqlite: Arc<SqlitePool>,
    mongo: Arc<MongoPool>,
}

impl Pools {
    fn close(&self) {
        if let Err(e) = self.sqlite.close() {
            error!(err = %e, "failed to close sqlite pool");
        }
        if let Err(e) = self.mongo.close() {
            error!(err = %e, "failed to close mongodb pool");
        }
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    info!(about = %domain::about(), "starting api-server");

    // Drivers block while connecting; keep that off the async workers
    let build_cfg = cfg.clone();
    let built = tokio::task::spawn_blocking(move || open_backends(&build_cfg)).await;
    let (catalog, pools) = match built {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
            error!(err = %e, "failed to open storage backends");
            std::process::exit(1);
        }
        Err(e) => {
            error!(err = %e, "storage bootstrap task failed");
            std::process::exit(1);
        }
    };

    let state = AppState {
        workers: WorkerPool::new(catalog, cfg.worker_pool_size),
    };
    info!(workers = state.workers.size(), "worker pool ready");

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = router(state.clone())
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind port");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    info!("shutting down");
    state.workers.shutdown();
    let closed = tokio::task::spawn_blocking(move || {
        if let Err(e) = state.workers.service().close() {
            error!(err = %e, "failed to release repositories");
        }
        pools.close();
    })
    .await;
    if let Err(e) = closed {
        error!(err = %e, "shutdown task failed");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(err = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// A failure here is logged; opening the database reports the real error.
fn ensure_parent_dir(path: &std::path::Path) -> bool {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => match std::fs::create_dir_all(dir) {
            Ok(()) => true,
            Err(e) => {
                warn!(dir = %dir.display(), err = %e, "could not create database directory");
                false
            }
        },
        _ => true,
    }
}

// Open both stores and wire their adapters into the dispatching service.
fn open_backends(cfg: &config::Config) -> Result<(Catalog, Pools), CoreError> {
    ensure_parent_dir(&cfg.db_path);
    let sqlite = Arc::new(SqlitePool::open(&cfg.db_path)?);
    let mongo = match MongoPool::connect(&cfg.mongodb_uri, cfg.mongodb_database.clone()) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            if let Err(close_err) = sqlite.close() {
                warn!(err = %close_err, "failed to close sqlite pool after mongodb connect failure");
            }
            return Err(e);
        }
    };
    let document: Arc<dyn BookRepository> = Arc::new(MongoBookRepo::new(
        mongo.clone(),
        cfg.mongodb_collection.clone(),
    )?);
    let relational: Arc<dyn BookRepository> = Arc::new(SqliteBookRepo::new(sqlite.clone()));

    let catalog: Catalog = BookService::new(relational, document);
    Ok((catalog, Pools { sqlite, mongo }))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/books", get(list_books).post(create_book))
        .route("/api/books/:id", delete(delete_book))
        .with_state(state)
}

#[derive(Deserialize)]
struct DataSourceQuery {
    #[serde(rename = "dataSource", default)]
    data_source: Option<String>,
}

fn reply<T: Serialize>(status: StatusCode, body: ApiResponse<T>) -> Response {
    (status, Json(body)).into_response()
}

// Single place where repository failures become envelopes.
fn failure(err: CoreError, book_id: Option<i64>) -> Response {
    match err {
        CoreError::AlreadyExists => {
            let id = book_id.unwrap_or_default();
            warn!(book_id = id, "book id already taken");
            reply(
                StatusCode::CONFLICT,
                ApiResponse::<()>::failure(
                    http_common::CODE_CONFLICT,
                    http_common::conflict_message(id),
                ),
            )
        }
        CoreError::ConstraintViolation(msg) => {
            warn!(book_id = ?book_id, reason = %msg, "book rejected by backend constraint");
            reply(
                StatusCode::BAD_REQUEST,
                ApiResponse::<()>::failure(
                    http_common::CODE_INVALID,
                    format!("Invalid book: {}", msg),
                ),
            )
        }
        other => {
            error!(book_id = ?book_id, err = ?other, "unexpected error");
            reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiResponse::<()>::internal(),
            )
        }
    }
}

// Extractor failures still answer with an envelope.
fn rejected(status: StatusCode, detail: String) -> Response {
    warn!(%status, reason = %detail, "request rejected");
    reply(
        status,
        ApiResponse::<()>::failure(
            http_common::CODE_INVALID,
            format!("Invalid request: {}", detail),
        ),
    )
}

async fn health() -> impl IntoResponse {
    reply(StatusCode::OK, ApiResponse::success("ok"))
}

async fn list_books(
    State(state): State<AppState>,
    Query(q): Query<DataSourceQuery>,
) -> Response {
    let backend = Backend::from_tag(q.data_source.as_deref());
    let res = state
        .workers
        .submit(move |svc| svc.list(q.data_source.as_deref()))
        .await;
    match res {
        Ok(books) => {
            info!(%backend, count = books.len(), "list ok");
            reply(StatusCode::OK, ApiResponse::success(books))
        }
        Err(e) => failure(e, None),
    }
}

async fn create_book(
    State(state): State<AppState>,
    Query(q): Query<DataSourceQuery>,
    payload: Result<Json<Book>, JsonRejection>,
) -> Response {
    let book = match payload {
        Ok(Json(book)) => book,
        Err(rej) => return rejected(rej.status(), rej.body_text()),
    };
    let backend = Backend::from_tag(q.data_source.as_deref());
    let id = book.id;
    let res = state
        .workers
        .submit(move |svc| svc.add(book, q.data_source.as_deref()))
        .await;
    match res {
        Ok(saved) => {
            info!(%backend, book_id = saved.id, "create ok");
            reply(StatusCode::CREATED, ApiResponse::success(saved))
        }
        Err(e) => failure(e, Some(id)),
    }
}

async fn delete_book(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Query(q): Query<DataSourceQuery>,
) -> Response {
    let id = match path {
        Ok(Path(id)) => id,
        Err(rej) => return rejected(rej.status(), rej.body_text()),
    };
    let backend = Backend::from_tag(q.data_source.as_deref());
    let res = state
        .workers
        .submit(move |svc| svc.delete(id, q.data_source.as_deref()))
        .await;
    match res {
        Ok(true) => {
            info!(%backend, book_id = id, "delete ok");
            reply(StatusCode::OK, ApiResponse::<()>::empty())
        }
        Ok(false) => {
            warn!(%backend, book_id = id, "delete 404");
            reply(
                StatusCode::NOT_FOUND,
                ApiResponse::<()>::failure(
                    http_common::CODE_NOT_FOUND,
                    http_common::not_found_message(id),
                ),
            )
        }
        Err(e) => failure(e, Some(id)),
    }
}
