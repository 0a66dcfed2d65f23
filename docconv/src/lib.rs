//! # docconv: document conversion over HTTP
//!
//! `docconv` accepts document uploads and hands them to external conversion tools: `pdf2docx`
//! for PDF to DOCX, and headless LibreOffice for everything else (DOCX to PDF, XLSX to PDF, ODT
//! to DOCX, ...). The converted file is streamed back in the response.
//!
//! ## Request Flow
//!
//! Every conversion request runs the same linear pipeline:
//!
//! 1. **Receive** the multipart upload.
//! 2. **Persist** it into a fresh [`storage::Workspace`], a uniquely named scratch directory
//!    owned by this request alone.
//! 3. **Invoke** the conversion tool as a child process ([`convert`]), bounded by a timeout and
//!    the service's shutdown token.
//! 4. **Verify** the expected output exists. A tool that exits 0 without output is a failure.
//! 5. **Respond** with the output as a file download, or `{"error": "..."}` with status 500.
//!
//! The workspace is removed when the response body finishes (or the request fails or is
//! dropped), so nothing accumulates in the scratch directory.
//!
//! ## Endpoints
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/health` | `{"status":"ok"}` |
//! | POST | `/convert/pdf2docx` | multipart `file`, returns `converted.docx` |
//! | POST | `/convert/libreoffice/` | multipart `file`, `target_format` (form or query, default `pdf`) |
//! | GET | `/docs`, `/api-docs/openapi.json` | API reference |
//! | GET | `/internal/metrics` | Prometheus metrics, when `enable_metrics` is set |
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use docconv::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = docconv::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     docconv::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod config;
pub mod convert;
pub mod errors;
mod metrics;
mod openapi;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::{
    Json, Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use config::CorsOrigin;
use convert::{OfficeConverter, PdfConverter};
use openapi::ApiDoc;
use storage::Storage;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across all request handlers.
///
/// Nothing in here is mutable: requests share only configuration, the tool adapters, and the
/// shutdown token.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .storage(Storage::new(&config.storage, &config.limits))
///     .office(OfficeConverter::new(&config.libreoffice))
///     .pdf(PdfConverter::new(&config.pdf2docx))
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub storage: Storage,
    pub office: OfficeConverter,
    pub pdf: PdfConverter,
    /// Cancelled on shutdown; aborts in-flight conversions
    #[builder(default)]
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn from_config(config: Config) -> Self {
        AppState::builder()
            .storage(Storage::new(&config.storage, &config.limits))
            .office(OfficeConverter::new(&config.libreoffice))
            .pdf(PdfConverter::new(&config.pdf2docx))
            .config(config)
            .build()
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let mut origins = Vec::new();
    for origin in &config.cors.allowed_origins {
        let header_value = match origin {
            CorsOrigin::Wildcard => "*".parse::<HeaderValue>()?,
            CorsOrigin::Url(url) => url.as_str().trim_end_matches('/').parse::<HeaderValue>()?,
        };
        origins.push(header_value);
    }

    let mut cors = CorsLayer::new()
        .allow_origin(origins)
        .expose_headers(vec![axum::http::header::CONTENT_DISPOSITION]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// - `/health` and the conversion routes (with the upload body limit)
/// - OpenAPI JSON and the API reference page
/// - CORS, when origins are configured
/// - Prometheus metrics, when enabled
/// - Tracing middleware
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let upload_limit = usize::try_from(state.config.limits.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let convert_routes = Router::new()
        .route("/convert/pdf2docx", post(api::handlers::convert::pdf_to_docx))
        .route("/convert/libreoffice/", post(api::handlers::convert::libreoffice))
        .route("/convert/libreoffice", post(api::handlers::convert::libreoffice))
        .layer(DefaultBodyLimit::max(upload_limit));

    let router = Router::new()
        .route("/health", get(api::handlers::health::health))
        .merge(convert_routes)
        .with_state(state.clone())
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let mut router = if state.config.cors.allowed_origins.is_empty() {
        router
    } else {
        router.layer(create_cors_layer(&state.config)?)
    };

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();

        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// The HTTP service: state, router, and lifecycle.
///
/// 1. **Initialize**: [`Application::new`] prepares the scratch root and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests
/// 3. **Shutdown**: when the shutdown future resolves, in-flight conversions are cancelled,
///    open connections drain, and telemetry is flushed
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting docconv with configuration: {:#?}", config);

        let app_state = AppState::from_config(config.clone());
        app_state.storage.prepare().await?;
        info!(scratch_dir = %app_state.storage.root().display(), "Scratch storage ready");

        let router = build_router(&app_state)?;

        Ok(Self {
            router,
            app_state,
            config,
        })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "docconv listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        let token = self.app_state.shutdown.clone();
        let shutdown = async move {
            shutdown.await;
            info!("Cancelling in-flight conversions...");
            token.cancel();
        };

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{create_test_app, create_test_config};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_health() {
        let scratch = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(scratch.path())).await;

        let response = server.get("/health").await;

        response.assert_status(StatusCode::OK);
        assert_eq!(response.json::<serde_json::Value>(), json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_openapi_json_endpoint() {
        let scratch = tempfile::tempdir().unwrap();
        let server = create_test_app(create_test_config(scratch.path())).await;

        let response = server.get("/api-docs/openapi.json").await;

        response.assert_status(StatusCode::OK);
        let doc = response.json::<serde_json::Value>();
        assert!(doc["paths"]["/convert/pdf2docx"]["post"].is_object());
    }

    #[tokio::test]
    async fn test_application_creates_scratch_root() {
        let parent = tempfile::tempdir().unwrap();
        let scratch = parent.path().join("docconv-scratch-root");
        let config = create_test_config(&scratch);

        let app = Application::new(config).await;
        assert!(app.is_ok(), "Application::new should succeed");
        assert!(scratch.is_dir());
    }

    #[tokio::test]
    async fn test_build_router_with_metrics_disabled() {
        let scratch = tempfile::tempdir().unwrap();
        let mut config = create_test_config(scratch.path());
        config.enable_metrics = false;

        let router = build_router(&AppState::from_config(config)).expect("Failed to build router");
        let server = axum_test::TestServer::new(router).expect("Failed to create test server");

        let response = server.get("/internal/metrics").await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_build_router_with_metrics_enabled() {
        let scratch = tempfile::tempdir().unwrap();
        let mut config = create_test_config(scratch.path());
        config.enable_metrics = true;

        let router = build_router(&AppState::from_config(config)).expect("Failed to build router");
        let server = axum_test::TestServer::new(router).expect("Failed to create test server");

        // Generate some traffic so the HTTP series exist
        server.get("/health").await.assert_status(StatusCode::OK);

        let response = server.get("/internal/metrics").await;
        response.assert_status(StatusCode::OK);
        let content = response.text();
        assert!(content.contains("# HELP") || content.contains("# TYPE"));
    }

    #[tokio::test]
    async fn test_cors_headers_when_configured() {
        let scratch = tempfile::tempdir().unwrap();
        let mut config = create_test_config(scratch.path());
        config.cors.allowed_origins = vec![CorsOrigin::Url("https://app.example.com".parse().unwrap())];

        let router = build_router(&AppState::from_config(config)).expect("Failed to build router");
        let server = axum_test::TestServer::new(router).expect("Failed to create test server");

        let response = server.get("/health").add_header("origin", "https://app.example.com").await;
        assert_eq!(response.header("access-control-allow-origin"), "https://app.example.com");
    }
}
