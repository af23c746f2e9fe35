//! HTTP server for the FINEST dashboard API.
//!
//! Holds a single in-memory session: the last successful upload. A new upload
//! replaces it as a whole; a failed upload leaves it untouched.
//!
//! # API Endpoints
//!
//! | Method | Path              | Description                          |
//! |--------|-------------------|--------------------------------------|
//! | GET    | `/health`         | Health check                         |
//! | POST   | `/api/upload`     | Upload CSV, returns the dashboard    |
//! | GET    | `/api/dashboard`  | Dashboard of the current session     |
//! | POST   | `/api/report`     | Export the current session's report  |
//! | GET    | `/api/logs`       | SSE stream for real-time logs        |

use axum::{
    extract::{Multipart, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, IntoResponse, Json, Response, Sse},
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::RwLock;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::types::{error_response, DashboardResponse, ReportResponse};
use crate::config::AppConfig;
use crate::error::{ServerError, ServerResult};
use crate::events::TransactionLogger;
use crate::logging::LogService;
use crate::metrics::{analyze_bytes, Analysis};
use crate::report::{export_tables, JsonReportRenderer};

// =============================================================================
// State
// =============================================================================

/// The currently loaded dataset.
#[derive(Debug, Clone)]
pub struct Session {
    pub job_id: Uuid,
    pub analysis: Analysis,
}

/// Shared server state.
pub struct AppState {
    pub config: AppConfig,
    pub log: Arc<LogService>,
    pub events: TransactionLogger,
    session: RwLock<Option<Arc<Session>>>,
}

impl AppState {
    pub fn new(config: AppConfig, log: Arc<LogService>) -> Self {
        let events = TransactionLogger::new(&config.event_log_path, Arc::clone(&log));
        Self {
            config,
            log,
            events,
            session: RwLock::new(None),
        }
    }

    /// The current session. The lock is released before this returns.
    pub async fn session(&self) -> Option<Arc<Session>> {
        self.session.read().await.clone()
    }

    /// Analyse an upload and make it the current session.
    pub async fn ingest(&self, filename: &str, bytes: Vec<u8>) -> ServerResult<DashboardResponse> {
        self.log.info(format!("📄 New upload: {} ({} bytes)", filename, bytes.len()));

        let log = Arc::clone(&self.log);
        let source = filename.to_string();
        let result = tokio::task::spawn_blocking(move || analyze_bytes(&bytes, &source, &log))
            .await
            .map_err(|e| ServerError::Internal(format!("Analysis task failed: {}", e)))?;

        let analysis = match result {
            Ok(analysis) => analysis,
            Err(e) => {
                self.events.upload_failed(filename, &e.to_string());
                return Err(e.into());
            }
        };

        self.events.file_upload(filename, analysis.table.len());

        let session = Session {
            job_id: Uuid::new_v4(),
            analysis,
        };
        let response = DashboardResponse::new(session.job_id, &session.analysis);
        *self.session.write().await = Some(Arc::new(session));

        self.log.success(format!("Dashboard ready for {}", filename));
        Ok(response)
    }

    pub async fn dashboard(&self) -> ServerResult<DashboardResponse> {
        let guard = self.session.read().await;
        let session = guard.as_ref().ok_or(ServerError::NoSession)?;
        Ok(DashboardResponse::new(session.job_id, &session.analysis))
    }

    /// Export the current session's report as JSON into the reports directory.
    ///
    /// Rendering and file IO run on the blocking pool without holding the
    /// session lock, so uploads are not stalled by a slow disk.
    pub async fn export_report(&self) -> ServerResult<ReportResponse> {
        let session = self.session().await.ok_or(ServerError::NoSession)?;

        let reports_dir = self.config.reports_dir.clone();
        let log = Arc::clone(&self.log);
        let events = self.events.clone();
        let response = tokio::task::spawn_blocking(move || -> ServerResult<ReportResponse> {
            let (path, doc) =
                export_tables(&session.analysis.tables, &JsonReportRenderer, &reports_dir, &log)?;
            events.report_export(&path, doc.pages.len());
            Ok(ReportResponse::new(&path, &doc))
        })
        .await
        .map_err(|e| ServerError::Internal(format!("Export task failed: {}", e)))??;

        Ok(response)
    }
}

// =============================================================================
// Errors
// =============================================================================

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Ingestion(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::NoSession => StatusCode::NOT_FOUND,
            ServerError::Export(_) | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(error_response(&self.to_string()))).into_response()
    }
}

// =============================================================================
// Router
// =============================================================================

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/upload", post(upload_csv))
        .route("/api/dashboard", get(dashboard))
        .route("/api/report", post(export_report))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: AppConfig, log: Arc<LogService>) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let state = Arc::new(AppState::new(config, Arc::clone(&log)));
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    log.info(format!("🚀 FINEST server running on http://localhost:{}", port));
    log.info_indent("POST /api/upload    - Upload CSV file", 1);
    log.info_indent("GET  /api/dashboard - Current dashboard", 1);
    log.info_indent("POST /api/report    - Export report", 1);
    log.info_indent("GET  /api/logs      - SSE log stream", 1);
    log.info_indent("GET  /health        - Health check", 1);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "finest",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "upload": "POST /api/upload",
            "dashboard": "GET /api/dashboard",
            "report": "POST /api/report",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs(State(state): State<Arc<AppState>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.log.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(entry) => {
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        }
        // lagged receivers skip what they missed
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Upload CSV endpoint
async fn upload_csv(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ServerResult<Json<DashboardResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            file_name = field.file_name().map(|s| s.to_string());
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?
                    .to_vec(),
            );
        }
    }

    let bytes = file_data.ok_or_else(|| ServerError::BadRequest("No file provided".into()))?;
    let name = file_name.unwrap_or_else(|| "upload.csv".to_string());

    state.ingest(&name, bytes).await.map(Json)
}

async fn dashboard(State(state): State<Arc<AppState>>) -> ServerResult<Json<DashboardResponse>> {
    state.dashboard().await.map(Json)
}

async fn export_report(State(state): State<Arc<AppState>>) -> ServerResult<Json<ReportResponse>> {
    state.export_report().await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::logging::LogLevel;
    use std::fs;
    use tempfile::tempdir;

    const CSV: &str = "Type,Country,Channel,Method,Amount,Cost & %,Net Profit & %,P&L,request_time\n\
        Deposit,US,A,Card,100,1,0,10,2024-01-01 10:00:00\n\
        Deposit,US,B,Card,50,2,0,20,2024-01-01 11:00:00\n";

    fn state(root: &std::path::Path) -> AppState {
        let mut config = AppConfig::default();
        config.reports_dir = root.join("reports");
        config.event_log_path = root.join("logs").join("transactions.jsonl");
        AppState::new(config, Arc::new(LogService::console(LogLevel::Error)))
    }

    fn event_actions(state: &AppState) -> Vec<String> {
        fs::read_to_string(state.events.path())
            .unwrap()
            .lines()
            .map(|l| {
                let v: Value = serde_json::from_str(l).unwrap();
                v["data"]["action"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[tokio::test]
    async fn test_dashboard_requires_upload() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());

        let err = state.dashboard().await.unwrap_err();
        assert!(matches!(err, ServerError::NoSession));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = state.export_report().await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_upload_sets_session_and_logs_event() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());

        let response = state.ingest("jan.csv", CSV.as_bytes().to_vec()).await.unwrap();
        assert_eq!(response.headline.total_volume, 150.0);

        let dashboard = state.dashboard().await.unwrap();
        assert_eq!(dashboard.job_id, response.job_id);
        assert_eq!(event_actions(&state), vec!["file_upload"]);
    }

    #[tokio::test]
    async fn test_new_upload_replaces_session() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());

        let first = state.ingest("a.csv", CSV.as_bytes().to_vec()).await.unwrap();
        let smaller = "Type,Country,Channel,Method,Amount,Cost & %,Net Profit & %,P&L,request_time\n\
            Deposit,FR,C,Card,7,1,0,1,2024-03-01\n";
        let second = state.ingest("b.csv", smaller.as_bytes().to_vec()).await.unwrap();
        assert_ne!(first.job_id, second.job_id);

        let session = state.session().await.unwrap();
        assert_eq!(session.analysis.source, "b.csv");
        assert_eq!(session.analysis.tables.headline.total_volume, 7.0);
        assert!(session.analysis.tables.region("US").is_none());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_previous_session() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());

        state.ingest("good.csv", CSV.as_bytes().to_vec()).await.unwrap();
        let err = state
            .ingest("bad.csv", b"Type,Country\nDeposit,US\n".to_vec())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let session = state.session().await.unwrap();
        assert_eq!(session.analysis.source, "good.csv");
        assert_eq!(event_actions(&state), vec!["file_upload", "upload_failed"]);
    }

    #[tokio::test]
    async fn test_export_report_writes_file() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        state.ingest("jan.csv", CSV.as_bytes().to_vec()).await.unwrap();

        let report = state.export_report().await.unwrap();
        assert_eq!(report.pages, 8);
        assert_eq!(report.charts.len(), 7);
        assert!(std::path::Path::new(&report.path).exists());
        assert!(report.path.ends_with(".json"));
        assert_eq!(event_actions(&state), vec!["file_upload", "report_export"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_upload_proceeds_while_report_exports() {
        let dir = tempdir().unwrap();
        let state = Arc::new(state(dir.path()));
        state.ingest("jan.csv", CSV.as_bytes().to_vec()).await.unwrap();

        let export = tokio::spawn({
            let state = Arc::clone(&state);
            async move { state.export_report().await }
        });
        let feb = "Type,Country,Channel,Method,Amount,Cost & %,Net Profit & %,P&L,request_time\n\
            Deposit,FR,C,Card,7,1,0,1,2024-02-01\n";
        state.ingest("feb.csv", feb.as_bytes().to_vec()).await.unwrap();

        let report = export.await.unwrap().unwrap();
        assert!(std::path::Path::new(&report.path).exists());
        assert_eq!(state.session().await.unwrap().analysis.source, "feb.csv");
        assert_eq!(event_actions(&state).len(), 3);
    }

    /// One HTTP/1.1 request over a plain socket; returns the status line.
    fn http_status(addr: SocketAddr, request_line: &str) -> String {
        use std::io::{BufRead, BufReader, Write};
        let mut stream = std::net::TcpStream::connect(addr).unwrap();
        write!(stream, "{}\r\nHost: localhost\r\nConnection: close\r\n\r\n", request_line).unwrap();
        let mut status = String::new();
        BufReader::new(stream).read_line(&mut status).unwrap();
        status.trim_end().to_string()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_router_serves_over_tcp() {
        let dir = tempdir().unwrap();
        let app = build_router(Arc::new(state(dir.path())));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let (health, dashboard) = tokio::task::spawn_blocking(move || {
            (
                http_status(addr, "GET /health HTTP/1.1"),
                http_status(addr, "GET /api/dashboard HTTP/1.1"),
            )
        })
        .await
        .unwrap();
        assert_eq!(health, "HTTP/1.1 200 OK");
        assert_eq!(dashboard, "HTTP/1.1 404 Not Found");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServerError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::Export(ExportError::DuplicateChart("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
