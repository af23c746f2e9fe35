//! # FINEST - FIAT payment analytics
//!
//! Turns a CSV export of payment transactions into the derived tables, charts
//! and report behind the FINEST FIAT dashboard.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│   Metrics   │────▶│   Report    │
//! │  (ISO/UTF8) │     │ (typed rows)│     │  (rollups)  │     │ (doc model) │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │  Dashboard  │
//!                                         │ (axum API)  │
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use finest::{analyze_file, LogLevel, LogService};
//!
//! let log = LogService::console(LogLevel::Info);
//! let analysis = analyze_file("transactions.csv", &log)?;
//! for best in &analysis.tables.best_channel_per_country {
//!     println!("{}: {}", best.country, best.channel);
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per layer
//! - [`config`] - Environment-driven configuration
//! - [`logging`] - Log service (console, rotating file, SSE broadcast)
//! - [`models`] - Transactions and derived table rows
//! - [`parser`] - CSV ingestion with auto-detection
//! - [`metrics`] - Rollups and the analysis pipeline
//! - [`report`] - Chart specs, report document, renderers
//! - [`events`] - Append-only transaction/event log
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod models;

// Ingestion
pub mod parser;

// Computation
pub mod metrics;

// Output
pub mod events;
pub mod report;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ComputationError,
    EventLogError,
    ExportError,
    IngestionError,
    ServerError,
};

// =============================================================================
// Re-exports - Config & Logging
// =============================================================================

pub use config::{AppConfig, LogConfig};
pub use logging::{LogEntry, LogLevel, LogService};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    DerivedTables,
    HeadlineMetrics,
    Rounded,
    Transaction,
    TransactionRecord,
    TransactionTable,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    parse_bytes_auto,
    parse_csv_file_auto,
    parse_str,
    detect_encoding,
    detect_delimiter,
    decode_content,
    CsvInfo,
    ParseResult,
    REQUIRED_COLUMNS,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use metrics::{
    analyze_bytes,
    analyze_file,
    compute,
    compute_with_issues,
    Analysis,
};

// =============================================================================
// Re-exports - Report
// =============================================================================

pub use report::{
    build_charts,
    dashboard_charts,
    export_report,
    export_tables,
    Chart,
    JsonReportRenderer,
    ReportDocument,
    ReportRenderer,
    TextReportRenderer,
};

// =============================================================================
// Re-exports - Events & API
// =============================================================================

pub use events::{EventEntry, TransactionLogger};
pub use api::types::{DashboardResponse, ReportResponse, error_response};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
