//! REST API types for dashboard clients.
//!
//! Every response carries both the raw derived tables and the 2-decimal
//! presentation form, so clients never round on their own.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use uuid::Uuid;

use crate::metrics::Analysis;
use crate::models::{DerivedTables, HeadlineMetrics, Rounded};
use crate::parser::CsvInfo;
use crate::report::{dashboard_charts, headline_metrics, Chart, ReportDocument};

/// Sent after an upload, and by `GET /api/dashboard`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready" or "warning" (some ratio undefined)
    pub status: String,

    /// Name of the uploaded file
    pub source: String,

    pub csv_info: CsvInfo,

    pub headline: HeadlineMetrics,

    /// (label, display value) in dashboard order
    pub headline_formatted: Vec<(String, String)>,

    pub tables: DerivedTables,

    /// `tables` with every float rounded to 2 decimals
    pub rounded: DerivedTables,

    /// Report charts plus the dashboard-only views
    pub charts: Vec<Chart>,
}

impl DashboardResponse {
    pub fn new(job_id: Uuid, analysis: &Analysis) -> Self {
        let tables = &analysis.tables;
        Self {
            job_id: job_id.to_string(),
            status: if analysis.undefined_ratios == 0 { "ready" } else { "warning" }.to_string(),
            source: analysis.source.clone(),
            csv_info: analysis.csv_info.clone(),
            headline: tables.headline,
            headline_formatted: headline_metrics(&tables.headline),
            tables: tables.clone(),
            rounded: tables.rounded(),
            charts: dashboard_charts(tables, &analysis.table),
        }
    }
}

/// Result of `POST /api/report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub path: String,
    pub pages: usize,
    pub charts: Vec<String>,
}

impl ReportResponse {
    pub fn new(path: &Path, doc: &ReportDocument) -> Self {
        Self {
            path: path.display().to_string(),
            pages: doc.pages.len(),
            charts: doc.chart_titles().into_iter().map(str::to_string).collect(),
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, LogService};
    use crate::metrics::analyze_bytes;

    const CSV: &[u8] = b"Type,Country,Channel,Method,Amount,Cost & %,Net Profit & %,P&L,request_time\n\
        Deposit,US,A,Card,100,1,0,10.006,2024-01-01 10:00:00\n\
        Deposit,US,B,Card,50,2,0,20,2024-01-01 11:00:00\n";

    fn analysis() -> Analysis {
        analyze_bytes(CSV, "upload.csv", &LogService::console(LogLevel::Error)).unwrap()
    }

    #[test]
    fn test_dashboard_response_shape() {
        let id = Uuid::new_v4();
        let response = DashboardResponse::new(id, &analysis());
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["jobId"], id.to_string());
        assert_eq!(json["status"], "ready");
        assert_eq!(json["source"], "upload.csv");
        assert_eq!(json["headline"]["totalVolume"], 150.0);
        assert_eq!(json["headlineFormatted"][0][0], "Total Volume");
        assert_eq!(json["headlineFormatted"][0][1], "$150.00");
        assert_eq!(json["charts"].as_array().unwrap().len(), 9);
        assert_eq!(json["charts"][2]["data"]["type"], "hierarchy");
        assert_eq!(json["charts"][7]["title"], "Fee Structure by Region");
        assert_eq!(json["charts"][8]["title"], "Method Performance Over Time");
    }

    #[test]
    fn test_dashboard_carries_raw_and_rounded() {
        let response = DashboardResponse::new(Uuid::new_v4(), &analysis());
        let raw = response.tables.channels[0].stats.total_profit_loss;
        let shown = response.rounded.channels[0].stats.total_profit_loss;
        assert!((raw - 10.006).abs() < 1e-12);
        assert_eq!(shown, 10.01);
    }

    #[test]
    fn test_warning_status_when_ratios_undefined() {
        let mut analysis = analysis();
        analysis.undefined_ratios = 2;
        let response = DashboardResponse::new(Uuid::new_v4(), &analysis);
        assert_eq!(response.status, "warning");
    }

    #[test]
    fn test_error_response() {
        let json = error_response("Missing required columns: Amount");
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "Missing required columns: Amount");
    }
}
