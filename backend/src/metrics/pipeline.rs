//! High-level pipeline API: CSV in, derived tables out.
//!
//! # Example
//!
//! ```rust,ignore
//! use finest::logging::{LogLevel, LogService};
//! use finest::metrics::analyze_file;
//!
//! let log = LogService::console(LogLevel::Info);
//! let analysis = analyze_file("transactions.csv", &log)?;
//! println!("Total volume: {}", analysis.tables.headline.total_volume);
//! ```

use serde::Serialize;
use std::path::Path;

use super::rollups::derive_tables;
use crate::error::{ComputationError, IngestionResult};
use crate::logging::LogService;
use crate::models::{DerivedTables, TransactionTable};
use crate::parser::{parse_bytes_auto, parse_csv_file_auto, CsvInfo, ParseResult};

/// One loaded dataset and everything computed from it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// File name (or path) the data came from.
    pub source: String,
    pub csv_info: CsvInfo,
    #[serde(skip)]
    pub table: TransactionTable,
    pub tables: DerivedTables,
    /// Ratios that came out NaN.
    pub undefined_ratios: usize,
}

/// Compute every derived table. Pure and deterministic; undefined ratios are
/// NaN.
pub fn compute(table: &TransactionTable) -> DerivedTables {
    derive_tables(table).0
}

/// [`compute`], also returning which ratios came out undefined.
pub fn compute_with_issues(table: &TransactionTable) -> (DerivedTables, Vec<ComputationError>) {
    derive_tables(table)
}

/// [`compute`], reporting undefined ratios to the log service.
pub fn compute_logged(table: &TransactionTable, log: &LogService) -> DerivedTables {
    let (tables, issues) = derive_tables(table);
    report_issues(&issues, log);
    tables
}

fn report_issues(issues: &[ComputationError], log: &LogService) {
    if !issues.is_empty() {
        log.warning(format!("{} ratio(s) undefined, reported as NaN", issues.len()));
        for issue in issues.iter().take(10) {
            log.info_indent(issue.to_string(), 1);
        }
        if issues.len() > 10 {
            log.info_indent(format!("... +{}", issues.len() - 10), 1);
        }
    }
}

/// Ingest raw upload bytes and compute all tables.
///
/// Any ingestion failure rejects the upload as a whole.
pub fn analyze_bytes(bytes: &[u8], source: &str, log: &LogService) -> IngestionResult<Analysis> {
    log.info(format!("📖 Reading {} ({} bytes)...", source, bytes.len()));
    match parse_bytes_auto(bytes) {
        Ok(parsed) => Ok(analyze_parsed(parsed, source, log)),
        Err(e) => {
            log.error(format!("Error processing file {} [ingestion]: {}", source, e));
            Err(e)
        }
    }
}

/// Ingest a CSV file from disk and compute all tables.
pub fn analyze_file<P: AsRef<Path>>(path: P, log: &LogService) -> IngestionResult<Analysis> {
    let path = path.as_ref();
    let source = path.display().to_string();
    log.info(format!("📖 Reading {}...", source));
    match parse_csv_file_auto(path) {
        Ok(parsed) => Ok(analyze_parsed(parsed, &source, log)),
        Err(e) => {
            log.error(format!("Error processing file {} [ingestion]: {}", source, e));
            Err(e)
        }
    }
}

/// Compute all tables for an already-parsed file.
pub fn analyze_parsed(parsed: ParseResult, source: &str, log: &LogService) -> Analysis {
    let ParseResult { table, info } = parsed;

    log.success(format!("Detected encoding: {}", info.encoding));
    log.success(format!("Detected separator: '{}'", format_delimiter(info.delimiter)));
    log.success(format!("Read {} transactions", info.row_count));
    log.debug(format!("Columns: {}", info.headers.join(", ")));

    log.info("📊 Computing rollups...");
    let (tables, issues) = derive_tables(&table);
    report_issues(&issues, log);
    log.success_indent(
        format!(
            "{} days, {} channels, {} countries, {} methods",
            tables.daily.len(),
            tables.channels.len(),
            tables.regions.len(),
            tables.methods.len()
        ),
        1,
    );

    Analysis {
        source: source.to_string(),
        csv_info: info,
        table,
        tables,
        undefined_ratios: issues.len(),
    }
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestionError;
    use crate::logging::{LogLevel, LogService};

    const CSV: &str = "Type,Country,Channel,Method,Amount,Cost & %,Net Profit & %,P&L,request_time\n\
        Deposit,US,A,Card,100,1,0.5,10,2024-01-01 10:00:00\n\
        Deposit,US,B,Card,50,2,0.5,20,2024-01-01 11:00:00\n\
        Withdrawal,DE,A,SEPA,-30,0,0,-1,2024-01-02 09:00:00\n";

    #[test]
    fn test_analyze_bytes() {
        let log = LogService::console(LogLevel::Error);
        let analysis = analyze_bytes(CSV.as_bytes(), "sample.csv", &log).unwrap();

        assert_eq!(analysis.source, "sample.csv");
        assert_eq!(analysis.csv_info.row_count, 3);
        assert_eq!(analysis.tables.headline.total_volume, 120.0);
        assert_eq!(analysis.tables.headline.total_transactions, 3);
        assert_eq!(analysis.tables.best_channel_for("US").unwrap().channel, "B");
        assert_eq!(analysis.tables.daily.len(), 2);
    }

    #[test]
    fn test_ingestion_failure_is_logged() {
        let log = LogService::console(LogLevel::Info);
        let mut rx = log.subscribe();

        let err = analyze_bytes(b"Type,Country\nDeposit,US", "broken.csv", &log).unwrap_err();
        assert!(matches!(err, IngestionError::MissingColumns(_)));

        let mut saw_error = false;
        while let Ok(entry) = rx.try_recv() {
            if entry.level == LogLevel::Error {
                assert!(entry.message.contains("broken.csv"));
                assert!(entry.message.contains("ingestion"));
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn test_undefined_ratios_are_warned() {
        let csv = "Type,Country,Channel,Method,Amount,Cost & %,Net Profit & %,P&L,request_time\n\
            Deposit,US,A,Card,0,1,0,0,2024-01-01\n";
        let log = LogService::console(LogLevel::Warning);
        let mut rx = log.subscribe();

        let analysis = analyze_bytes(csv.as_bytes(), "zero.csv", &log).unwrap();
        assert!(analysis.tables.methods[0].efficiency_score.is_nan());
        assert!(analysis.undefined_ratios > 0);

        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.level, LogLevel::Warning);
        assert!(entry.message.contains("undefined"));
    }

    #[test]
    fn test_compute_is_idempotent() {
        let log = LogService::console(LogLevel::Error);
        let analysis = analyze_bytes(CSV.as_bytes(), "sample.csv", &log).unwrap();
        let again = compute(&analysis.table);
        assert_eq!(
            serde_json::to_string(&again).unwrap(),
            serde_json::to_string(&analysis.tables).unwrap()
        );
    }
}
