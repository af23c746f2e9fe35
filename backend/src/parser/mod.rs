//! CSV ingestion with encoding and delimiter auto-detection.
//!
//! Turns raw upload bytes into a [`TransactionTable`]. Rows that cannot be
//! coerced into a [`TransactionRecord`] reject the whole file.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::Path;

use crate::error::{IngestionError, IngestionResult};
use crate::models::{TransactionRecord, TransactionTable};

/// Source header → canonical column name.
pub const COLUMN_RENAMES: [(&str, &str); 3] = [
    ("Cost & %", "Fee_Percentage"),
    ("Net Profit & %", "Net_Profit_Percentage"),
    ("P&L", "Profit_Loss"),
];

/// Columns that must be present after renaming.
pub const REQUIRED_COLUMNS: [&str; 9] = [
    "Type",
    "Country",
    "Channel",
    "Method",
    "Amount",
    "Fee_Percentage",
    "Net_Profit_Percentage",
    "Profit_Loss",
    "request_time",
];

/// Accepted `request_time` layouts, tried in order after RFC 3339.
const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
];

/// Layouts carrying a numeric UTC offset (`+0000`, `+05:30`).
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Zone suffixes meaning UTC, stripped before the naive layouts are tried.
const UTC_SUFFIXES: [&str; 3] = [" UTC", " GMT", "Z"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// File-level facts gathered while parsing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    /// Headers after renaming, in file order.
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub table: TransactionTable,
    pub info: CsvInfo,
}

/// Detect the encoding of raw bytes using chardet.
///
/// Bytes that are already valid UTF-8 are reported as such; chardet is
/// only consulted for everything else.
pub fn detect_encoding(bytes: &[u8]) -> String {
    if std::str::from_utf8(bytes).is_ok() {
        return "utf-8".to_string();
    }
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes with the named encoding, strictly.
///
/// Unknown labels and byte sequences invalid in the encoding are errors;
/// nothing is replaced with U+FFFD. ISO-8859-1 maps every byte straight to
/// the code point of the same value.
pub fn decode_content(bytes: &[u8], encoding: &str) -> IngestionResult<String> {
    let label = encoding.trim().to_lowercase();
    let decoded: String = match label.as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => bytes.iter().map(|&b| char::from(b)).collect(),
        _ => {
            let codec = encoding_rs::Encoding::for_label(label.as_bytes()).ok_or_else(|| {
                IngestionError::Encoding(format!("unsupported encoding '{}'", encoding))
            })?;
            codec
                .decode_without_bom_handling_and_without_replacement(bytes)
                .ok_or_else(|| {
                    IngestionError::Encoding(format!("invalid {} byte sequence", codec.name()))
                })?
                .into_owned()
        }
    };
    Ok(match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    })
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Apply the three header renames. Unknown headers pass through trimmed.
pub fn normalize_header(header: &str) -> String {
    let trimmed = header.trim().trim_start_matches('\u{feff}');
    COLUMN_RENAMES
        .iter()
        .find(|(source, _)| *source == trimmed)
        .map(|(_, target)| target.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Parse a `request_time` cell. Offsets are dropped: the local wall-clock
/// value as written is kept. A trailing `UTC`, `GMT` or `Z` is accepted.
pub fn parse_request_time(raw: &str) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.naive_local());
        }
    }
    let value = UTC_SUFFIXES
        .iter()
        .find_map(|suffix| value.strip_suffix(suffix))
        .map(str::trim_end)
        .unwrap_or(value);
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Positions of the required columns in a header row.
struct ColumnIndex {
    kind: usize,
    country: usize,
    channel: usize,
    method: usize,
    amount: usize,
    fee_percentage: usize,
    net_profit_percentage: usize,
    profit_loss: usize,
    request_time: usize,
}

impl ColumnIndex {
    fn resolve(headers: &[String]) -> IngestionResult<Self> {
        let position = |name: &str| headers.iter().position(|h| h == name);

        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|name| position(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(IngestionError::MissingColumns(missing));
        }

        let at = |name: &str| position(name).unwrap_or_default();
        Ok(Self {
            kind: at("Type"),
            country: at("Country"),
            channel: at("Channel"),
            method: at("Method"),
            amount: at("Amount"),
            fee_percentage: at("Fee_Percentage"),
            net_profit_percentage: at("Net_Profit_Percentage"),
            profit_loss: at("Profit_Loss"),
            request_time: at("request_time"),
        })
    }
}

fn cell<'r>(record: &'r csv::StringRecord, idx: usize) -> &'r str {
    record.get(idx).map(str::trim).unwrap_or("")
}

fn number(record: &csv::StringRecord, idx: usize, column: &str, line: usize) -> IngestionResult<f64> {
    let raw = cell(record, idx);
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(IngestionError::InvalidNumber {
            line,
            column: column.to_string(),
            value: raw.to_string(),
        }),
    }
}

fn csv_error(err: csv::Error) -> IngestionError {
    let line = err.position().map(|p| p.line() as usize).unwrap_or(0);
    match err.into_kind() {
        csv::ErrorKind::Io(e) => IngestionError::Io(e),
        csv::ErrorKind::UnequalLengths { expected_len, len, .. } => IngestionError::Malformed {
            line,
            message: format!("expected {} fields, found {}", expected_len, len),
        },
        other => IngestionError::Malformed {
            line,
            message: format!("{:?}", other),
        },
    }
}

/// Parse decoded CSV text with an explicit delimiter.
pub fn parse_str(content: &str, delimiter: char, encoding: String) -> IngestionResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(IngestionError::EmptyFile);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(normalize_header)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(IngestionError::NoHeaders);
    }
    let columns = ColumnIndex::resolve(&headers)?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(csv_error)?;
        let line = row.position().map(|p| p.line() as usize).unwrap_or(0);

        let raw_time = cell(&row, columns.request_time);
        let request_time = parse_request_time(raw_time).ok_or_else(|| {
            IngestionError::InvalidTimestamp {
                line,
                value: raw_time.to_string(),
            }
        })?;

        records.push(TransactionRecord {
            kind: cell(&row, columns.kind).to_string(),
            request_time,
            amount: number(&row, columns.amount, "Amount", line)?,
            fee_percentage: number(&row, columns.fee_percentage, "Fee_Percentage", line)?,
            net_profit_percentage: number(
                &row,
                columns.net_profit_percentage,
                "Net_Profit_Percentage",
                line,
            )?,
            profit_loss: number(&row, columns.profit_loss, "Profit_Loss", line)?,
            country: cell(&row, columns.country).to_string(),
            channel: cell(&row, columns.channel).to_string(),
            method: cell(&row, columns.method).to_string(),
        });
    }

    if records.is_empty() {
        return Err(IngestionError::EmptyFile);
    }

    let info = CsvInfo {
        encoding,
        delimiter,
        headers,
        row_count: records.len(),
    };
    Ok(ParseResult {
        table: TransactionTable::from_records(records),
        info,
    })
}

/// Parse CSV bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8]) -> IngestionResult<ParseResult> {
    if bytes.is_empty() {
        return Err(IngestionError::EmptyFile);
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    parse_str(&content, delimiter, encoding)
}

/// Parse a CSV file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(path: P) -> IngestionResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes)
}
