//! Domain models for the analytics pipeline.
//!
//! - [`TransactionRecord`] - One typed CSV row, as ingested
//! - [`Transaction`] - A record plus its derived `fee`
//! - [`TransactionTable`] - The immutable table one upload produces
//! - [`tables`] - Derived rollup tables and headline metrics

pub mod tables;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

pub use tables::*;

// =============================================================================
// Transaction
// =============================================================================

/// A typed input row.
///
/// Column names refer to the CSV headers after renaming
/// (`Cost & %` → `Fee_Percentage`, `Net Profit & %` → `Net_Profit_Percentage`,
/// `P&L` → `Profit_Loss`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// `Type` (Deposit / Withdrawal). Carried, never aggregated.
    #[serde(rename = "type")]
    pub kind: String,
    /// `request_time`, as stored in the file. No timezone normalisation.
    pub request_time: NaiveDateTime,
    /// `Amount`
    pub amount: f64,
    /// `Fee_Percentage`, percent units.
    pub fee_percentage: f64,
    /// `Net_Profit_Percentage`. Not consumed by any derived metric.
    pub net_profit_percentage: f64,
    /// `Profit_Loss`
    pub profit_loss: f64,
    pub country: String,
    pub channel: String,
    pub method: String,
}

/// A loaded transaction: the input record plus its derived fee.
///
/// `fee` is always computed from `amount` and `fee_percentage`; there is no
/// way to construct a `Transaction` with a fee read from elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    #[serde(flatten)]
    record: TransactionRecord,
    fee: f64,
}

impl Transaction {
    pub fn new(record: TransactionRecord) -> Self {
        let fee = record.amount * (record.fee_percentage / 100.0);
        Self { record, fee }
    }

    /// `Amount * (Fee_Percentage / 100)`
    pub fn fee(&self) -> f64 {
        self.fee
    }

    /// Calendar date used for daily bucketing.
    pub fn date(&self) -> NaiveDate {
        self.record.request_time.date()
    }

    pub fn record(&self) -> &TransactionRecord {
        &self.record
    }
}

impl Deref for Transaction {
    type Target = TransactionRecord;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl From<TransactionRecord> for Transaction {
    fn from(record: TransactionRecord) -> Self {
        Self::new(record)
    }
}

// =============================================================================
// Transaction Table
// =============================================================================

/// All rows of one upload, in file order.
///
/// Built once per upload and only ever read afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransactionTable {
    rows: Vec<Transaction>,
}

impl TransactionTable {
    pub fn new(rows: Vec<Transaction>) -> Self {
        Self { rows }
    }

    pub fn from_records(records: impl IntoIterator<Item = TransactionRecord>) -> Self {
        Self::new(records.into_iter().map(Transaction::new).collect())
    }

    pub fn rows(&self) -> &[Transaction] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Transaction> {
        self.rows.iter()
    }
}

impl<'a> IntoIterator for &'a TransactionTable {
    type Item = &'a Transaction;
    type IntoIter = std::slice::Iter<'a, Transaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
