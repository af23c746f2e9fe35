//! Group transactions by one or more categorical keys.
//!
//! # Architecture
//!
//! ```text
//! Transaction table (flat rows)          →  Groups (sorted by key)
//! ┌────────────────────────────────┐       ┌──────────────────────────┐
//! │ US, A, amount 100, P&L 10      │       │ US: count 2              │
//! │ US, B, amount 50,  P&L 20      │  →    │     amount 150, P&L 30   │
//! │ DE, A, amount 70,  P&L -5      │       ├──────────────────────────┤
//! └────────────────────────────────┘       │ DE: count 1 ...          │
//!                                          └──────────────────────────┘
//! ```
//!
//! Groups only exist for keys present in the input, so no table built on top
//! of this ever carries a synthesised zero row. Rows are folded in file order,
//! which keeps floating-point sums reproducible run to run.

use std::collections::BTreeMap;

use crate::models::{GroupStats, Transaction, TransactionTable};

/// Running sums for one group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupBuilder {
    pub count: usize,
    pub amount: f64,
    pub fee: f64,
    pub profit_loss: f64,
    /// Rows with `profit_loss > 0`
    pub profitable: usize,
}

impl GroupBuilder {
    pub fn add(&mut self, tx: &Transaction) {
        self.count += 1;
        self.amount += tx.amount;
        self.fee += tx.fee();
        self.profit_loss += tx.profit_loss;
        if tx.profit_loss > 0.0 {
            self.profitable += 1;
        }
    }

    /// sum/count/mean aggregates. A builder always holds at least one row.
    pub fn stats(&self) -> GroupStats {
        let n = self.count as f64;
        GroupStats {
            total_volume: self.amount,
            transaction_count: self.count,
            avg_transaction: self.amount / n,
            total_fees: self.fee,
            avg_fee: self.fee / n,
            total_profit_loss: self.profit_loss,
            avg_profit_loss: self.profit_loss / n,
        }
    }
}

/// Fold every row into the group its key selects.
pub fn group_by<K, F>(table: &TransactionTable, key: F) -> BTreeMap<K, GroupBuilder>
where
    K: Ord,
    F: Fn(&Transaction) -> K,
{
    let mut groups: BTreeMap<K, GroupBuilder> = BTreeMap::new();
    for tx in table {
        groups.entry(key(tx)).or_default().add(tx);
    }
    groups
}

/// Collect one value per row into per-key lists (file order preserved).
pub fn collect_by<K, F, V>(table: &TransactionTable, key: F, value: V) -> BTreeMap<K, Vec<f64>>
where
    K: Ord,
    F: Fn(&Transaction) -> K,
    V: Fn(&Transaction) -> f64,
{
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for tx in table {
        groups.entry(key(tx)).or_default().push(value(tx));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionRecord;
    use chrono::NaiveDate;

    fn tx(country: &str, channel: &str, amount: f64, profit_loss: f64) -> TransactionRecord {
        TransactionRecord {
            kind: "Deposit".into(),
            request_time: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            amount,
            fee_percentage: 10.0,
            net_profit_percentage: 0.0,
            profit_loss,
            country: country.into(),
            channel: channel.into(),
            method: "Card".into(),
        }
    }

    #[test]
    fn test_single_key_grouping() {
        let table = TransactionTable::from_records(vec![
            tx("US", "A", 100.0, 10.0),
            tx("US", "B", 50.0, -20.0),
            tx("DE", "A", 70.0, 0.0),
        ]);

        let groups = group_by(&table, |t| t.country.clone());

        assert_eq!(groups.len(), 2);
        let us = &groups["US"];
        assert_eq!(us.count, 2);
        assert_eq!(us.amount, 150.0);
        assert_eq!(us.fee, 15.0);
        assert_eq!(us.profit_loss, -10.0);
        assert_eq!(us.profitable, 1);
        // zero P&L is not a success
        assert_eq!(groups["DE"].profitable, 0);
    }

    #[test]
    fn test_keys_sorted() {
        let table = TransactionTable::from_records(vec![
            tx("US", "Z", 1.0, 0.0),
            tx("AT", "M", 1.0, 0.0),
            tx("FR", "A", 1.0, 0.0),
        ]);
        let keys: Vec<String> = group_by(&table, |t| t.country.clone()).into_keys().collect();
        assert_eq!(keys, vec!["AT", "FR", "US"]);
    }

    #[test]
    fn test_composite_key() {
        let table = TransactionTable::from_records(vec![
            tx("US", "A", 1.0, 1.0),
            tx("US", "A", 2.0, 1.0),
            tx("US", "B", 4.0, 1.0),
        ]);
        let groups = group_by(&table, |t| (t.country.clone(), t.channel.clone()));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&("US".to_string(), "A".to_string())].amount, 3.0);
    }

    #[test]
    fn test_stats_means() {
        let table = TransactionTable::from_records(vec![
            tx("US", "A", 100.0, 10.0),
            tx("US", "A", 50.0, 20.0),
        ]);
        let stats = group_by(&table, |t| t.channel.clone())["A"].stats();
        assert_eq!(stats.transaction_count, 2);
        assert_eq!(stats.avg_transaction, 75.0);
        assert_eq!(stats.avg_fee, 7.5);
        assert_eq!(stats.avg_profit_loss, 15.0);
    }

    #[test]
    fn test_collect_by_keeps_order() {
        let table = TransactionTable::from_records(vec![
            tx("US", "A", 3.0, 0.0),
            tx("US", "A", 1.0, 0.0),
        ]);
        let values = collect_by(&table, |t| t.channel.clone(), |t| t.amount);
        assert_eq!(values["A"], vec![3.0, 1.0]);
    }
}
