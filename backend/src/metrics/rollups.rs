//! Rollup tables over a transaction table.
//!
//! Ratios go through [`ratio`]: a zero denominator yields `f64::NAN` and a
//! [`ComputationError`] pushed onto the caller's issue list.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::grouper::{collect_by, group_by};
use crate::error::ComputationError;
use crate::models::{
    BestChannel, ChannelCountryMatrix, ChannelEfficiency, ChannelRollup, DailyRollup,
    DerivedTables, FeeDistribution, HeadlineMetrics, MethodChannelRollup, MethodDailyRollup, MethodRollup,
    RegionRollup, TransactionTable,
};

/// How many channels [`top_channels`] keeps.
pub const TOP_CHANNELS: usize = 3;

/// `numerator / denominator × 100`, or NaN when the denominator is zero.
pub fn ratio(
    numerator: f64,
    denominator: f64,
    metric: &'static str,
    key: &str,
    issues: &mut Vec<ComputationError>,
) -> f64 {
    if denominator == 0.0 {
        issues.push(ComputationError::DivisionByZero {
            metric,
            key: key.to_string(),
        });
        return f64::NAN;
    }
    numerator / denominator * 100.0
}

pub fn headline(table: &TransactionTable, issues: &mut Vec<ComputationError>) -> HeadlineMetrics {
    let total_volume: f64 = table.iter().map(|t| t.amount).sum();
    let total_fees: f64 = table.iter().map(|t| t.fee()).sum();
    let total_transactions = table.len();

    let average_transaction = if total_transactions == 0 {
        issues.push(ComputationError::DivisionByZero {
            metric: "average_transaction",
            key: "*".to_string(),
        });
        f64::NAN
    } else {
        total_volume / total_transactions as f64
    };

    HeadlineMetrics {
        total_volume,
        total_transactions,
        average_transaction,
        total_fees,
    }
}

pub fn daily_rollup(table: &TransactionTable) -> Vec<DailyRollup> {
    group_by(table, |t| t.date())
        .into_iter()
        .map(|(date, g)| DailyRollup {
            date,
            amount: g.amount,
            fee: g.fee,
            profit_loss: g.profit_loss,
        })
        .collect()
}

pub fn channel_rollup(table: &TransactionTable) -> Vec<ChannelRollup> {
    group_by(table, |t| t.channel.clone())
        .into_iter()
        .map(|(channel, g)| ChannelRollup {
            channel,
            stats: g.stats(),
        })
        .collect()
}

pub fn region_rollup(
    table: &TransactionTable,
    issues: &mut Vec<ComputationError>,
) -> Vec<RegionRollup> {
    group_by(table, |t| t.country.clone())
        .into_iter()
        .map(|(country, g)| {
            let success_rate = ratio(
                g.profitable as f64,
                g.count as f64,
                "success_rate",
                &country,
                issues,
            );
            RegionRollup {
                stats: g.stats(),
                success_rate,
                country,
            }
        })
        .collect()
}

pub fn method_rollup(
    table: &TransactionTable,
    issues: &mut Vec<ComputationError>,
) -> Vec<MethodRollup> {
    group_by(table, |t| t.method.clone())
        .into_iter()
        .map(|(method, g)| {
            let efficiency_score = ratio(g.profit_loss, g.amount, "efficiency_score", &method, issues);
            MethodRollup {
                stats: g.stats(),
                efficiency_score,
                method,
            }
        })
        .collect()
}

pub fn channel_efficiency(
    table: &TransactionTable,
    issues: &mut Vec<ComputationError>,
) -> Vec<ChannelEfficiency> {
    group_by(table, |t| t.channel.clone())
        .into_iter()
        .map(|(channel, g)| {
            let fee_ratio = ratio(g.fee, g.amount, "fee_ratio", &channel, issues);
            let profit_ratio = ratio(g.profit_loss, g.amount, "profit_ratio", &channel, issues);
            ChannelEfficiency {
                amount: g.amount,
                fee: g.fee,
                profit_loss: g.profit_loss,
                fee_ratio,
                profit_ratio,
                efficiency_score: profit_ratio - fee_ratio,
                channel,
            }
        })
        .collect()
}

/// For each country, the channel with the largest Σ profit_loss.
///
/// On an exact tie the lexicographically smallest channel is chosen and the
/// others are listed in `tied_with`.
pub fn best_channel_per_country(table: &TransactionTable) -> Vec<BestChannel> {
    let pairs = group_by(table, |t| (t.country.clone(), t.channel.clone()));

    let mut by_country: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
    for ((country, channel), g) in pairs {
        by_country.entry(country).or_default().push((channel, g.profit_loss));
    }

    by_country
        .into_iter()
        .filter_map(|(country, channels)| {
            // channels arrive sorted by name; strict `>` keeps the first on ties
            let (best, best_pl) = channels.iter().fold(None, |acc: Option<(&String, f64)>, (ch, pl)| {
                match acc {
                    Some((_, best_pl)) if *pl <= best_pl => acc,
                    _ => Some((ch, *pl)),
                }
            })?;
            let tied_with = channels
                .iter()
                .filter(|(ch, pl)| ch != best && *pl == best_pl)
                .map(|(ch, _)| ch.clone())
                .collect();
            Some(BestChannel {
                country,
                channel: best.clone(),
                profit_loss: best_pl,
                tied_with,
            })
        })
        .collect()
}

pub fn method_daily_rollup(table: &TransactionTable) -> Vec<MethodDailyRollup> {
    group_by(table, |t| (t.date(), t.method.clone()))
        .into_iter()
        .map(|((date, method), g)| MethodDailyRollup {
            date,
            method,
            amount: g.amount,
        })
        .collect()
}

/// Σ amount per (method, channel).
pub fn method_channel_rollup(table: &TransactionTable) -> Vec<MethodChannelRollup> {
    group_by(table, |t| (t.method.clone(), t.channel.clone()))
        .into_iter()
        .map(|((method, channel), g)| MethodChannelRollup {
            method,
            channel,
            amount: g.amount,
        })
        .collect()
}

/// Σ amount per channel × country, zero-filled.
pub fn channel_country_matrix(table: &TransactionTable) -> ChannelCountryMatrix {
    let pairs = group_by(table, |t| (t.channel.clone(), t.country.clone()));

    let mut channels: Vec<String> = pairs.keys().map(|(ch, _)| ch.clone()).collect();
    channels.dedup();
    let mut countries: Vec<String> = pairs.keys().map(|(_, co)| co.clone()).collect();
    countries.sort();
    countries.dedup();

    let values = channels
        .iter()
        .map(|channel| {
            countries
                .iter()
                .map(|country| {
                    pairs
                        .get(&(channel.clone(), country.clone()))
                        .map(|g| g.amount)
                        .unwrap_or(0.0)
                })
                .collect()
        })
        .collect();

    ChannelCountryMatrix {
        channels,
        countries,
        values,
    }
}

/// Linear-interpolation quantile of an ascending, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

pub fn fee_distribution(table: &TransactionTable) -> Vec<FeeDistribution> {
    collect_by(table, |t| t.channel.clone(), |t| t.fee_percentage)
        .into_iter()
        .map(|(channel, mut values)| {
            values.sort_by(f64::total_cmp);
            FeeDistribution {
                channel,
                count: values.len(),
                min: values[0],
                q1: quantile(&values, 0.25),
                median: quantile(&values, 0.5),
                q3: quantile(&values, 0.75),
                max: values[values.len() - 1],
            }
        })
        .collect()
}

fn by_score_desc(a: &ChannelEfficiency, b: &ChannelEfficiency) -> Ordering {
    let (sa, sb) = (a.efficiency_score, b.efficiency_score);
    let by_score = match (sa.is_nan(), sb.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => sb.total_cmp(&sa),
    };
    by_score.then_with(|| a.channel.cmp(&b.channel))
}

/// The `n` most efficient channels; undefined scores rank last.
pub fn top_channels(efficiency: &[ChannelEfficiency], n: usize) -> Vec<ChannelEfficiency> {
    let mut ranked = efficiency.to_vec();
    ranked.sort_by(by_score_desc);
    ranked.truncate(n);
    ranked
}

/// Every derived table plus the ratios that came out undefined.
pub fn derive_tables(table: &TransactionTable) -> (DerivedTables, Vec<ComputationError>) {
    let mut issues = Vec::new();

    let headline = headline(table, &mut issues);
    let regions = region_rollup(table, &mut issues);
    let methods = method_rollup(table, &mut issues);
    let channel_efficiency = channel_efficiency(table, &mut issues);
    let top_channels = top_channels(&channel_efficiency, TOP_CHANNELS);

    let tables = DerivedTables {
        headline,
        daily: daily_rollup(table),
        channels: channel_rollup(table),
        regions,
        methods,
        channel_efficiency,
        best_channel_per_country: best_channel_per_country(table),
        method_daily: method_daily_rollup(table),
        method_channel: method_channel_rollup(table),
        channel_country: channel_country_matrix(table),
        fee_distribution: fee_distribution(table),
        top_channels,
    };
    (tables, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionRecord;
    use chrono::NaiveDate;

    struct Row {
        country: &'static str,
        channel: &'static str,
        method: &'static str,
        amount: f64,
        fee_pct: f64,
        pl: f64,
        day: u32,
    }

    fn row(country: &'static str, channel: &'static str, amount: f64, pl: f64) -> Row {
        Row {
            country,
            channel,
            method: "Card",
            amount,
            fee_pct: 2.0,
            pl,
            day: 1,
        }
    }

    fn table(rows: Vec<Row>) -> TransactionTable {
        TransactionTable::from_records(rows.into_iter().map(|r| TransactionRecord {
            kind: "Deposit".into(),
            request_time: NaiveDate::from_ymd_opt(2024, 5, r.day)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            amount: r.amount,
            fee_percentage: r.fee_pct,
            net_profit_percentage: 0.0,
            profit_loss: r.pl,
            country: r.country.into(),
            channel: r.channel.into(),
            method: r.method.into(),
        }))
    }

    #[test]
    fn test_best_channel_example() {
        let t = table(vec![row("US", "A", 100.0, 10.0), row("US", "B", 50.0, 20.0)]);
        let best = best_channel_per_country(&t);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].country, "US");
        assert_eq!(best[0].channel, "B");
        assert_eq!(best[0].profit_loss, 20.0);
        assert!(best[0].tied_with.is_empty());
    }

    #[test]
    fn test_best_channel_sums_rows_before_comparing() {
        let t = table(vec![
            row("US", "A", 1.0, 15.0),
            row("US", "B", 1.0, 20.0),
            row("US", "A", 1.0, 15.0),
        ]);
        assert_eq!(best_channel_per_country(&t)[0].channel, "A");
    }

    #[test]
    fn test_best_channel_tie_is_lexicographic_and_reported() {
        let t = table(vec![
            row("DE", "Wire", 1.0, 5.0),
            row("DE", "Card", 1.0, 5.0),
            row("DE", "Bank", 1.0, -1.0),
        ]);
        let best = &best_channel_per_country(&t)[0];
        assert_eq!(best.channel, "Card");
        assert_eq!(best.tied_with, vec!["Wire"]);
    }

    #[test]
    fn test_best_channel_all_negative() {
        let t = table(vec![row("FR", "A", 1.0, -9.0), row("FR", "B", 1.0, -3.0)]);
        assert_eq!(best_channel_per_country(&t)[0].channel, "B");
    }

    #[test]
    fn test_success_rate() {
        let t = table(vec![
            row("US", "A", 1.0, 10.0),
            row("US", "A", 1.0, 0.0),
            row("US", "A", 1.0, -1.0),
            row("US", "A", 1.0, 3.0),
        ]);
        let mut issues = Vec::new();
        let regions = region_rollup(&t, &mut issues);
        assert_eq!(regions[0].success_rate, 50.0);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_zero_amount_channel_yields_nan_and_issue() {
        let t = table(vec![
            row("US", "Refund", 100.0, 1.0),
            row("US", "Refund", -100.0, 1.0),
            row("US", "Card", 200.0, 4.0),
        ]);
        let mut issues = Vec::new();
        let eff = channel_efficiency(&t, &mut issues);

        let refund = eff.iter().find(|e| e.channel == "Refund").unwrap();
        assert!(refund.fee_ratio.is_nan());
        assert!(refund.profit_ratio.is_nan());
        assert!(refund.efficiency_score.is_nan());

        let card = eff.iter().find(|e| e.channel == "Card").unwrap();
        assert_eq!(card.fee_ratio, 2.0);
        assert_eq!(card.profit_ratio, 2.0);
        assert_eq!(card.efficiency_score, 0.0);

        assert_eq!(
            issues,
            vec![
                ComputationError::DivisionByZero {
                    metric: "fee_ratio",
                    key: "Refund".into()
                },
                ComputationError::DivisionByZero {
                    metric: "profit_ratio",
                    key: "Refund".into()
                },
            ]
        );
    }

    #[test]
    fn test_method_efficiency_score() {
        let mut rows = vec![row("US", "A", 400.0, 20.0), row("US", "A", 100.0, 5.0)];
        rows[1].method = "SEPA";
        let mut issues = Vec::new();
        let methods = method_rollup(&table(rows), &mut issues);

        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].method, "Card");
        assert_eq!(methods[0].efficiency_score, 5.0);
        assert_eq!(methods[1].method, "SEPA");
        assert_eq!(methods[1].stats.transaction_count, 1);
    }

    #[test]
    fn test_daily_rollup_buckets_by_date() {
        let mut rows = vec![
            row("US", "A", 10.0, 1.0),
            row("US", "B", 20.0, 2.0),
            row("US", "A", 5.0, 0.5),
        ];
        rows[2].day = 2;
        let daily = daily_rollup(&table(rows));
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(daily[0].amount, 30.0);
        assert!((daily[0].fee - 0.6).abs() < 1e-9);
        assert_eq!(daily[1].profit_loss, 0.5);
    }

    #[test]
    fn test_channel_country_matrix_zero_fills() {
        let t = table(vec![
            row("US", "A", 10.0, 0.0),
            row("DE", "B", 7.0, 0.0),
            row("US", "A", 1.0, 0.0),
        ]);
        let m = channel_country_matrix(&t);
        assert_eq!(m.channels, vec!["A", "B"]);
        assert_eq!(m.countries, vec!["DE", "US"]);
        assert_eq!(m.get("A", "US"), Some(11.0));
        assert_eq!(m.get("A", "DE"), Some(0.0));
        assert_eq!(m.get("B", "DE"), Some(7.0));
    }

    #[test]
    fn test_method_channel_rollup_skips_absent_pairs() {
        let mut sepa = row("DE", "B", 30.0, 0.0);
        sepa.method = "SEPA";
        let t = table(vec![row("US", "A", 100.0, 0.0), row("US", "A", 20.0, 0.0), sepa]);
        let rollup = method_channel_rollup(&t);
        let keys: Vec<(&str, &str, f64)> = rollup
            .iter()
            .map(|r| (r.method.as_str(), r.channel.as_str(), r.amount))
            .collect();
        assert_eq!(keys, vec![("Card", "A", 120.0), ("SEPA", "B", 30.0)]);
    }

    #[test]
    fn test_fee_distribution_quartiles() {
        let rows = [1.0, 2.0, 3.0, 4.0, 5.0]
            .into_iter()
            .map(|pct| Row {
                fee_pct: pct,
                ..row("US", "A", 1.0, 0.0)
            })
            .collect();
        let dist = &fee_distribution(&table(rows))[0];
        assert_eq!(dist.count, 5);
        assert_eq!(dist.min, 1.0);
        assert_eq!(dist.q1, 2.0);
        assert_eq!(dist.median, 3.0);
        assert_eq!(dist.q3, 4.0);
        assert_eq!(dist.max, 5.0);
    }

    #[test]
    fn test_quantile_interpolates() {
        assert_eq!(quantile(&[1.0, 2.0], 0.5), 1.5);
        assert_eq!(quantile(&[7.0], 0.25), 7.0);
    }

    #[test]
    fn test_top_channels_nan_last() {
        let t = table(vec![
            row("US", "Zero", 100.0, 0.0),
            row("US", "Zero", -100.0, 0.0),
            row("US", "Good", 100.0, 10.0),
            row("US", "Bad", 100.0, -10.0),
            row("US", "Mid", 100.0, 5.0),
        ]);
        let mut issues = Vec::new();
        let eff = channel_efficiency(&t, &mut issues);
        let top: Vec<String> = top_channels(&eff, 3).into_iter().map(|c| c.channel).collect();
        assert_eq!(top, vec!["Good", "Mid", "Bad"]);

        let all: Vec<String> = top_channels(&eff, 10).into_iter().map(|c| c.channel).collect();
        assert_eq!(all.last().map(String::as_str), Some("Zero"));
    }

    #[test]
    fn test_headline() {
        let t = table(vec![row("US", "A", 100.0, 10.0), row("US", "B", 50.0, 20.0)]);
        let mut issues = Vec::new();
        let h = headline(&t, &mut issues);
        assert_eq!(h.total_volume, 150.0);
        assert_eq!(h.total_transactions, 2);
        assert_eq!(h.average_transaction, 75.0);
        assert_eq!(h.total_fees, 3.0);
    }

    #[test]
    fn test_empty_table_headline_is_nan() {
        let mut issues = Vec::new();
        let h = headline(&TransactionTable::default(), &mut issues);
        assert_eq!(h.total_transactions, 0);
        assert!(h.average_transaction.is_nan());
        assert_eq!(issues.len(), 1);
    }
}
