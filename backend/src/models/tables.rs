//! Derived tables produced by the metrics pipeline.
//!
//! Every ratio shares one sentinel for an undefined value: `f64::NAN`.
//! It serialises to JSON `null`, and ratio fields read `null` back as NaN.
//!
//! All types implement [`Rounded`], giving the 2-decimal presentation form
//! while the pipeline keeps full precision.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialise a float that may have been written as `null` (NaN).
pub fn nan_from_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Round to 2 decimals, half away from zero. NaN stays NaN.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Presentation form with every float rounded to 2 decimals.
pub trait Rounded {
    fn rounded(&self) -> Self;
}

impl<T: Rounded> Rounded for Vec<T> {
    fn rounded(&self) -> Self {
        self.iter().map(Rounded::rounded).collect()
    }
}

// =============================================================================
// Headline Metrics
// =============================================================================

/// Scalars shown at the top of the dashboard and on the report summary page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlineMetrics {
    /// Σ amount
    pub total_volume: f64,
    pub total_transactions: usize,
    /// mean amount
    #[serde(deserialize_with = "nan_from_null")]
    pub average_transaction: f64,
    /// Σ fee
    pub total_fees: f64,
}

impl Rounded for HeadlineMetrics {
    fn rounded(&self) -> Self {
        Self {
            total_volume: round2(self.total_volume),
            total_transactions: self.total_transactions,
            average_transaction: round2(self.average_transaction),
            total_fees: round2(self.total_fees),
        }
    }
}

// =============================================================================
// Rollups
// =============================================================================

/// Per-day sums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRollup {
    pub date: NaiveDate,
    pub amount: f64,
    pub fee: f64,
    pub profit_loss: f64,
}

impl Rounded for DailyRollup {
    fn rounded(&self) -> Self {
        Self {
            date: self.date,
            amount: round2(self.amount),
            fee: round2(self.fee),
            profit_loss: round2(self.profit_loss),
        }
    }
}

/// sum/count/mean aggregates shared by channel, region and method rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub total_volume: f64,
    pub transaction_count: usize,
    pub avg_transaction: f64,
    pub total_fees: f64,
    pub avg_fee: f64,
    pub total_profit_loss: f64,
    pub avg_profit_loss: f64,
}

impl Rounded for GroupStats {
    fn rounded(&self) -> Self {
        Self {
            total_volume: round2(self.total_volume),
            transaction_count: self.transaction_count,
            avg_transaction: round2(self.avg_transaction),
            total_fees: round2(self.total_fees),
            avg_fee: round2(self.avg_fee),
            total_profit_loss: round2(self.total_profit_loss),
            avg_profit_loss: round2(self.avg_profit_loss),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRollup {
    pub channel: String,
    #[serde(flatten)]
    pub stats: GroupStats,
}

impl Rounded for ChannelRollup {
    fn rounded(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            stats: self.stats.rounded(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionRollup {
    pub country: String,
    #[serde(flatten)]
    pub stats: GroupStats,
    /// Share of rows with `profit_loss > 0`, in percent.
    #[serde(deserialize_with = "nan_from_null")]
    pub success_rate: f64,
}

impl Rounded for RegionRollup {
    fn rounded(&self) -> Self {
        Self {
            country: self.country.clone(),
            stats: self.stats.rounded(),
            success_rate: round2(self.success_rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodRollup {
    pub method: String,
    #[serde(flatten)]
    pub stats: GroupStats,
    /// Σ profit_loss / Σ amount × 100
    #[serde(deserialize_with = "nan_from_null")]
    pub efficiency_score: f64,
}

impl Rounded for MethodRollup {
    fn rounded(&self) -> Self {
        Self {
            method: self.method.clone(),
            stats: self.stats.rounded(),
            efficiency_score: round2(self.efficiency_score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEfficiency {
    pub channel: String,
    pub amount: f64,
    pub fee: f64,
    pub profit_loss: f64,
    /// Σ fee / Σ amount × 100
    #[serde(deserialize_with = "nan_from_null")]
    pub fee_ratio: f64,
    /// Σ profit_loss / Σ amount × 100
    #[serde(deserialize_with = "nan_from_null")]
    pub profit_ratio: f64,
    /// profit_ratio − fee_ratio
    #[serde(deserialize_with = "nan_from_null")]
    pub efficiency_score: f64,
}

impl Rounded for ChannelEfficiency {
    fn rounded(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            amount: round2(self.amount),
            fee: round2(self.fee),
            profit_loss: round2(self.profit_loss),
            fee_ratio: round2(self.fee_ratio),
            profit_ratio: round2(self.profit_ratio),
            efficiency_score: round2(self.efficiency_score),
        }
    }
}

/// The most profitable channel of one country.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestChannel {
    pub country: String,
    pub channel: String,
    /// Σ profit_loss of (country, channel)
    pub profit_loss: f64,
    /// Other channels with exactly the same Σ profit_loss. Empty when the
    /// choice was unambiguous.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tied_with: Vec<String>,
}

impl Rounded for BestChannel {
    fn rounded(&self) -> Self {
        Self {
            profit_loss: round2(self.profit_loss),
            ..self.clone()
        }
    }
}

// =============================================================================
// Supplementary Tables
// =============================================================================

/// Σ amount per (date, method).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDailyRollup {
    pub date: NaiveDate,
    pub method: String,
    pub amount: f64,
}

impl Rounded for MethodDailyRollup {
    fn rounded(&self) -> Self {
        Self {
            amount: round2(self.amount),
            ..self.clone()
        }
    }
}

/// Σ amount per (method, channel), only for pairs that occur.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodChannelRollup {
    pub method: String,
    pub channel: String,
    pub amount: f64,
}

impl Rounded for MethodChannelRollup {
    fn rounded(&self) -> Self {
        Self {
            amount: round2(self.amount),
            ..self.clone()
        }
    }
}

/// Σ amount pivot: one row per channel, one column per country.
///
/// Pairs with no rows hold `0.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCountryMatrix {
    pub channels: Vec<String>,
    pub countries: Vec<String>,
    /// `values[channel_idx][country_idx]`
    pub values: Vec<Vec<f64>>,
}

impl ChannelCountryMatrix {
    pub fn get(&self, channel: &str, country: &str) -> Option<f64> {
        let row = self.channels.iter().position(|c| c == channel)?;
        let col = self.countries.iter().position(|c| c == country)?;
        Some(self.values[row][col])
    }
}

impl Rounded for ChannelCountryMatrix {
    fn rounded(&self) -> Self {
        Self {
            channels: self.channels.clone(),
            countries: self.countries.clone(),
            values: self
                .values
                .iter()
                .map(|row| row.iter().copied().map(round2).collect())
                .collect(),
        }
    }
}

/// Five-number summary of `fee_percentage` per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeDistribution {
    pub channel: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl Rounded for FeeDistribution {
    fn rounded(&self) -> Self {
        Self {
            channel: self.channel.clone(),
            count: self.count,
            min: round2(self.min),
            q1: round2(self.q1),
            median: round2(self.median),
            q3: round2(self.q3),
            max: round2(self.max),
        }
    }
}

// =============================================================================
// Derived Tables
// =============================================================================

/// Everything the pipeline produces for one upload.
///
/// Keyed tables are sorted by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedTables {
    pub headline: HeadlineMetrics,
    pub daily: Vec<DailyRollup>,
    pub channels: Vec<ChannelRollup>,
    pub regions: Vec<RegionRollup>,
    pub methods: Vec<MethodRollup>,
    pub channel_efficiency: Vec<ChannelEfficiency>,
    pub best_channel_per_country: Vec<BestChannel>,
    pub method_daily: Vec<MethodDailyRollup>,
    pub method_channel: Vec<MethodChannelRollup>,
    pub channel_country: ChannelCountryMatrix,
    pub fee_distribution: Vec<FeeDistribution>,
    /// Highest efficiency scores first.
    pub top_channels: Vec<ChannelEfficiency>,
}

impl DerivedTables {
    pub fn best_channel_for(&self, country: &str) -> Option<&BestChannel> {
        self.best_channel_per_country
            .iter()
            .find(|b| b.country == country)
    }

    pub fn region(&self, country: &str) -> Option<&RegionRollup> {
        self.regions.iter().find(|r| r.country == country)
    }

    pub fn channel(&self, channel: &str) -> Option<&ChannelRollup> {
        self.channels.iter().find(|c| c.channel == channel)
    }
}

impl Rounded for DerivedTables {
    fn rounded(&self) -> Self {
        Self {
            headline: self.headline.rounded(),
            daily: self.daily.rounded(),
            channels: self.channels.rounded(),
            regions: self.regions.rounded(),
            methods: self.methods.rounded(),
            channel_efficiency: self.channel_efficiency.rounded(),
            best_channel_per_country: self.best_channel_per_country.rounded(),
            method_daily: self.method_daily.rounded(),
            method_channel: self.method_channel.rounded(),
            channel_country: self.channel_country.rounded(),
            fee_distribution: self.fee_distribution.rounded(),
            top_channels: self.top_channels.rounded(),
        }
    }
}
