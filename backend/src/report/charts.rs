//! Chart specifications built from derived tables.
//!
//! These are data, not images: each chart carries its named series so an
//! external renderer (browser, plotting tool) can draw it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{nan_from_null, DerivedTables, FeeDistribution, TransactionTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Treemap,
    Sunburst,
    Box,
    Scatter,
    Heatmap,
}

/// One (label, value) point of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: String,
    #[serde(deserialize_with = "nan_from_null")]
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub points: Vec<Point>,
}

impl Series {
    fn from_pairs(name: &str, pairs: impl IntoIterator<Item = (String, f64)>) -> Self {
        Self {
            name: name.to_string(),
            points: pairs.into_iter().map(|(x, y)| Point { x, y }).collect(),
        }
    }
}

/// Labelled point of a scatter plot, sized by `size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub label: String,
    #[serde(deserialize_with = "nan_from_null")]
    pub x: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub y: f64,
    pub size: f64,
    /// Colour group, when points are coloured by a category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

/// Node of a treemap or sunburst. A parent's value is the sum of its children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub label: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Two-level tree from (outer, inner, value) leaves, both levels sorted by label.
    fn two_level(leaves: impl IntoIterator<Item = (String, String, f64)>) -> Vec<Self> {
        let mut outer: BTreeMap<String, BTreeMap<String, f64>> = BTreeMap::new();
        for (parent, child, value) in leaves {
            *outer.entry(parent).or_default().entry(child).or_default() += value;
        }
        outer
            .into_iter()
            .map(|(label, inner)| {
                let children: Vec<Self> = inner
                    .into_iter()
                    .map(|(label, value)| Self {
                        label,
                        value,
                        children: Vec::new(),
                    })
                    .collect();
                Self {
                    label,
                    value: children.iter().map(|c| c.value).sum(),
                    children,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChartData {
    Series { series: Vec<Series> },
    Boxes { boxes: Vec<FeeDistribution> },
    Scatter { points: Vec<ScatterPoint> },
    Hierarchy { roots: Vec<HierarchyNode> },
    Heatmap {
        rows: Vec<String>,
        columns: Vec<String>,
        values: Vec<Vec<f64>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub title: String,
    pub kind: ChartKind,
    pub x_label: String,
    pub y_label: String,
    pub data: ChartData,
}

pub const DAILY_VOLUME: &str = "Daily Transaction Volume";
pub const CHANNEL_ANALYSIS: &str = "Channel Analysis";
pub const REGIONAL_PERFORMANCE: &str = "Regional Performance";
pub const FEE_DISTRIBUTION: &str = "Fee Distribution";
pub const METHOD_PERFORMANCE: &str = "Method Performance";
pub const CHANNEL_EFFICIENCY: &str = "Channel Efficiency";
pub const CHANNEL_COUNTRY: &str = "Channel Country Performance";
pub const FEE_BY_REGION: &str = "Fee Structure by Region";
pub const METHOD_OVER_TIME: &str = "Method Performance Over Time";

/// The dashboard charts, in report order.
pub fn build_charts(tables: &DerivedTables) -> Vec<Chart> {
    let day = |d: &chrono::NaiveDate| d.format("%Y-%m-%d").to_string();

    vec![
        Chart {
            title: DAILY_VOLUME.to_string(),
            kind: ChartKind::Line,
            x_label: "Date".to_string(),
            y_label: "Amount ($)".to_string(),
            data: ChartData::Series {
                series: vec![
                    Series::from_pairs("Amount", tables.daily.iter().map(|d| (day(&d.date), d.amount))),
                    Series::from_pairs("Fee", tables.daily.iter().map(|d| (day(&d.date), d.fee))),
                    Series::from_pairs(
                        "Profit_Loss",
                        tables.daily.iter().map(|d| (day(&d.date), d.profit_loss)),
                    ),
                ],
            },
        },
        Chart {
            title: CHANNEL_ANALYSIS.to_string(),
            kind: ChartKind::Bar,
            x_label: "Channel".to_string(),
            y_label: "Profit_Loss".to_string(),
            data: ChartData::Series {
                series: vec![Series::from_pairs(
                    "Profit_Loss",
                    tables
                        .channels
                        .iter()
                        .map(|c| (c.channel.clone(), c.stats.total_profit_loss)),
                )],
            },
        },
        Chart {
            title: REGIONAL_PERFORMANCE.to_string(),
            kind: ChartKind::Treemap,
            x_label: "Country / Channel".to_string(),
            y_label: "Amount".to_string(),
            data: ChartData::Hierarchy {
                roots: HierarchyNode::two_level(country_channel_leaves(tables)),
            },
        },
        Chart {
            title: FEE_DISTRIBUTION.to_string(),
            kind: ChartKind::Box,
            x_label: "Channel".to_string(),
            y_label: "Fee_Percentage".to_string(),
            data: ChartData::Boxes {
                boxes: tables.fee_distribution.clone(),
            },
        },
        Chart {
            title: METHOD_PERFORMANCE.to_string(),
            kind: ChartKind::Sunburst,
            x_label: "Method / Channel".to_string(),
            y_label: "Amount".to_string(),
            data: ChartData::Hierarchy {
                roots: HierarchyNode::two_level(
                    tables
                        .method_channel
                        .iter()
                        .map(|m| (m.method.clone(), m.channel.clone(), m.amount)),
                ),
            },
        },
        Chart {
            title: CHANNEL_EFFICIENCY.to_string(),
            kind: ChartKind::Scatter,
            x_label: "Fee_Ratio".to_string(),
            y_label: "Profit_Ratio".to_string(),
            data: ChartData::Scatter {
                points: tables
                    .channel_efficiency
                    .iter()
                    .map(|c| ScatterPoint {
                        label: c.channel.clone(),
                        x: c.fee_ratio,
                        y: c.profit_ratio,
                        size: c.amount,
                        group: None,
                    })
                    .collect(),
            },
        },
        Chart {
            title: CHANNEL_COUNTRY.to_string(),
            kind: ChartKind::Heatmap,
            x_label: "Country".to_string(),
            y_label: "Channel".to_string(),
            data: ChartData::Heatmap {
                rows: tables.channel_country.channels.clone(),
                columns: tables.channel_country.countries.clone(),
                values: tables.channel_country.values.clone(),
            },
        },
    ]
}

/// Country → channel leaves of the channel × country matrix. Zero-filled
/// cells are left out.
fn country_channel_leaves(tables: &DerivedTables) -> Vec<(String, String, f64)> {
    let matrix = &tables.channel_country;
    let mut leaves = Vec::new();
    for (channel, row) in matrix.channels.iter().zip(&matrix.values) {
        for (country, &amount) in matrix.countries.iter().zip(row) {
            if amount != 0.0 {
                leaves.push((country.clone(), channel.clone(), amount));
            }
        }
    }
    leaves
}

/// Report charts followed by the dashboard-only views: a per-transaction
/// fee scatter coloured by country, and one amount line per method.
pub fn dashboard_charts(tables: &DerivedTables, table: &TransactionTable) -> Vec<Chart> {
    let mut charts = build_charts(tables);

    charts.push(Chart {
        title: FEE_BY_REGION.to_string(),
        kind: ChartKind::Scatter,
        x_label: "Amount".to_string(),
        y_label: "Fee_Percentage".to_string(),
        data: ChartData::Scatter {
            points: table
                .iter()
                .map(|t| ScatterPoint {
                    label: t.channel.clone(),
                    x: t.amount,
                    y: t.fee_percentage,
                    size: t.amount.abs(),
                    group: Some(t.country.clone()),
                })
                .collect(),
        },
    });

    let mut per_method: BTreeMap<&str, Vec<Point>> = BTreeMap::new();
    for m in &tables.method_daily {
        per_method.entry(m.method.as_str()).or_default().push(Point {
            x: m.date.format("%Y-%m-%d").to_string(),
            y: m.amount,
        });
    }
    charts.push(Chart {
        title: METHOD_OVER_TIME.to_string(),
        kind: ChartKind::Line,
        x_label: "Date".to_string(),
        y_label: "Amount".to_string(),
        data: ChartData::Series {
            series: per_method
                .into_iter()
                .map(|(name, points)| Series {
                    name: name.to_string(),
                    points,
                })
                .collect(),
        },
    });

    charts
}
