//! Static report export.
//!
//! A report is one summary page with the headline metrics followed by one
//! page per chart, in the order the charts were given:
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐       ┌──────────────┐
//! │ 1  Summary   │  │ 2  Chart #1  │  ...  │ N+1 Chart #N │
//! └──────────────┘  └──────────────┘       └──────────────┘
//! ```
//!
//! Rendering goes through [`ReportRenderer`]; the crate ships a JSON and a
//! plain-text renderer. Export failures never touch the loaded session.

pub mod charts;
pub mod format;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{ExportError, ExportResult};
use crate::logging::LogService;
use crate::models::DerivedTables;

pub use charts::{
    build_charts, dashboard_charts, Chart, ChartData, ChartKind, HierarchyNode, Point, ScatterPoint,
    Series,
};
pub use format::{format_count, format_currency, format_percent, headline_metrics};

pub const REPORT_TITLE: &str = "FINEST FIAT Payment Analytics Report";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PageContent {
    Summary { metrics: Vec<(String, String)> },
    Chart { chart: Chart },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPage {
    /// 1-based
    pub number: usize,
    pub title: String,
    pub content: PageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub title: String,
    pub generated_at: DateTime<Local>,
    pub pages: Vec<ReportPage>,
}

impl ReportDocument {
    /// Lay out the summary page and one page per chart.
    ///
    /// Chart titles must be distinct.
    pub fn assemble(
        metrics: Vec<(String, String)>,
        charts: Vec<Chart>,
        generated_at: DateTime<Local>,
    ) -> ExportResult<Self> {
        let mut seen = HashSet::new();
        for chart in &charts {
            if !seen.insert(chart.title.as_str()) {
                return Err(ExportError::DuplicateChart(chart.title.clone()));
            }
        }

        let mut pages = Vec::with_capacity(charts.len() + 1);
        pages.push(ReportPage {
            number: 1,
            title: "Summary Metrics".to_string(),
            content: PageContent::Summary { metrics },
        });
        for (i, chart) in charts.into_iter().enumerate() {
            pages.push(ReportPage {
                number: i + 2,
                title: chart.title.clone(),
                content: PageContent::Chart { chart },
            });
        }

        Ok(Self {
            title: REPORT_TITLE.to_string(),
            generated_at,
            pages,
        })
    }

    /// Standard report for a set of derived tables.
    pub fn from_tables(tables: &DerivedTables) -> ExportResult<Self> {
        Self::assemble(
            headline_metrics(&tables.headline),
            build_charts(tables),
            Local::now(),
        )
    }

    pub fn chart_titles(&self) -> Vec<&str> {
        self.pages
            .iter()
            .filter(|p| matches!(p.content, PageContent::Chart { .. }))
            .map(|p| p.title.as_str())
            .collect()
    }
}

/// Turns a report document into bytes.
pub trait ReportRenderer {
    /// File extension without the dot.
    fn extension(&self) -> &'static str;

    fn render(&self, doc: &ReportDocument, out: &mut dyn Write) -> ExportResult<()>;
}

/// Pretty-printed JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportRenderer;

impl ReportRenderer for JsonReportRenderer {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, doc: &ReportDocument, out: &mut dyn Write) -> ExportResult<()> {
        serde_json::to_writer_pretty(&mut *out, doc)?;
        out.write_all(b"\n")?;
        Ok(())
    }
}

/// Paginated plain text; pages separated by form feeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextReportRenderer;

impl TextReportRenderer {
    fn render_chart(chart: &Chart, out: &mut dyn Write) -> std::io::Result<()> {
        match &chart.data {
            ChartData::Series { series } => {
                for s in series {
                    writeln!(out, "{}", s.name)?;
                    for p in &s.points {
                        writeln!(out, "  {:<24} {:>16}", p.x, format_number(p.y))?;
                    }
                }
            }
            ChartData::Boxes { boxes } => {
                writeln!(out, "  {:<16} {:>8} {:>8} {:>8} {:>8} {:>8}", "", "min", "q1", "median", "q3", "max")?;
                for b in boxes {
                    writeln!(
                        out,
                        "  {:<16} {:>8.2} {:>8.2} {:>8.2} {:>8.2} {:>8.2}",
                        b.channel, b.min, b.q1, b.median, b.q3, b.max
                    )?;
                }
            }
            ChartData::Scatter { points } => {
                for p in points {
                    writeln!(
                        out,
                        "  {:<16} {}={:>10} {}={:>10}",
                        p.label,
                        chart.x_label,
                        format_percent(p.x),
                        chart.y_label,
                        format_percent(p.y)
                    )?;
                }
            }
            ChartData::Hierarchy { roots } => {
                for root in roots {
                    writeln!(out, "  {:<24} {:>16}", root.label, format_number(root.value))?;
                    for child in &root.children {
                        writeln!(out, "    {:<22} {:>16}", child.label, format_number(child.value))?;
                    }
                }
            }
            ChartData::Heatmap { rows, columns, values } => {
                write!(out, "  {:<16}", "")?;
                for c in columns {
                    write!(out, " {:>12}", c)?;
                }
                writeln!(out)?;
                for (row, vals) in rows.iter().zip(values) {
                    write!(out, "  {:<16}", row)?;
                    for v in vals {
                        write!(out, " {:>12}", format_number(*v))?;
                    }
                    writeln!(out)?;
                }
            }
        }
        Ok(())
    }
}

fn format_number(v: f64) -> String {
    if v.is_finite() {
        format!("{:.2}", v)
    } else {
        format::UNDEFINED.to_string()
    }
}

impl ReportRenderer for TextReportRenderer {
    fn extension(&self) -> &'static str {
        "txt"
    }

    fn render(&self, doc: &ReportDocument, out: &mut dyn Write) -> ExportResult<()> {
        for (i, page) in doc.pages.iter().enumerate() {
            if i > 0 {
                out.write_all(b"\x0c\n")?;
            }
            writeln!(out, "{}", doc.title)?;
            writeln!(out)?;
            if page.number == 1 {
                writeln!(
                    out,
                    "Report Generated: {}",
                    doc.generated_at.format("%Y-%m-%d %H:%M:%S")
                )?;
                writeln!(out)?;
            }
            writeln!(out, "{}", page.title)?;
            match &page.content {
                PageContent::Summary { metrics } => {
                    for (name, value) in metrics {
                        writeln!(out, "{}: {}", name, value)?;
                    }
                }
                PageContent::Chart { chart } => Self::render_chart(chart, out)?,
            }
            writeln!(out)?;
            writeln!(out, "Page {}", page.number)?;
        }
        Ok(())
    }
}

/// `payment_analytics_report_YYYYmmdd_HHMMSS.<ext>`
pub fn report_file_name(generated_at: &DateTime<Local>, extension: &str) -> String {
    format!(
        "payment_analytics_report_{}.{}",
        generated_at.format("%Y%m%d_%H%M%S"),
        extension
    )
}

/// Write a document into `reports_dir` (created if missing) and return its path.
pub fn export_report(
    doc: &ReportDocument,
    renderer: &dyn ReportRenderer,
    reports_dir: &Path,
) -> ExportResult<PathBuf> {
    fs::create_dir_all(reports_dir)?;
    let path = reports_dir.join(report_file_name(&doc.generated_at, renderer.extension()));

    let mut writer = BufWriter::new(File::create(&path)?);
    renderer.render(doc, &mut writer)?;
    writer.flush()?;
    Ok(path)
}

/// Build the standard report and export it, logging the outcome.
pub fn export_tables(
    tables: &DerivedTables,
    renderer: &dyn ReportRenderer,
    reports_dir: &Path,
    log: &LogService,
) -> ExportResult<(PathBuf, ReportDocument)> {
    log.info("📄 Generating report...");
    let result = ReportDocument::from_tables(tables)
        .and_then(|doc| export_report(&doc, renderer, reports_dir).map(|path| (path, doc)));

    match &result {
        Ok((path, doc)) => log.success(format!(
            "Report written: {} ({} pages)",
            path.display(),
            doc.pages.len()
        )),
        Err(e) => log.error(format!(
            "Error exporting report to {} [export]: {}",
            reports_dir.display(),
            e
        )),
    }
    result
}
