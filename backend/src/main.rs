//! FINEST CLI - FIAT payment analytics
//!
//! # Commands
//!
//! ```bash
//! finest serve                         # Start HTTP server (port 3000)
//! finest analyze transactions.csv      # Print all derived tables as JSON
//! finest report transactions.csv       # Export the analytics report
//! finest columns                       # Show the expected CSV columns
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use finest::parser::{COLUMN_RENAMES, REQUIRED_COLUMNS};
use finest::report::{export_tables, ReportRenderer};
use finest::{
    analyze_file, AppConfig, JsonReportRenderer, LogService, Rounded, TextReportRenderer,
    TransactionLogger,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "finest")]
#[command(about = "FIAT payment analytics: rollups, dashboard API and reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (default: FINEST_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Compute every derived table and output JSON
    Analyze {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Round every value to 2 decimals
        #[arg(long)]
        rounded: bool,
    },

    /// Export the analytics report for a CSV file
    Report {
        /// Input CSV file
        input: PathBuf,

        /// Directory to write into (default: FINEST_REPORTS_DIR or ./reports)
        #[arg(short = 'd', long)]
        out_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: ReportFormat,
    },

    /// Show the CSV columns the analysis expects
    Columns,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Text,
}

impl ReportFormat {
    fn renderer(self) -> Box<dyn ReportRenderer> {
        match self {
            ReportFormat::Json => Box::new(JsonReportRenderer),
            ReportFormat::Text => Box::new(TextReportRenderer),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let (config, warnings) = AppConfig::from_env();

    let log = match LogService::new(&config.log) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("   ⚠️ Cannot open log directory {}: {}", config.log.directory.display(), e);
            LogService::console(config.log.min_level)
        }
    };
    // stdout is reserved for JSON output outside the server
    let log = match cli.command {
        Commands::Serve { .. } => log,
        _ => log.with_stderr_console(),
    };
    let log = Arc::new(log);
    for warning in &warnings {
        log.warning(warning.as_str());
    }

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(config, port, log).await,

        Commands::Analyze {
            input,
            output,
            rounded,
        } => cmd_analyze(&config, &log, &input, output.as_deref(), rounded),

        Commands::Report {
            input,
            out_dir,
            format,
        } => cmd_report(&config, &log, &input, out_dir.as_deref(), format),

        Commands::Columns => cmd_columns(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_serve(
    mut config: AppConfig,
    port: Option<u16>,
    log: Arc<LogService>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port {
        config.port = port;
    }
    finest::server::start_server(config, log).await
}

fn cmd_analyze(
    config: &AppConfig,
    log: &Arc<LogService>,
    input: &Path,
    output: Option<&Path>,
    rounded: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let analysis = analyze_file(input, log)?;
    let events = TransactionLogger::new(&config.event_log_path, Arc::clone(log));
    events.file_upload(&input.display().to_string(), analysis.table.len());

    let tables = if rounded {
        analysis.tables.rounded()
    } else {
        analysis.tables
    };
    let json = serde_json::to_string_pretty(&tables)?;
    write_output(&json, output)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_report(
    config: &AppConfig,
    log: &Arc<LogService>,
    input: &Path,
    out_dir: Option<&Path>,
    format: ReportFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let analysis = analyze_file(input, log)?;
    let events = TransactionLogger::new(&config.event_log_path, Arc::clone(log));
    events.file_upload(&input.display().to_string(), analysis.table.len());

    let reports_dir = out_dir.unwrap_or(config.reports_dir.as_path());
    let renderer = format.renderer();
    let (path, doc) = export_tables(&analysis.tables, renderer.as_ref(), reports_dir, log)?;
    events.report_export(&path, doc.pages.len());

    eprintln!("\n📄 Pages:");
    for page in &doc.pages {
        eprintln!("   {:>2}. {}", page.number, page.title);
    }
    println!("{}", path.display());
    Ok(())
}

fn cmd_columns() -> Result<(), Box<dyn std::error::Error>> {
    println!("Required columns:");
    for column in REQUIRED_COLUMNS {
        let aliases: Vec<&str> = COLUMN_RENAMES
            .iter()
            .filter(|(_, canonical)| *canonical == column)
            .map(|(source, _)| *source)
            .collect();
        if aliases.is_empty() {
            println!("   {}", column);
        } else {
            println!("   {} (source header: \"{}\")", column, aliases.join("\", \""));
        }
    }
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
