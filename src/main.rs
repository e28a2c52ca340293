use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use testhub::config::{HubConfig, LoggingConfig};
use testhub::reporting::export::ExportFormat;
use testhub::reporting::{summary, Reporter, MAX_HISTOGRAM_BINS};
use testhub::runner::{Browser, Orchestrator};
use testhub::storage::{ResultStore, TestStatus};

#[derive(Parser)]
#[command(
    name = "testhub",
    about = "Test automation hub: run Robot Framework suites, record outcomes, report trends",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (default: $TESTHUB_CONFIG, then ./testhub.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Bind address (overrides [server].bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run test files one after another and record each outcome
    Run {
        /// Robot Framework suite files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Browser passed to the suites as BROWSER
        #[arg(long, value_enum, default_value_t = Browser::Chrome)]
        browser: Browser,

        /// Print the captured runner output of every file
        #[arg(long)]
        show_output: bool,
    },

    /// List recent executions, newest first
    History {
        /// Maximum rows (default: [reporting].history_limit)
        #[arg(long)]
        limit: Option<u32>,

        /// Keep rows whose name or status contains this text
        #[arg(long)]
        search: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },

    /// Show totals, success rate and average duration
    Kpis {
        /// Trailing window in days (default: [reporting].kpi_window_days)
        #[arg(long)]
        days: Option<u32>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show pass/fail counts per day
    Trend {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show the duration distribution of recent executions
    Histogram {
        /// Number of buckets (default: [reporting].histogram_bins)
        #[arg(long)]
        bins: Option<usize>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        search: Option<String>,
    },

    /// Delete executions older than a number of days
    Purge {
        /// Age threshold in days (default: [retention].days)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Export recent executions as CSV, JSON or an Excel workbook
    Export {
        #[arg(long, value_enum)]
        format: ExportFormat,

        /// Output file (default: stdout, or tests_export.xlsx for xlsx)
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        search: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = HubConfig::resolve(cli.config.as_deref())?;

    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            let mut config = config;
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting testhub API");
            testhub::serve(config).await?;
        }
        Commands::Run {
            files,
            browser,
            show_output,
        } => {
            let store = open_store(&config)?;
            let orchestrator = Orchestrator::new(config.runner.clone(), store);
            let outcomes =
                tokio::task::spawn_blocking(move || orchestrator.run(&files, browser)).await??;

            println!("{:<40} | Status", "Test");
            println!("{:-<40}-|-{:-<6}", "", "");
            for outcome in &outcomes {
                println!("{:<40} | {}", outcome.test_name, outcome.status);
                if show_output && !outcome.output.is_empty() {
                    for line in outcome.output.lines() {
                        println!("    {line}");
                    }
                }
            }

            let failed = outcomes
                .iter()
                .filter(|o| o.status == TestStatus::Fail)
                .count();
            if failed > 0 {
                anyhow::bail!("{failed} of {} test files failed", outcomes.len());
            }
        }
        Commands::History {
            limit,
            search,
            format,
        } => {
            let reporter = Reporter::new(open_store(&config)?);
            let limit = limit.unwrap_or(config.reporting.history_limit);
            let table = reporter.history(limit, search.as_deref())?;
            match format {
                OutputFormat::Table => print!("{}", summary::format_history(&table)),
                OutputFormat::Csv => print!("{}", table.to_csv()),
                OutputFormat::Json => println!("{}", table.to_json()?),
            }
        }
        Commands::Kpis { days, json } => {
            let reporter = Reporter::new(open_store(&config)?);
            let kpis = reporter.summary(days.unwrap_or(config.reporting.kpi_window_days))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&kpis)?);
            } else {
                println!("{}", summary::format_kpis(&kpis));
            }
        }
        Commands::Trend { json } => {
            let reporter = Reporter::new(open_store(&config)?);
            let trend = reporter.trend()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&trend)?);
            } else {
                print!("{}", summary::format_trend(&trend));
            }
        }
        Commands::Histogram {
            bins,
            limit,
            search,
        } => {
            let bins = bins.unwrap_or(config.reporting.histogram_bins);
            if bins == 0 || bins > MAX_HISTOGRAM_BINS {
                anyhow::bail!("--bins must be between 1 and {MAX_HISTOGRAM_BINS}");
            }
            let reporter = Reporter::new(open_store(&config)?);
            let table = reporter.history(
                limit.unwrap_or(config.reporting.history_limit),
                search.as_deref(),
            )?;
            let bins = table.duration_histogram(bins);
            if bins.is_empty() {
                println!("No durations to plot.");
            } else {
                print!("{}", summary::format_histogram(&bins, 50));
            }
        }
        Commands::Purge { days } => {
            let store = open_store(&config)?;
            let days = days.unwrap_or(config.retention.days);
            let deleted = store.delete_older_than(days)?;
            println!("Deleted {deleted} result(s) older than {days} day(s).");
        }
        Commands::Export {
            format,
            output,
            limit,
            search,
        } => {
            let reporter = Reporter::new(open_store(&config)?);
            let table = reporter.history(
                limit.unwrap_or(config.reporting.history_limit),
                search.as_deref(),
            )?;
            let body = table.export(format)?;
            // Spreadsheets never go to the terminal.
            let output = match output {
                None if !format.is_text() => Some(PathBuf::from(format.file_name())),
                other => other,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, &body)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    tracing::info!(path = %path.display(), rows = table.len(), %format, "exported results");
                    println!("Exported {} row(s) to {}", table.len(), path.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&body)?;
                    if !body.ends_with(b"\n") {
                        stdout.write_all(b"\n")?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn open_store(config: &HubConfig) -> Result<ResultStore> {
    ResultStore::open(&config.storage)
        .with_context(|| format!("failed to open {}", config.storage.db_path.display()))
}

/// Logs go to stderr so stdout stays clean for tables and exports.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
