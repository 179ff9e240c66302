//! The `logdash` command line.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use logdash_core::config::{self, Config};
use logdash_core::context::DateRange;
use tracing::{debug, warn};

use crate::dashboard::Dashboard;
use crate::enrich::BatchOutcome;
use crate::event::{ChannelEventSink, NullEventSink, ViewEventKind, ViewEventSink};
use crate::http::{HttpBackend, IpApiLocator};
use crate::logging;
use crate::report;
use crate::service::{DashboardBackend, GeoLocator};

#[derive(Debug, Parser)]
#[command(name = "logdash", version, about = "Terminal client for the access-log dashboard")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/logdash/config.yaml).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Dashboard backend base URL.
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Skip geolocation lookups.
    #[arg(long, global = true)]
    no_geo: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze a log source and print the report.
    Analyze(AnalyzeArgs),
    /// Follow a log source and print new lines until interrupted.
    Tail(TailArgs),
    /// List the requests made by one client.
    History(HistoryArgs),
    /// List a directory on the backend host.
    Browse(BrowseArgs),
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Log file path on the backend host.
    source: String,
    /// Exclude known bots and crawlers.
    #[arg(long)]
    exclude_bots: bool,
    /// First day to include (YYYY-MM-DD).
    #[arg(long)]
    from: Option<String>,
    /// Last day to include (YYYY-MM-DD).
    #[arg(long)]
    to: Option<String>,
    /// Resolve names and regions for the ranked clients.
    #[arg(long)]
    resolve: bool,
    /// Rows per ranked table.
    #[arg(long, default_value_t = 10)]
    top: usize,
    /// Print the raw summary as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct TailArgs {
    source: String,
    /// Exclude bots from the refreshed totals.
    #[arg(long)]
    exclude_bots: bool,
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    seconds: Option<u64>,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    source: String,
    client: String,
}

#[derive(Debug, Args)]
struct BrowseArgs {
    path: Option<String>,
}

/// Test-only command output.
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    run(&args, &mut stdout, &mut stderr)
}

/// Parse `args`, load configuration and talk to the configured backend.
pub fn run(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let cli = match parse(args, stdout, stderr) {
        Ok(cli) => cli,
        Err(code) => return code,
    };
    let config = match load(&cli) {
        Ok(config) => config,
        Err(message) => {
            let _ = writeln!(stderr, "error: {message}");
            return 1;
        }
    };
    if let Err(message) = logging::init_logging(&config.logging) {
        let _ = writeln!(stderr, "warning: logging disabled: {message}");
    }

    let backend: Arc<dyn DashboardBackend> = match HttpBackend::new(&config.backend) {
        Ok(backend) => Arc::new(backend),
        Err(err) => {
            let _ = writeln!(stderr, "error: {err}");
            return 1;
        }
    };
    let geo: Option<Arc<dyn GeoLocator>> = if config.geolocation.enabled && !cli.no_geo {
        match IpApiLocator::new(&config.geolocation) {
            Ok(locator) => Some(Arc::new(locator)),
            Err(err) => {
                warn!(error = %err, "geolocation unavailable");
                None
            }
        }
    } else {
        None
    };

    execute(cli, &config, backend, geo, stdout, stderr)
}

/// Run against the given services with `config` as-is.
pub fn run_with_services(
    args: &[String],
    config: &Config,
    backend: Arc<dyn DashboardBackend>,
    geo: Option<Arc<dyn GeoLocator>>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match parse(args, stdout, stderr) {
        Ok(cli) => execute(cli, config, backend, geo, stdout, stderr),
        Err(code) => code,
    }
}

pub fn run_for_test(
    args: &[&str],
    config: &Config,
    backend: Arc<dyn DashboardBackend>,
    geo: Option<Arc<dyn GeoLocator>>,
) -> CommandOutput {
    let owned_args: Vec<String> = std::iter::once("logdash")
        .chain(args.iter().copied())
        .map(str::to_string)
        .collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = run_with_services(&owned_args, config, backend, geo, &mut stdout, &mut stderr);
    CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    }
}

fn parse(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> Result<Cli, i32> {
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(cli),
        Err(err) if err.use_stderr() => {
            let _ = write!(stderr, "{err}");
            Err(2)
        }
        Err(err) => {
            // --help and --version
            let _ = write!(stdout, "{err}");
            Err(0)
        }
    }
}

fn load(cli: &Cli) -> Result<Config, String> {
    let (mut config, path) = config::load_config(cli.config.as_deref())?;
    if let Some(url) = &cli.backend_url {
        config.backend.base_url = url.trim_end_matches('/').to_string();
    }
    config.validate()?;
    debug!(path = ?path, "configuration loaded");
    Ok(config)
}

fn execute(
    cli: Cli,
    config: &Config,
    backend: Arc<dyn DashboardBackend>,
    geo: Option<Arc<dyn GeoLocator>>,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = writeln!(stderr, "error: failed to start runtime: {err}");
            return 1;
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Command::Analyze(args) => analyze(args, config, backend, geo, stdout).await,
            Command::Tail(args) => tail(args, config, backend, stdout).await,
            Command::History(args) => history(args, config, backend, stdout).await,
            Command::Browse(args) => browse(args, config, backend, stdout).await,
        }
    });
    match result {
        Ok(()) => 0,
        Err(message) => {
            let _ = writeln!(stderr, "error: {message}");
            1
        }
    }
}

fn parse_date(value: Option<&str>, flag: &str) -> Result<Option<NaiveDate>, String> {
    value
        .map(|v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d")
                .map_err(|e| format!("invalid {flag} date {v:?}: {e}"))
        })
        .transpose()
}

fn quiet() -> Arc<dyn ViewEventSink> {
    Arc::new(NullEventSink)
}

async fn analyze(
    args: AnalyzeArgs,
    config: &Config,
    backend: Arc<dyn DashboardBackend>,
    geo: Option<Arc<dyn GeoLocator>>,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let date_range = DateRange::new(
        parse_date(args.from.as_deref(), "--from")?,
        parse_date(args.to.as_deref(), "--to")?,
    )?;
    let dashboard = Dashboard::new(config, backend, geo, quiet());
    dashboard.select_source(args.source);
    dashboard.set_filter_bots(args.exclude_bots || config.analysis.filter_bots);
    dashboard.set_date_range(date_range);

    dashboard.analyze().await.map_err(|e| e.to_string())?;
    if args.resolve {
        let batch = dashboard.resolve_all().await.map_err(|e| e.to_string())?;
        if batch.outcome != BatchOutcome::Completed {
            warn!(outcome = ?batch.outcome, "client resolution incomplete");
        }
    }
    let view = dashboard.view().await.map_err(|e| e.to_string())?;

    if args.json {
        if let Some(summary) = &view.summary {
            serde_json::to_writer_pretty(&mut *stdout, summary.as_ref())
                .map_err(|e| e.to_string())?;
            writeln!(stdout).map_err(|e| e.to_string())?;
        }
        return Ok(());
    }
    report::write_report(&view, args.top, stdout)
}

async fn tail(
    args: TailArgs,
    config: &Config,
    backend: Arc<dyn DashboardBackend>,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let (sink, mut events) = ChannelEventSink::channel();
    let dashboard = Dashboard::new(config, backend, None, Arc::new(sink));
    dashboard.select_source(args.source);
    dashboard.set_filter_bots(args.exclude_bots || config.analysis.filter_bots);
    dashboard.start_tailing().await.map_err(|e| e.to_string())?;

    let deadline = async {
        match args.seconds {
            Some(seconds) => tokio::time::sleep(Duration::from_secs(seconds)).await,
            None => {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    warn!(error = %err, "could not listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                match event.kind {
                    ViewEventKind::TailAppended { lines } => {
                        for line in &lines {
                            writeln!(stdout, "{}", report::format_tail_line(line))
                                .map_err(|e| e.to_string())?;
                        }
                        stdout.flush().map_err(|e| e.to_string())?;
                    }
                    ViewEventKind::SnapshotReplaced { total_requests, .. } => {
                        debug!(total_requests, "totals refreshed");
                    }
                    _ => {}
                }
            }
        }
    }

    dashboard.shutdown().await.map_err(|e| e.to_string())
}

async fn history(
    args: HistoryArgs,
    config: &Config,
    backend: Arc<dyn DashboardBackend>,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let dashboard = Dashboard::new(config, backend, None, quiet());
    dashboard.select_source(args.source);
    let entries = dashboard
        .client_history(&args.client)
        .await
        .map_err(|e| e.to_string())?;
    report::write_history(&args.client, &entries, stdout)
}

async fn browse(
    args: BrowseArgs,
    config: &Config,
    backend: Arc<dyn DashboardBackend>,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let dashboard = Dashboard::new(config, backend, None, quiet());
    let listing = dashboard
        .browse(args.path.as_deref())
        .await
        .map_err(|e| e.to_string())?;
    report::write_listing(&listing, stdout)
}
