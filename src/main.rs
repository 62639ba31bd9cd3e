use anyhow::{Context, Result};
use clap::Parser;
use cronometro::cli::{Cli, OutputFormat};
use cronometro::collector::Collector;
use cronometro::config::CollectorConfig;
use cronometro::event::TimingEvent;
use cronometro::management::{ManagementInterface, WindowBounds};
use cronometro::notification::Notification;
use cronometro::report::WindowReport;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Merge the config file (if any) with command-line overrides
fn build_config(args: &Cli) -> Result<CollectorConfig> {
    let mut config = match &args.config {
        Some(path) => CollectorConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CollectorConfig::default(),
    };

    if let Some(slice_ms) = args.slice_ms {
        config.slice_length_ms = slice_ms;
    }
    if !args.expose.is_empty() {
        config.tag_names_to_expose = args.expose.clone();
    }
    if let Some(expr) = &args.thresholds {
        config.notification_thresholds = expr.clone();
    }
    if args.rollup {
        config.create_rollup_statistics = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn open_input(args: &Cli) -> Result<Box<dyn BufRead>> {
    if args.reads_stdin() {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }
    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;
    Ok(Box::new(BufReader::new(file)))
}

fn print_notification(notification: &Notification) {
    eprintln!(
        "{} #{} {}",
        notification.notification_type, notification.sequence, notification.message
    );
}

fn write_report<W: Write>(
    out: &mut W,
    format: OutputFormat,
    statistics: Vec<cronometro::management::TagStatistics>,
) -> Result<()> {
    let Some(report) = WindowReport::new(statistics) else {
        return Ok(());
    };
    match format {
        OutputFormat::Text => report.write_text(out)?,
        OutputFormat::Json => report.write_json(out)?,
    }
    Ok(())
}

struct ReplaySummary {
    events: u64,
    skipped: u64,
    windows: u64,
}

fn replay<W: Write>(
    input: Box<dyn BufRead>,
    collector: &Collector,
    mgmt: &ManagementInterface,
    expose_all: bool,
    format: OutputFormat,
    out: &mut W,
) -> Result<ReplaySummary> {
    let mut summary = ReplaySummary {
        events: 0,
        skipped: 0,
        windows: 0,
    };
    let mut current: Option<WindowBounds> = None;

    for line in input.lines() {
        let line = line.context("Failed to read input")?;
        let event = match TimingEvent::parse_line(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("{}", e);
                summary.skipped += 1;
                continue;
            }
        };

        if expose_all {
            if let Err(e) = mgmt.expose_tag(&event.tag) {
                tracing::warn!("{}", e);
            }
        }
        collector.submit_event(event);
        summary.events += 1;

        let window = mgmt.window();
        if current.is_some_and(|w| w != window) {
            if let Some(retired) = mgmt.retired_snapshot() {
                write_report(out, format, retired)?;
                summary.windows += 1;
            }
        }
        current = Some(window);
    }

    if current.is_some() {
        write_report(out, format, mgmt.snapshot())?;
        summary.windows += 1;
    }
    out.flush()?;
    Ok(summary)
}

fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing(args.debug);

    let config = build_config(&args)?;
    let expose_all = config.tag_names_to_expose.is_empty();
    let collector = Collector::new(config).context("Failed to start collector")?;
    let mgmt = collector.management();
    collector.subscribe(print_notification);

    let input = open_input(&args)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = replay(input, &collector, &mgmt, expose_all, args.format, &mut out)?;

    // Drains queued notifications before exit
    collector.shutdown();

    tracing::info!(
        events = summary.events,
        skipped = summary.skipped,
        windows = summary.windows,
        "replay finished"
    );
    Ok(())
}
