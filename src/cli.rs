//! CLI argument parsing for cronometro

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for window reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table per window (default)
    Text,
    /// One JSON object per window
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "cronometro")]
#[command(version)]
#[command(about = "Replay stopwatch logs into windowed timing statistics", long_about = None)]
pub struct Cli {
    /// Log file containing stopwatch lines, or - for stdin
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// TOML collector configuration; flags below override it
    #[arg(short, long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Window length in milliseconds
    #[arg(short = 's', long = "slice-ms", value_name = "MS")]
    pub slice_ms: Option<u64>,

    /// Tags to expose (comma-separated); every tag seen is exposed when empty
    #[arg(short, long, value_name = "TAGS", value_delimiter = ',')]
    pub expose: Vec<String>,

    /// Threshold expression, e.g. "db(<200),httpTPS(>1)"
    #[arg(short, long, value_name = "EXPR")]
    pub thresholds: Option<String>,

    /// Roll dotted tags up into their exposed parents
    #[arg(long)]
    pub rollup: bool,

    /// Output format (text or json)
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Enable debug tracing output to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Whether to read events from stdin
    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == "-"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_file() {
        let cli = Cli::parse_from(["cronometro", "perf.log"]);
        assert_eq!(cli.input, PathBuf::from("perf.log"));
        assert!(!cli.reads_stdin());
        assert!(cli.config.is_none());
        assert!(cli.slice_ms.is_none());
        assert!(cli.expose.is_empty());
        assert!(!cli.rollup);
        assert!(!cli.debug);
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_stdin() {
        let cli = Cli::parse_from(["cronometro", "-"]);
        assert!(cli.reads_stdin());
    }

    #[test]
    fn test_cli_expose_list() {
        let cli = Cli::parse_from(["cronometro", "--expose", "a,b.c,d", "x.log"]);
        assert_eq!(cli.expose, vec!["a", "b.c", "d"]);
    }

    #[test]
    fn test_cli_all_options() {
        let cli = Cli::parse_from([
            "cronometro",
            "--config",
            "c.toml",
            "--slice-ms",
            "30000",
            "--thresholds",
            "a(<10)",
            "--rollup",
            "--format",
            "json",
            "--debug",
            "x.log",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        assert_eq!(cli.slice_ms, Some(30_000));
        assert_eq!(cli.thresholds.as_deref(), Some("a(<10)"));
        assert!(cli.rollup);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.debug);
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["cronometro"]).is_err());
    }

    #[test]
    fn test_cli_rejects_bad_format() {
        assert!(Cli::try_parse_from(["cronometro", "--format", "csv", "x.log"]).is_err());
    }
}
