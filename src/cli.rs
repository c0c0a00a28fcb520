//! Command-line interface definitions.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Watches a configuration file and logs every applied change.
#[derive(Parser, Debug)]
#[command(name = "dynconf", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.json", env = "DYNCONF_PATH")]
    pub config: PathBuf,

    /// Format of the configuration file.
    #[arg(short, long, value_enum, default_value_t = Format::Json)]
    pub format: Format,

    /// How changes are picked up.
    #[arg(short, long, value_enum, default_value_t = Mode::Push)]
    pub mode: Mode,

    /// Poll interval in milliseconds (poll mode only).
    #[arg(long, default_value_t = 1000, env = "DYNCONF_POLL_INTERVAL_MS")]
    pub poll_interval_ms: u64,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "DYNCONF_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Emit logs as JSON.
    #[arg(long, default_value = "false")]
    pub json_logs: bool,

    /// Increase logging verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Supported configuration file formats.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

/// Refresh strategy for the file source.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Watch the file and react to filesystem events.
    Push,
    /// Re-read the file on a timer.
    Poll,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["dynconf"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert_eq!(cli.format, Format::Json);
        assert_eq!(cli.mode, Mode::Push);
        assert_eq!(cli.poll_interval_ms, 1000);
        assert_eq!(cli.log_level(), "info");
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "dynconf", "-c", "/etc/app.yaml", "-f", "yaml", "-m", "poll", "--poll-interval-ms", "250", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("/etc/app.yaml"));
        assert_eq!(cli.format, Format::Yaml);
        assert_eq!(cli.mode, Mode::Poll);
        assert_eq!(cli.poll_interval_ms, 250);
        assert_eq!(cli.log_level(), "trace");
    }
}
