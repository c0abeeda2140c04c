use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use config::MemoryMetric;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// memtrack: per-process memory sampler and operation recorder
///
/// memtrack samples the memory of selected processes at a fixed interval,
/// records the change across a named user operation, and exports the
/// recording as CSV.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/memtrack/config.toml` and `/etc/memtrack/config.d/*.toml`,
    /// where the latter being a glob pattern. If they don't exist, the default
    /// configuration is used.
    #[arg(short, long, value_parser = validate_file)]
    pub config: Option<PathBuf>,

    /// Path to log file.
    ///
    /// Without it, the interactive front-end does not log at all and the
    /// other subcommands log to stderr.
    #[arg(short, long)]
    pub logfile: Option<PathBuf>,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Whether the terminal is taken over by the interactive front-end.
    pub fn is_interactive(&self) -> bool {
        matches!(self.command, None | Some(Commands::Tui))
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Commands {
    /// Interactive front-end (default).
    Tui,
    /// Print the process table.
    List(ListArgs),
    /// Record the given processes for a fixed time and export the result.
    Record(RecordArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    /// Only show processes whose pid or name contains this keyword.
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Memory metric to read: rss, vms or uss.
    #[arg(short, long, value_parser = parse_metric)]
    pub metric: Option<MemoryMetric>,
}

#[derive(Debug, Args, Clone)]
pub struct RecordArgs {
    /// Process to record. Repeat for several processes.
    #[arg(short, long = "pid", required = true, num_args = 1..)]
    pub pids: Vec<u32>,

    /// Operation name, used in the export file name.
    #[arg(short, long)]
    pub name: String,

    /// How long to record, in seconds.
    #[arg(short, long, value_parser = validate_duration)]
    pub duration: Duration,

    /// Memory metric to read: rss, vms or uss.
    #[arg(short, long, value_parser = parse_metric)]
    pub metric: Option<MemoryMetric>,

    /// Sampling interval in milliseconds.
    #[arg(short, long)]
    pub interval_ms: Option<u64>,

    /// Directory the CSV file is written to.
    #[arg(short, long)]
    pub export_dir: Option<PathBuf>,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

#[inline(always)]
fn parse_metric(metric: &str) -> Result<MemoryMetric, String> {
    metric.parse().map_err(|err: config::Error| err.to_string())
}

/// Validate a recording duration given in (possibly fractional) seconds.
#[inline(always)]
fn validate_duration(secs: &str) -> Result<Duration, String> {
    let secs: f64 = secs
        .parse()
        .map_err(|_| format!("`{secs}` is not a valid number of seconds"))?;
    let valid = secs.is_finite() && secs > 0.0 && secs <= 86_400.0;
    match valid.then(|| Duration::from_secs_f64(secs)) {
        Some(duration) if !duration.is_zero() => Ok(duration),
        _ => Err("Duration must be between 0 and 86400 seconds".to_string()),
    }
}
