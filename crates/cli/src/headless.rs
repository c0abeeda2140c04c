#![forbid(unsafe_code)]

use crate::cli::{ListArgs, RecordArgs};
use anyhow::Context;
use chrono::{DateTime, Local};
use config::{Config, MemoryMetric};
use monitor::clock::to_local;
use monitor::{Command, Error, Monitor, ProcessRecord, SessionStats};
use std::io::{self, Write};
use std::time::Duration;
use tracing::{info, warn};

/// `memtrack list`
pub async fn list(mut config: Config, args: &ListArgs) -> anyhow::Result<()> {
    if let Some(metric) = args.metric {
        config.sampling.metric = metric;
    }
    let metric = config.sampling.metric;

    let mut monitor = Monitor::system(config);
    monitor.refresh_now().await?;
    let keyword = args.filter.as_deref().unwrap_or_default();
    let records = monitor.controller().registry().filter(keyword);

    let mut out = io::stdout().lock();
    write_process_table(&mut out, &records, metric)?;
    monitor.shutdown().await?;
    Ok(())
}

/// `memtrack record`
pub async fn record(mut config: Config, args: &RecordArgs) -> anyhow::Result<()> {
    if let Some(metric) = args.metric {
        config.sampling.metric = metric;
    }
    if let Some(interval) = args.interval_ms.filter(|ms| *ms > 0) {
        config.sampling.interval_ms = Duration::from_millis(interval);
    }
    if let Some(dir) = &args.export_dir {
        config.export.directory = dir.clone();
    }

    let mut monitor = Monitor::system(config);
    monitor.refresh_now().await?;
    for pid in &args.pids {
        monitor
            .dispatch(Command::ToggleSelect(*pid))
            .await
            .with_context(|| format!("cannot record process {pid}"))?;
    }
    monitor
        .dispatch(Command::StartRecording(args.name.clone()))
        .await?;
    info!(pids = ?args.pids, duration = ?args.duration, "recording");

    let deadline = tokio::time::sleep(args.duration);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(deadline, ctrl_c);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = &mut ctrl_c => {
                info!("interrupted, stopping the recording early");
                break;
            }
            _ = monitor.next_event() => {
                if !monitor.controller().sampler().is_enabled() {
                    warn!("every recorded process has ended");
                    break;
                }
            }
        }
    }

    monitor.dispatch(Command::StopRecording).await?;
    let session = monitor.controller().session();
    if let Some(stats) = session.stats() {
        let started = session.start_time().map(to_local);
        let mut out = io::stdout().lock();
        write_stats(&mut out, session.name(), started, stats)?;
    }

    match monitor.dispatch(Command::Export).await {
        Ok(()) => {
            if let Some(path) = monitor.controller().last_export() {
                writeln!(io::stdout().lock(), "exported to {}", path.display())?;
            }
        }
        Err(Error::ExportWithNoData) => {
            writeln!(io::stdout().lock(), "nothing recorded, no file written")?;
        }
        Err(err) => return Err(err.into()),
    }

    monitor.shutdown().await?;
    Ok(())
}

pub fn write_process_table<W: Write>(
    out: &mut W,
    records: &[&ProcessRecord],
    metric: MemoryMetric,
) -> io::Result<()> {
    let memory = format!("{} MB", metric.as_str().to_uppercase());
    writeln!(out, "{:>8}  {:>8}  {:>12}  NAME", "PID", "PPID", memory)?;
    for record in records {
        writeln!(
            out,
            "{:>8}  {:>8}  {:>12.2}  {}",
            record.pid, record.parent_pid, record.memory_mb, record.name
        )?;
    }
    Ok(())
}

pub fn write_stats<W: Write>(
    out: &mut W,
    name: &str,
    started: Option<DateTime<Local>>,
    stats: &SessionStats,
) -> io::Result<()> {
    match started {
        Some(at) => writeln!(out, "operation: {name} (started {})", at.format("%H:%M:%S"))?,
        None => writeln!(out, "operation: {name}")?,
    }
    writeln!(out, "duration: {:.2} s", stats.duration_secs)?;
    writeln!(out, "start total: {:.2} MB", stats.start_total_mb)?;
    writeln!(out, "end total: {:.2} MB", stats.end_total_mb)?;
    writeln!(out, "change: {:+.2} MB", stats.change_mb)?;
    writeln!(out, "max change: {:+.2} MB", stats.max_change_mb)?;
    for process in &stats.processes {
        writeln!(
            out,
            "  {} (pid {}): {:.2} -> {:.2} MB, change {:+.2}, max {:.2}, min {:.2}, {} samples",
            process.name,
            process.pid,
            process.first_mb,
            process.last_mb,
            process.change_mb(),
            process.max_mb,
            process.min_mb,
            process.samples
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor::{Liveness, ProcessStats};

    #[test]
    fn table_has_header_and_rows() {
        let record = ProcessRecord {
            pid: 42,
            name: "editor".to_string(),
            parent_pid: 1,
            memory_mb: 12.345,
            liveness: Liveness::Running,
            refreshed_at: 0.0,
        };
        let mut out = Vec::new();
        write_process_table(&mut out, &[&record], MemoryMetric::Unique).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("USS MB"));
        assert!(lines[1].contains("12.35"));
        assert!(lines[1].ends_with("editor"));
    }

    #[test]
    fn stats_show_two_decimal_duration() {
        let stats = SessionStats {
            start_total_mb: 10.0,
            end_total_mb: 15.0,
            change_mb: 5.0,
            max_change_mb: 20.0,
            duration_secs: 1.234,
            processes: vec![ProcessStats {
                pid: 7,
                name: "app".to_string(),
                first_mb: 10.0,
                last_mb: 15.0,
                max_mb: 30.0,
                min_mb: 10.0,
                samples: 3,
            }],
        };
        let mut out = Vec::new();
        write_stats(&mut out, "open", None, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("duration: 1.23 s"));
        assert!(text.contains("change: +5.00 MB"));
        assert!(text.contains("max change: +20.00 MB"));
        assert!(text.contains("app (pid 7)"));
    }
}
