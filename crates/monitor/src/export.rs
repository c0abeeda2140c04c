#![forbid(unsafe_code)]

use crate::error::Error;
use crate::series::SeriesSet;
use crate::session::RecordingSession;
use chrono::{DateTime, Local};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const TIMESTAMP_HEADER: &str = "时间戳";
pub const RELATIVE_HEADER: &str = "相对时间(秒)";

/// Make an operation name safe to embed in a file name.
pub fn sanitize_operation_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| match c {
            c if c.is_whitespace() => '_',
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if sanitized.is_empty() {
        "unnamed".to_string()
    } else {
        sanitized
    }
}

/// `memory_change_<operation>_<YYYYMMDD_HHMMSS>.csv`
pub fn file_name(operation: &str, at: &DateTime<Local>) -> String {
    format!(
        "memory_change_{}_{}.csv",
        sanitize_operation_name(operation),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Write `capture` as CSV: one row per distinct timestamp, one column per
/// process holding the value of its nearest sample. Returns the number of
/// data rows.
pub fn write_csv<W: Write>(writer: W, capture: &SeriesSet) -> Result<usize, Error> {
    let origin = capture.earliest().ok_or(Error::ExportWithNoData)?;

    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    let mut header = vec![TIMESTAMP_HEADER.to_string(), RELATIVE_HEADER.to_string()];
    header.extend(
        capture
            .recorded()
            .map(|(pid, series)| format!("{}(pid={pid})", series.name())),
    );
    csv.write_record(&header)?;

    let rows = capture.merged_rows();
    for row in &rows {
        let mut record = Vec::with_capacity(row.values.len() + 2);
        record.push(row.timestamp);
        record.push(row.timestamp - origin);
        record.extend_from_slice(&row.values);
        csv.serialize(record)?;
    }
    csv.flush()?;
    Ok(rows.len())
}

/// Export a sealed session into `directory`. Returns the written path.
///
/// Nothing is written when the session holds no samples. On I/O failure the
/// session is untouched and the export can be retried.
pub fn export_session(
    session: &RecordingSession,
    directory: &Path,
    at: &DateTime<Local>,
) -> Result<PathBuf, Error> {
    let capture = session.capture().ok_or(Error::NoSealedSession)?;
    if capture.is_empty() {
        return Err(Error::ExportWithNoData);
    }

    let path = directory.join(file_name(session.name(), at));
    let result = File::create(&path)
        .map_err(Error::from)
        .and_then(|file| write_csv(BufWriter::new(file), capture));

    match result {
        Ok(rows) => {
            info!(path = %path.display(), rows, "recording exported");
            Ok(path)
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "export failed");
            Err(err)
        }
    }
}
