#![forbid(unsafe_code)]

use crate::domain::Pid;

/// Errors surfaced by the monitor. Everything here is local and recoverable:
/// the front-ends turn these into notices and keep running.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("select at least one running process first")]
    EmptySelection,

    #[error("enter an operation name before recording")]
    MissingOperationName,

    #[error("no recording in progress")]
    NotRecording,

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("all monitored processes have ended")]
    AllSelectedProcessesTerminated,

    #[error("process {0} is not in the process table")]
    UnknownProcess(Pid),

    #[error("stop a recording before exporting it")]
    NoSealedSession,

    #[error("nothing recorded to export")]
    ExportWithNoData,

    #[error("failed to write export file: {0}")]
    ExportIo(#[from] std::io::Error),

    #[error("failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read procfs info: {0}")]
    Procfs(#[from] procfs::ProcError),

    #[error("failed to load config: {0}")]
    Config(#[from] config::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
