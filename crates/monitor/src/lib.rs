#![forbid(unsafe_code)]

pub mod chart;
pub mod clock;
pub mod controller;
pub mod domain;
pub mod error;
pub mod export;
pub mod inspect;
pub mod registry;
pub mod runtime;
pub mod sampler;
pub mod selection;
pub mod series;
pub mod session;
pub mod worker;

pub use chart::{ChartLine, ChartModel, LineKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Controller, Notice, NoticeLevel, SelectedProcess};
pub use domain::{Liveness, Pid, ProcessRecord, Sample};
pub use error::Error;
pub use inspect::{InspectError, ProcessEntry, ProcessInspector, ProcfsInspector};
pub use registry::{ProcessRegistry, RegistrySnapshot, ScanFilter};
pub use runtime::{Command, Monitor};
pub use sampler::{Sampler, TickOutcome, TickReadings};
pub use selection::Selection;
pub use series::{MergedRow, Series, SeriesSet};
pub use session::{ProcessStats, RecordingSession, SessionState, SessionStats};
pub use worker::{MonitorEvent, SampleTargets};
