#![forbid(unsafe_code)]

mod process;
mod sample;

pub use process::{Liveness, Pid, ProcessRecord};
pub use sample::{BYTES_PER_MB, Sample, bytes_to_mb};
