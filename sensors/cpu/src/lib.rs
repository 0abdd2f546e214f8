//! CPU accounting for procstat-rs.
//!
//! This crate reads raw CPU tick counters from `/proc/stat` and
//! `/proc/<pid>/stat`, plus the number of online cores, so a monitoring
//! component can compute utilization by sampling twice and dividing by
//! elapsed time and core count.
//!
//! # Examples
//!
//! ```rust,no_run
//! use procstat_rs_cpu::ProcStatReader;
//!
//! let reader = ProcStatReader::new();
//!
//! let ticks = reader.read_cpu_tick();
//! if let Some(stat) = reader.read_stat_from_pid(1) {
//!     println!("init: {} ticks of {ticks}", stat.cpu_ticks);
//! }
//! ```

pub mod cpu;
pub mod parse;

pub use cpu::ProcStatReader;
pub use procstat_rs_core::{
    CoreTimes, CpuAccounting, CpuTimes, ProcConfig, ProcError, ProcessStat,
};
