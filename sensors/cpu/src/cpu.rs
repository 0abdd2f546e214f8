//! CPU accounting reader for procstat-rs.
//!
//! This module reads raw tick counters from `/proc/stat` and
//! `/proc/<pid>/stat` and asks the OS for the number of online cores.
//! Nothing is cached: every call opens, reads and closes its own file, so
//! a reader can be shared across threads freely.

use procstat_rs_core::{CoreTimes, CpuAccounting, CpuTimes, ProcConfig, ProcError, ProcessStat};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::parse;

/// Reader for kernel CPU accounting under a proc root.
///
/// The sentinel operations ([`read_cpu_tick`](Self::read_cpu_tick),
/// [`read_time_from_pid`](Self::read_time_from_pid),
/// [`read_stat_from_pid`](Self::read_stat_from_pid)) never fail; their
/// `Result` counterparts say why a read came back empty.
///
/// # Examples
///
/// ```rust,no_run
/// use procstat_rs_cpu::ProcStatReader;
///
/// let reader = ProcStatReader::new();
/// let ticks = reader.read_cpu_tick();
/// let cores = reader.num_cores();
/// println!("{ticks} ticks across {cores} cores");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStatReader {
    root: PathBuf,
}

impl Default for ProcStatReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcStatReader {
    /// Name of the system-wide statistics file under the root.
    const STAT_FILE: &'static str = "stat";

    /// Create a reader over the real `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(ProcConfig::DEFAULT_PROC_ROOT)
    }

    /// Create a reader over a different proc root (useful for testing).
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a reader from loaded configuration.
    pub fn from_config(config: &ProcConfig) -> Result<Self, ProcError> {
        config.validate()?;
        Ok(Self::with_root(config.proc_root.clone()))
    }

    /// The proc root this reader reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stat_path(&self) -> PathBuf {
        self.root.join(Self::STAT_FILE)
    }

    fn process_stat_path(&self, pid: i32) -> PathBuf {
        self.root.join(pid.to_string()).join(Self::STAT_FILE)
    }

    fn read_stat_file(&self) -> Result<String, ProcError> {
        let path = self.stat_path();
        fs::read_to_string(&path).map_err(|e| io_error(e, &path))
    }

    fn read_process_file(&self, pid: i32) -> Result<String, ProcError> {
        let path = self.process_stat_path(pid);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ProcError::ProcessNotFound { pid },
            // ESRCH: the process exited while its file was being read.
            _ if e.raw_os_error() == Some(libc::ESRCH) => ProcError::ProcessNotFound { pid },
            _ => io_error(e, &path),
        })?;
        // comm is arbitrary bytes; only the ASCII numeric fields are parsed.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Counters of the aggregate `cpu` line.
    pub fn cpu_times(&self) -> Result<CpuTimes, ProcError> {
        let content = self.read_stat_file()?;
        parse::parse_total_cpu(&content)
    }

    /// Total system CPU ticks, or 0 if `/proc/stat` is unreadable or has no
    /// aggregate line.
    ///
    /// A zero cannot be told apart from a failed read; use
    /// [`cpu_times`](Self::cpu_times) when that matters.
    #[must_use]
    pub fn read_cpu_tick(&self) -> u64 {
        match self.cpu_times() {
            Ok(times) => {
                let total = times.total();
                tracing::trace!(total, "read system cpu ticks");
                total
            }
            Err(e) => {
                tracing::debug!(
                    path = %self.stat_path().display(),
                    error = %e,
                    "cpu tick read failed"
                );
                0
            }
        }
    }

    /// Counters of every `cpuN` line, in file order.
    pub fn core_times(&self) -> Result<Vec<CoreTimes>, ProcError> {
        let content = self.read_stat_file()?;
        Ok(parse::parse_stat_file(&content)?.cores)
    }

    /// System boot time in seconds since the epoch (`btime`).
    pub fn boot_time(&self) -> Result<u64, ProcError> {
        let content = self.read_stat_file()?;
        parse::parse_stat_file(&content)?
            .boot_time
            .ok_or_else(|| ProcError::parse("No btime line in stat"))
    }

    /// utime + stime of `pid`.
    pub fn process_cpu_ticks(&self, pid: i32) -> Result<u64, ProcError> {
        let content = self.read_process_file(pid)?;
        parse::parse_process_cpu_ticks(&content)
    }

    /// utime + stime of `pid`, or 0 if the process is gone or its stat line
    /// is malformed.
    #[must_use]
    pub fn read_time_from_pid(&self, pid: i32) -> u64 {
        match self.process_cpu_ticks(pid) {
            Ok(ticks) => ticks,
            Err(e) => {
                tracing::debug!(pid, error = %e, "process tick read failed");
                0
            }
        }
    }

    /// Scheduling record of `pid`.
    pub fn process_stat(&self, pid: i32) -> Result<ProcessStat, ProcError> {
        let content = self.read_process_file(pid)?;
        parse::parse_process_stat(&content)
    }

    /// Scheduling record of `pid`, or `None` if the file is missing or does
    /// not carry every field through `starttime`.
    #[must_use]
    pub fn read_stat_from_pid(&self, pid: i32) -> Option<ProcessStat> {
        match self.process_stat(pid) {
            Ok(stat) => Some(stat),
            Err(e) => {
                tracing::debug!(pid, error = %e, "process stat read failed");
                None
            }
        }
    }

    /// Numeric entries of the proc root, ascending.
    pub fn pids(&self) -> Result<Vec<i32>, ProcError> {
        let entries = fs::read_dir(&self.root).map_err(|e| io_error(e, &self.root))?;

        let mut pids = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(|c: char| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(pid) = name.parse::<i32>() {
                pids.push(pid);
            }
        }

        pids.sort_unstable();
        Ok(pids)
    }

    /// Scheduling records for every process, skipping any that exit or turn
    /// out malformed mid-scan.
    pub fn process_stats(&self) -> Result<Vec<(i32, ProcessStat)>, ProcError> {
        let stats: Vec<_> = self
            .pids()?
            .into_iter()
            .filter_map(|pid| self.read_stat_from_pid(pid).map(|stat| (pid, stat)))
            .collect();
        tracing::trace!(count = stats.len(), "scanned processes");
        Ok(stats)
    }

    /// Number of logical processors currently online.
    ///
    /// Queried on every call so CPU hotplug is reflected; 0 means the OS
    /// could not say.
    #[must_use]
    pub fn num_cores(&self) -> u32 {
        sysconf_u32(libc::_SC_NPROCESSORS_ONLN)
    }

    /// Clock ticks per second (`USER_HZ`), 0 if unknown.
    #[must_use]
    pub fn clock_ticks_per_second(&self) -> u64 {
        u64::from(sysconf_u32(libc::_SC_CLK_TCK))
    }
}

/// `sysconf` with negative (error / indeterminate) results mapped to 0.
fn sysconf_u32(name: libc::c_int) -> u32 {
    // SAFETY: sysconf only reads system configuration and has no
    // preconditions on its argument.
    let value = unsafe { libc::sysconf(name) };
    u32::try_from(value).unwrap_or(0)
}

fn io_error(err: io::Error, path: &Path) -> ProcError {
    if err.kind() == io::ErrorKind::PermissionDenied {
        ProcError::permission_denied(path.display().to_string())
    } else {
        ProcError::Io(err)
    }
}

impl CpuAccounting for ProcStatReader {
    fn read_cpu_tick(&self) -> u64 {
        ProcStatReader::read_cpu_tick(self)
    }

    fn read_time_from_pid(&self, pid: i32) -> u64 {
        ProcStatReader::read_time_from_pid(self, pid)
    }

    fn read_stat_from_pid(&self, pid: i32) -> Option<ProcessStat> {
        ProcStatReader::read_stat_from_pid(self, pid)
    }

    fn num_cores(&self) -> u32 {
        ProcStatReader::num_cores(self)
    }

    fn name(&self) -> &str {
        "procstat"
    }

    fn check_availability(&self) -> Result<(), ProcError> {
        let path = self.stat_path();
        if !path.exists() {
            return Err(ProcError::unavailable(format!(
                "{} does not exist (not a Linux system?)",
                path.display()
            )));
        }

        self.cpu_times()?;
        Ok(())
    }
}
