//! # procstat-rs-core
//!
//! Core library for the procstat-rs readers providing the shared pieces used
//! by every `/proc` source: the CPU accounting data model, the
//! [`CpuAccounting`] trait, configuration and error types.
//!
//! ## Features
//!
//! - **Data model** - raw tick counters exactly as the kernel exposes them
//! - **Common reader trait** - a seam so callers can swap in a fake source
//! - **Configuration management** - RON-based configuration with validation
//! - **Error handling** - Comprehensive error types with context
//!
//! ## Quick Start
//!
//! ```rust
//! use procstat_rs_core::{CpuAccounting, ProcessStat};
//!
//! // A fixed source, handy in tests of code that samples CPU ticks
//! struct FixedSource;
//!
//! impl CpuAccounting for FixedSource {
//!     fn read_cpu_tick(&self) -> u64 {
//!         1000
//!     }
//!
//!     fn read_time_from_pid(&self, _pid: i32) -> u64 {
//!         125
//!     }
//!
//!     fn read_stat_from_pid(&self, _pid: i32) -> Option<ProcessStat> {
//!         None
//!     }
//!
//!     fn num_cores(&self) -> u32 {
//!         4
//!     }
//!
//!     fn name(&self) -> &str {
//!         "fixed"
//!     }
//! }
//!
//! assert_eq!(FixedSource.read_cpu_tick(), 1000);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Counters from the aggregate `cpu` line of `/proc/stat`.
///
/// All values are in clock ticks (`USER_HZ`). The kernel already folds
/// `guest` into `user` and `guest_nice` into `nice`; [`CpuTimes::total`]
/// still sums all ten fields so totals stay comparable between samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTimes {
    /// Time spent in user mode (normal processes)
    pub user: u64,
    /// Time spent in user mode with low priority (nice)
    pub nice: u64,
    /// Time spent in system mode (kernel)
    pub system: u64,
    /// Time spent idle
    pub idle: u64,
    /// Time waiting for I/O to complete
    pub iowait: u64,
    /// Time servicing hardware interrupts
    pub irq: u64,
    /// Time servicing software interrupts
    pub softirq: u64,
    /// Time stolen by virtualization
    pub steal: u64,
    /// Time spent running a virtual CPU for guests
    pub guest: u64,
    /// Time spent running a niced guest
    pub guest_nice: u64,
}

impl CpuTimes {
    /// Number of counters on a current kernel's `cpu` line.
    pub const FIELD_COUNT: usize = 10;

    /// Build from the leading counters of a `cpu` line; absent fields are 0.
    #[must_use]
    pub fn from_fields(fields: &[u64]) -> Self {
        let at = |idx: usize| fields.get(idx).copied().unwrap_or(0);
        Self {
            user: at(0),
            nice: at(1),
            system: at(2),
            idle: at(3),
            iowait: at(4),
            irq: at(5),
            softirq: at(6),
            steal: at(7),
            guest: at(8),
            guest_nice: at(9),
        }
    }

    /// Sum of all ten counters (the system CPU tick count).
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.user
            .saturating_add(self.nice)
            .saturating_add(self.system)
            .saturating_add(self.idle)
            .saturating_add(self.iowait)
            .saturating_add(self.irq)
            .saturating_add(self.softirq)
            .saturating_add(self.steal)
            .saturating_add(self.guest)
            .saturating_add(self.guest_nice)
    }
}

/// Counters for a single `cpuN` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreTimes {
    /// Core number (0-based)
    pub core_id: usize,
    /// Counters for this core
    pub times: CpuTimes,
}

/// Scheduling and accounting data for one process, taken from
/// `/proc/<pid>/stat`.
///
/// The [`Default`] value is the zeroed record returned alongside a failed
/// read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStat {
    /// Parent process id (field 4)
    pub parent_pid: i32,
    /// Process group id (field 5)
    pub process_group: i32,
    /// utime + stime in clock ticks (fields 14 and 15)
    pub cpu_ticks: u64,
    /// Nice value, -20..=19 (field 19)
    pub nice: i32,
    /// Number of threads (field 20)
    pub thread_count: i32,
    /// Start time in clock ticks since boot (field 22)
    pub start_time: u64,
}

/// Read-only access to kernel CPU accounting.
///
/// Every method is a single synchronous snapshot. Failures collapse to a
/// sentinel (`0` or `None`): a process exiting between lookup and read is
/// normal, not exceptional.
pub trait CpuAccounting {
    /// Total system CPU ticks, or 0 if the source is unreadable.
    fn read_cpu_tick(&self) -> u64;

    /// utime + stime of `pid`, or 0 if the process is gone or malformed.
    fn read_time_from_pid(&self, pid: i32) -> u64;

    /// Scheduling record of `pid`, or `None` if it could not be read.
    fn read_stat_from_pid(&self, pid: i32) -> Option<ProcessStat>;

    /// Online logical processors, 0 when the OS cannot tell.
    fn num_cores(&self) -> u32;

    /// Get the unique name/identifier for this source.
    fn name(&self) -> &str;

    /// Check if the source is available on this system.
    ///
    /// Default implementation returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is not available or supported.
    fn check_availability(&self) -> Result<(), ProcError> {
        Ok(())
    }
}

/// Reader configuration loaded from ~/.config/procstat-rs/config.ron
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProcConfig {
    /// Mount point of the proc filesystem
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
}

fn default_proc_root() -> PathBuf {
    PathBuf::from(ProcConfig::DEFAULT_PROC_ROOT)
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self {
            proc_root: default_proc_root(),
        }
    }
}

impl ProcConfig {
    /// Where Linux mounts procfs.
    pub const DEFAULT_PROC_ROOT: &'static str = "/proc";

    /// Environment variable overriding [`ProcConfig::proc_root`].
    pub const PROC_ROOT_ENV: &'static str = "PROCSTAT_PROC_ROOT";

    /// Load configuration from the standard config file location.
    ///
    /// Searches for config in:
    /// 1. ~/.config/procstat-rs/config.ron
    /// 2. ~/.procstat-rs/config.ron (fallback)
    ///
    /// Returns default config if no file is found. `PROCSTAT_PROC_ROOT`
    /// wins over whatever the file says.
    pub fn load() -> Result<Self, ProcError> {
        let config = match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::default(),
        };
        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ProcError> {
        let content = std::fs::read_to_string(path)?;

        let config: ProcConfig = ron::from_str(&content).map_err(|e| {
            ProcError::parse_with_source(
                format!("Failed to parse config file {}", path.display()),
                e,
            )
        })?;

        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Find the config file in standard locations.
    pub fn find_config_file() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_path = config_dir.join("procstat-rs").join("config.ron");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".procstat-rs").join("config.ron");
            if home_path.exists() {
                return Some(home_path);
            }
        }

        None
    }

    /// Get the default config file path for writing.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("procstat-rs").join("config.ron"))
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ProcError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| ProcError::parse_with_source("Failed to serialize config", e))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Write a commented example config to `path`.
    pub fn save_example_config_to_file(path: &Path) -> Result<(), ProcError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let template = format!(
            "// procstat-rs configuration\n\
             //\n\
             // proc_root: where procfs is mounted. Point it at a copy of /proc\n\
             // (or a container's /proc) to read another namespace.\n\
             // The {} environment variable overrides this value.\n\
             (\n    proc_root: \"{}\",\n)\n",
            Self::PROC_ROOT_ENV,
            Self::DEFAULT_PROC_ROOT,
        );

        std::fs::write(path, template)?;
        Ok(())
    }

    /// Use a different proc root.
    #[must_use]
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    /// Apply `PROCSTAT_PROC_ROOT` if it is set and non-empty.
    #[must_use]
    pub fn apply_env_overrides(self) -> Self {
        match std::env::var_os(Self::PROC_ROOT_ENV) {
            Some(root) if !root.is_empty() => self.with_proc_root(root),
            _ => self,
        }
    }

    /// Reject configurations no reader could use.
    pub fn validate(&self) -> Result<(), ProcError> {
        if self.proc_root.as_os_str().is_empty() {
            return Err(ProcError::config("proc_root must not be empty"));
        }
        if self.proc_root.is_relative() {
            return Err(ProcError::config_with_value(
                "proc_root must be an absolute path",
                self.proc_root.display().to_string(),
            ));
        }
        Ok(())
    }
}

/// Utility functions for turning raw counters into display values.
pub mod format {
    /// Convert clock ticks to seconds; 0 when `ticks_per_second` is unknown.
    #[must_use]
    pub fn ticks_to_seconds(ticks: u64, ticks_per_second: u64) -> f64 {
        if ticks_per_second == 0 {
            0.0
        } else {
            ticks as f64 / ticks_per_second as f64
        }
    }

    /// Format an uptime as `"D days, HH:MM:SS"`.
    #[must_use]
    pub fn uptime_to_human(seconds: u64) -> String {
        let days = seconds / 86_400;
        let hours = (seconds / 3_600) % 24;
        let minutes = (seconds / 60) % 60;
        let secs = seconds % 60;
        format!("{days} days, {hours:02}:{minutes:02}:{secs:02}")
    }
}

/// Common error types for `/proc` reads.
#[derive(Debug, thiserror::Error)]
pub enum ProcError {
    /// I/O error occurred while reading a source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing a kernel text source.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what failed to parse
        message: String,
        /// Optional source error for chaining
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error (invalid settings, etc.).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration issue
        message: String,
        /// The invalid configuration value if applicable
        value: Option<String>,
    },

    /// Source is not available on this system.
    #[error("Source unavailable: {reason}")]
    Unavailable {
        /// Reason why the source is unavailable
        reason: String,
    },

    /// Permission denied accessing a source.
    #[error("Permission denied: {resource}")]
    PermissionDenied {
        /// The resource that couldn't be accessed
        resource: String,
    },

    /// The process has no entry under the proc root (never existed or reaped).
    #[error("Process {pid} not found")]
    ProcessNotFound {
        /// The pid that was looked up
        pid: i32,
    },
}

impl ProcError {
    /// Create a new parse error with a simple message.
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new parse error with a source error.
    pub fn parse_with_source<S: Into<String>, E>(message: S, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Parse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            value: None,
        }
    }

    /// Create a new configuration error with the invalid value.
    pub fn config_with_value<S: Into<String>, V: Into<String>>(message: S, value: V) -> Self {
        Self::Config {
            message: message.into(),
            value: Some(value.into()),
        }
    }

    /// Create a new unavailable error.
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a new permission denied error.
    pub fn permission_denied<S: Into<String>>(resource: S) -> Self {
        Self::PermissionDenied {
            resource: resource.into(),
        }
    }

    /// Whether the error means "nothing there" rather than "something broke".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::ProcessNotFound { .. } => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
