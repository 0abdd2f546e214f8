//! procstat-rs-cpu: one-shot dump of raw CPU accounting.
//!
//! Prints a single JSON document with the system tick counters, online core
//! count and, on request, per-core and per-process records. Rates are left
//! to the caller, which samples twice and divides.

use anyhow::{Context, Result};
use clap::Parser;
use procstat_rs_core::{format, CoreTimes, CpuAccounting, CpuTimes, ProcConfig, ProcessStat};
use procstat_rs_cpu::ProcStatReader;
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the CPU accounting dump.
#[derive(Parser)]
#[command(name = "procstat-rs-cpu")]
#[command(about = "Raw CPU tick counters from /proc")]
#[command(version)]
#[command(author)]
struct Args {
    /// Include the scheduling record of this pid (repeatable)
    #[arg(short, long = "pid", value_name = "PID")]
    pids: Vec<i32>,

    /// Include every process under the proc root
    #[arg(short, long, conflicts_with = "pids")]
    all: bool,

    /// Include per-core counters
    #[arg(long)]
    cores: bool,

    /// Read from this proc root instead of the configured one
    #[arg(long, value_name = "PATH")]
    proc_root: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Verify the proc root is readable and exit
    #[arg(long)]
    check: bool,

    /// Generate example config file and exit
    #[arg(long)]
    generate_config: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// What gets printed.
#[derive(Debug, Serialize)]
struct Report {
    proc_root: PathBuf,
    cpu_ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu_times: Option<CpuTimes>,
    num_cores: u32,
    clock_ticks_per_second: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    boot_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    uptime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    cores: Option<Vec<CoreTimes>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    processes: Vec<ProcessRecord>,
}

#[derive(Debug, Serialize)]
struct ProcessRecord {
    pid: i32,
    /// `null` when the process could not be read
    stat: Option<ProcessStat>,
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("procstat_rs_cpu={level}").parse()?)
        .add_directive(format!("procstat_rs_core={level}").parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn build_report(reader: &ProcStatReader, args: &Args) -> Result<Report> {
    let cpu_times = match reader.cpu_times() {
        Ok(times) => Some(times),
        Err(e) => {
            tracing::warn!(error = %e, "could not read aggregate cpu line");
            None
        }
    };

    let boot_time = reader.boot_time().ok();
    let uptime = boot_time.and_then(|boot| {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        Some(format::uptime_to_human(now.saturating_sub(boot)))
    });

    let cores = if args.cores {
        Some(reader.core_times().context("reading per-core counters")?)
    } else {
        None
    };

    let processes = if args.all {
        reader
            .process_stats()
            .context("scanning processes")?
            .into_iter()
            .map(|(pid, stat)| ProcessRecord {
                pid,
                stat: Some(stat),
            })
            .collect()
    } else {
        args.pids
            .iter()
            .map(|&pid| ProcessRecord {
                pid,
                stat: reader.read_stat_from_pid(pid),
            })
            .collect()
    };

    Ok(Report {
        proc_root: reader.root().to_path_buf(),
        cpu_ticks: cpu_times.map_or(0, |times| times.total()),
        cpu_times,
        num_cores: reader.num_cores(),
        clock_ticks_per_second: reader.clock_ticks_per_second(),
        boot_time,
        uptime,
        cores,
        processes,
    })
}

/// Main entry point for the CPU accounting dump.
fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    if args.generate_config {
        if let Some(config_path) = ProcConfig::default_config_path() {
            ProcConfig::save_example_config_to_file(&config_path)?;
            println!("Generated example config at: {}", config_path.display());
        } else {
            eprintln!("Could not determine config directory");
            process::exit(1);
        }
        return Ok(());
    }

    let mut config = ProcConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable config");
        ProcConfig::default().apply_env_overrides()
    });
    if let Some(root) = &args.proc_root {
        config = config.with_proc_root(root);
    }

    let reader = ProcStatReader::from_config(&config)?;

    if args.check {
        match reader.check_availability() {
            Ok(()) => {
                println!("{} is readable", reader.root().display());
                return Ok(());
            }
            Err(e) => {
                eprintln!("CPU accounting is not available: {}", e);
                process::exit(1);
            }
        }
    }

    let report = build_report(&reader, &args)?;
    let output = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{output}");

    Ok(())
}
