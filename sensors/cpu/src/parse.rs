//! Parsers for the kernel text sources read by [`crate::ProcStatReader`].
//!
//! These are pure functions over file contents, one per source, so that a
//! change in the kernel's field layout stays local to this module. Field
//! numbers below are 1-based, as in `proc(5)`.

use procstat_rs_core::{CoreTimes, CpuTimes, ProcError, ProcessStat};

/// Counters every kernel reports on a `cpu` line; later ones are optional.
const MIN_CPU_FIELDS: usize = 4;

/// Last field `read_time_from_pid` consumes (stime).
const PROCESS_TICKS_LAST_FIELD: usize = 15;

/// Last field `read_stat_from_pid` consumes (starttime).
const PROCESS_STAT_LAST_FIELD: usize = 22;

/// Everything `/proc/stat` has that the readers care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatFile {
    /// The aggregate `cpu` line
    pub total: CpuTimes,
    /// One entry per `cpuN` line, in file order
    pub cores: Vec<CoreTimes>,
    /// `btime`, seconds since the epoch, if present
    pub boot_time: Option<u64>,
}

/// Parse the counters of a single `cpu` or `cpuN` line.
///
/// Up to ten counters are read; fewer than four is an error. Once four are
/// in, a non-numeric token ends the line and the rest count as 0.
pub fn parse_cpu_line(line: &str) -> Result<CpuTimes, ProcError> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some(label) if label.starts_with("cpu") => {}
        _ => return Err(ProcError::parse("Line does not start with 'cpu'")),
    }

    let mut values = Vec::with_capacity(CpuTimes::FIELD_COUNT);
    for field in parts.take(CpuTimes::FIELD_COUNT) {
        match field.parse::<u64>() {
            Ok(value) => values.push(value),
            Err(_) if values.len() >= MIN_CPU_FIELDS => break,
            Err(e) => {
                return Err(ProcError::parse_with_source(
                    format!("Invalid CPU counter '{field}'"),
                    e,
                ))
            }
        }
    }

    if values.len() < MIN_CPU_FIELDS {
        return Err(ProcError::parse(format!(
            "Insufficient CPU statistics: expected at least {MIN_CPU_FIELDS}, got {}",
            values.len()
        )));
    }

    Ok(CpuTimes::from_fields(&values))
}

/// Find and parse the aggregate `cpu` line of `/proc/stat`.
pub fn parse_total_cpu(content: &str) -> Result<CpuTimes, ProcError> {
    let line = content
        .lines()
        .find(|line| is_total_cpu_line(line))
        .ok_or_else(|| ProcError::parse("No aggregate 'cpu' line in stat"))?;
    parse_cpu_line(line)
}

/// Parse the whole of `/proc/stat`: aggregate line, per-core lines and `btime`.
pub fn parse_stat_file(content: &str) -> Result<StatFile, ProcError> {
    let mut total = None;
    let mut cores = Vec::new();
    let mut boot_time = None;

    for line in content.lines() {
        if is_total_cpu_line(line) {
            if total.is_none() {
                total = Some(parse_cpu_line(line)?);
            }
        } else if let Some(rest) = line.strip_prefix("cpu") {
            let id = rest.split_whitespace().next().unwrap_or_default();
            let core_id = id
                .parse::<usize>()
                .map_err(|e| ProcError::parse_with_source(format!("Invalid core id '{id}'"), e))?;
            cores.push(CoreTimes {
                core_id,
                times: parse_cpu_line(line)?,
            });
        } else if let Some(rest) = line.strip_prefix("btime") {
            let value = rest.trim();
            boot_time = Some(value.parse::<u64>().map_err(|e| {
                ProcError::parse_with_source(format!("Invalid btime '{value}'"), e)
            })?);
        }
    }

    let total = total.ok_or_else(|| ProcError::parse("No aggregate 'cpu' line in stat"))?;
    Ok(StatFile {
        total,
        cores,
        boot_time,
    })
}

fn is_total_cpu_line(line: &str) -> bool {
    line.strip_prefix("cpu")
        .is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

/// Split a `/proc/<pid>/stat` line into its fields.
///
/// The name (field 2) is everything between the first `(` and the last `)`,
/// so names containing spaces or parentheses keep the later fields aligned.
/// The returned vector holds field 1 at index 0, the name at index 1 and so on.
pub fn split_process_stat(content: &str) -> Result<Vec<&str>, ProcError> {
    let content = content.trim();
    let open = content
        .find('(')
        .ok_or_else(|| ProcError::parse("missing '(' in process stat"))?;
    let close = content
        .rfind(')')
        .ok_or_else(|| ProcError::parse("missing ')' in process stat"))?;
    if close <= open {
        return Err(ProcError::parse("invalid parentheses in process stat"));
    }

    let pid = content[..open].trim();
    if pid.is_empty() {
        return Err(ProcError::parse("missing pid in process stat"));
    }

    let mut fields = Vec::with_capacity(PROCESS_STAT_LAST_FIELD + 32);
    fields.push(pid);
    fields.push(&content[open + 1..close]);
    fields.extend(content[close + 1..].split_whitespace());
    Ok(fields)
}

/// Parse field `number` (1-based) of a split process stat line.
fn field<T>(fields: &[&str], number: usize, name: &str) -> Result<T, ProcError>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = fields
        .get(number - 1)
        .ok_or_else(|| ProcError::parse(format!("missing field {number} ({name})")))?;
    raw.parse()
        .map_err(|e| ProcError::parse_with_source(format!("invalid {name} '{raw}'"), e))
}

fn require_fields(fields: &[&str], last: usize) -> Result<(), ProcError> {
    if fields.len() < last {
        return Err(ProcError::parse(format!(
            "not enough fields in process stat: expected {last}+, got {}",
            fields.len()
        )));
    }
    Ok(())
}

/// utime + stime (fields 14 and 15) of a `/proc/<pid>/stat` line.
pub fn parse_process_cpu_ticks(content: &str) -> Result<u64, ProcError> {
    let fields = split_process_stat(content)?;
    require_fields(&fields, PROCESS_TICKS_LAST_FIELD)?;

    let utime: u64 = field(&fields, 14, "utime")?;
    let stime: u64 = field(&fields, 15, "stime")?;
    Ok(utime.saturating_add(stime))
}

/// The [`ProcessStat`] fields of a `/proc/<pid>/stat` line.
pub fn parse_process_stat(content: &str) -> Result<ProcessStat, ProcError> {
    let fields = split_process_stat(content)?;
    require_fields(&fields, PROCESS_STAT_LAST_FIELD)?;

    let utime: u64 = field(&fields, 14, "utime")?;
    let stime: u64 = field(&fields, 15, "stime")?;

    Ok(ProcessStat {
        parent_pid: field(&fields, 4, "ppid")?,
        process_group: field(&fields, 5, "pgrp")?,
        cpu_ticks: utime.saturating_add(stime),
        nice: field(&fields, 19, "nice")?,
        thread_count: field(&fields, 20, "num_threads")?,
        start_time: field(&fields, 22, "starttime")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT_FILE: &str = "\
cpu  100 200 300 400 0 0 0 0 0 0
cpu0 60 120 180 240 0 0 0 0 0 0
cpu1 40 80 120 160 0 0 0 0 0 0
intr 12345 0 0
ctxt 987654
btime 1700000000
processes 4242
procs_running 2
procs_blocked 0
";

    /// A `/proc/<pid>/stat` line with every field numbered after its position.
    fn process_line(name: &str) -> String {
        format!(
            "42 ({name}) S 1 100 100 0 -1 4194560 5 0 0 0 10 20 0 0 20 5 3 0 99999 \
             12345678 250 18446744073709551615 1 1 0 0 0 0 0 0 0 0 0 0 17 2 0 0 0 0 0"
        )
    }

    #[test]
    fn test_parse_cpu_line_ten_fields() {
        let times = parse_cpu_line("cpu  1 2 3 4 5 6 7 8 9 10").unwrap();
        assert_eq!(times.user, 1);
        assert_eq!(times.steal, 8);
        assert_eq!(times.guest, 9);
        assert_eq!(times.guest_nice, 10);
        assert_eq!(times.total(), 55);
    }

    #[test]
    fn test_parse_cpu_line_extra_fields_ignored() {
        let times = parse_cpu_line("cpu  1 2 3 4 5 6 7 8 9 10 11 12").unwrap();
        assert_eq!(times.total(), 55);
    }

    #[test]
    fn test_parse_cpu_line_old_kernel() {
        let times = parse_cpu_line("cpu  100 200 300 400").unwrap();
        assert_eq!(times.iowait, 0);
        assert_eq!(times.total(), 1000);
    }

    #[test]
    fn test_parse_cpu_line_stops_at_bad_tail_counter() {
        let times = parse_cpu_line("cpu  1 2 3 4 x 6 7 8 9 10").unwrap();
        assert_eq!(times.iowait, 0);
        assert_eq!(times.irq, 0);
        assert_eq!(times.total(), 10);

        let times = parse_cpu_line("cpu  1 2 3 4 5 6 -7 8").unwrap();
        assert_eq!(times.total(), 21);
    }

    #[test]
    fn test_parse_cpu_line_invalid() {
        assert!(parse_cpu_line("cpu  1 2 3").is_err());
        assert!(parse_cpu_line("cpu  1 2 x 4").is_err());
        assert!(parse_cpu_line("intr 1 2 3 4").is_err());
        assert!(parse_cpu_line("").is_err());
    }

    #[test]
    fn test_parse_total_cpu() {
        assert_eq!(parse_total_cpu(STAT_FILE).unwrap().total(), 1000);
    }

    #[test]
    fn test_parse_total_cpu_skips_core_lines() {
        let content = "cpu0 1 1 1 1\ncpu  5 5 5 5\n";
        assert_eq!(parse_total_cpu(content).unwrap().total(), 20);
    }

    #[test]
    fn test_parse_total_cpu_missing() {
        assert!(parse_total_cpu("").is_err());
        assert!(parse_total_cpu("cpu0 1 2 3 4\nintr 1\n").is_err());
    }

    #[test]
    fn test_parse_stat_file() {
        let stat = parse_stat_file(STAT_FILE).unwrap();
        assert_eq!(stat.total.total(), 1000);
        assert_eq!(stat.cores.len(), 2);
        assert_eq!(stat.cores[0].core_id, 0);
        assert_eq!(stat.cores[0].times.total(), 600);
        assert_eq!(stat.cores[1].core_id, 1);
        assert_eq!(stat.cores[1].times.idle, 160);
        assert_eq!(stat.boot_time, Some(1_700_000_000));
    }

    #[test]
    fn test_parse_stat_file_without_btime() {
        let stat = parse_stat_file("cpu  1 1 1 1\n").unwrap();
        assert!(stat.cores.is_empty());
        assert_eq!(stat.boot_time, None);
    }

    #[test]
    fn test_parse_stat_file_bad_core_id() {
        assert!(parse_stat_file("cpu  1 1 1 1\ncpuX 1 1 1 1\n").is_err());
    }

    #[test]
    fn test_split_process_stat() {
        let line = process_line("bash");
        let fields = split_process_stat(&line).unwrap();
        assert_eq!(fields[0], "42");
        assert_eq!(fields[1], "bash");
        assert_eq!(fields[2], "S");
        assert_eq!(fields[21], "99999");
    }

    #[test]
    fn test_parse_process_cpu_ticks() {
        let line = "7 (worker) R 1 7 7 0 -1 0 0 0 0 0 50 75 0 0 20 0 1 0 500";
        assert_eq!(parse_process_cpu_ticks(line).unwrap(), 125);
    }

    #[test]
    fn test_parse_process_stat() {
        let stat = parse_process_stat(&process_line("bash")).unwrap();
        assert_eq!(
            stat,
            ProcessStat {
                parent_pid: 1,
                process_group: 100,
                cpu_ticks: 30,
                nice: 5,
                thread_count: 3,
                start_time: 99999,
            }
        );
    }

    #[test]
    fn test_parse_process_stat_negative_nice() {
        let line = process_line("bash").replace(" 20 5 3 ", " 0 -20 3 ");
        let stat = parse_process_stat(&line).unwrap();
        assert_eq!(stat.nice, -20);
    }

    #[test]
    fn test_parse_process_stat_name_with_spaces() {
        let stat = parse_process_stat(&process_line("Web Content")).unwrap();
        assert_eq!(stat.parent_pid, 1);
        assert_eq!(stat.cpu_ticks, 30);
        assert_eq!(stat.start_time, 99999);
    }

    #[test]
    fn test_parse_process_stat_name_with_parentheses() {
        let stat = parse_process_stat(&process_line("evil) S 9 9 (x")).unwrap();
        assert_eq!(stat.parent_pid, 1);
        assert_eq!(stat.process_group, 100);
        assert_eq!(stat.thread_count, 3);
        assert_eq!(parse_process_cpu_ticks(&process_line("a (b) c")).unwrap(), 30);
    }

    #[test]
    fn test_parse_process_stat_truncated() {
        let line = "42 (bash) S 1 100 100 0 -1 4194560 5 0 0 0 10 20 0 0 20 5 3";
        assert!(parse_process_stat(line).is_err());
        // Enough for the tick reader, which stops at field 15.
        assert_eq!(parse_process_cpu_ticks(line).unwrap(), 30);

        let short = "42 (bash) S 1 100 100 0 -1 4194560 5 0 0 0 10";
        assert!(parse_process_cpu_ticks(short).is_err());
    }

    #[test]
    fn test_parse_process_stat_malformed() {
        assert!(parse_process_stat("").is_err());
        assert!(parse_process_stat("42 bash S 1 100").is_err());
        assert!(parse_process_stat("42 )bash( S").is_err());
        assert!(parse_process_stat("(bash) S 1 100").is_err());

        let bad_ppid = process_line("bash").replacen(" S 1 ", " S x ", 1);
        assert!(parse_process_stat(&bad_ppid).is_err());
    }
}
