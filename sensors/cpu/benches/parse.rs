use criterion::{black_box, criterion_group, criterion_main, Criterion};
use procstat_rs_cpu::parse;

const STAT_FILE: &str = "\
cpu  4705 356 584 3699176 23060 0 277 0 0 0
cpu0 1393 280 278 924954 5986 0 56 0 0 0
cpu1 1100 25 101 925212 5712 0 83 0 0 0
cpu2 1109 26 103 924450 5693 0 69 0 0 0
cpu3 1103 25 102 924560 5669 0 69 0 0 0
intr 1462898 38 9 0 0 0 0 0 0 1 0 0 0 154 0 0 0
ctxt 1990473
btime 1700000000
processes 2915
procs_running 1
procs_blocked 0
";

const PROCESS_STAT: &str = "1234 (Web Content) S 1 1234 1234 0 -1 4194560 51245 0 12 0 \
    8123 1534 0 0 20 0 27 0 99999 3518812160 77612 18446744073709551615 1 1 0 0 0 0 0 \
    4096 17663 0 0 0 17 3 0 0 0 0 0";

fn bench_parsers(c: &mut Criterion) {
    c.bench_function("parse_total_cpu", |b| {
        b.iter(|| parse::parse_total_cpu(black_box(STAT_FILE)))
    });
    c.bench_function("parse_stat_file", |b| {
        b.iter(|| parse::parse_stat_file(black_box(STAT_FILE)))
    });
    c.bench_function("parse_process_stat", |b| {
        b.iter(|| parse::parse_process_stat(black_box(PROCESS_STAT)))
    });
}

criterion_group!(benches, bench_parsers);
criterion_main!(benches);
