use crate::MemSampler;
use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command, ValueEnum};
use csv::Writer;
use rand::distributions::{Uniform, WeightedIndex};
use std::fmt;
use std::fs::{create_dir_all, File, OpenOptions};
use std::path::Path;
use std::time::Duration;

/// The counter used by the `shared` driver.
#[derive(PartialEq, Eq, Debug, ValueEnum, Clone, Copy)]
pub enum CounterKind {
    Local,
    Atomic,
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterKind::Local => write!(f, "local"),
            CounterKind::Atomic => write!(f, "atomic"),
        }
    }
}

#[derive(PartialEq, Debug)]
pub enum Op {
    /// Dereference a slot and read its payload.
    Get,
    /// Reset a slot to a fresh payload.
    Replace,
    /// Move one slot into another.
    Transfer,
    /// Share (or, for exclusive owners, release and re-wrap) one slot into another.
    Share,
}

impl Op {
    pub const OPS: [Op; 4] = [Op::Get, Op::Replace, Op::Transfer, Op::Share];
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub enum GetRate {
    WriteOnly = 0,
    ReadWrite = 1,
    ReadIntensive = 2,
    ReadOnly = 3,
}

impl GetRate {
    fn op_weights(self) -> &'static [i32; 4] {
        match self {
            GetRate::WriteOnly => &[0, 1, 1, 1],
            GetRate::ReadWrite => &[3, 1, 1, 1],
            GetRate::ReadIntensive => &[27, 1, 1, 1],
            GetRate::ReadOnly => &[1, 0, 0, 0],
        }
    }
}

pub struct Config {
    /// The owner under test, named after the driver binary.
    pub owner: String,
    pub counter: CounterKind,
    pub threads: usize,

    pub aux_thread: usize,
    pub aux_thread_period: Duration,
    pub sampling: bool,
    pub sampling_period: Duration,

    pub get_rate: GetRate,
    pub op_dist: WeightedIndex<i32>,
    pub slot_dist: Uniform<usize>,
    pub range: usize,
    pub interval: u64,
    pub duration: Duration,

    pub mem_sampler: MemSampler,
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} threads, {} counter, r{}, g{}",
            self.owner, self.threads, self.counter, self.range, self.get_rate as u8,
        )
    }
}

pub struct BenchWriter {
    output: Option<Writer<File>>,
}

#[derive(Clone, Debug)]
pub struct Perf {
    pub ops_per_sec: u64,
    pub peak_mem: usize,
    pub avg_mem: usize,
    /// Payloads still alive after every owner was torn down.
    pub leaked: usize,
}

impl fmt::Display for Perf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ops/s: {}, peak mem: {}, avg_mem: {}, leaked: {}",
            self.ops_per_sec,
            readable_bytes(self.peak_mem),
            readable_bytes(self.avg_mem),
            self.leaked,
        )
    }
}

fn readable_bytes(num: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let unit = (0..UNITS.len())
        .find(|&i| num / 2usize.pow(i as u32 * 10) < 1000)
        .unwrap_or(UNITS.len() - 1);
    format!(
        "{:.3} {}",
        num as f64 / 2f64.powf(unit as f64 * 10.0),
        UNITS[unit]
    )
}

const HEADER: [&str; 11] = [
    "owner",
    "counter",
    "threads",
    "get_rate",
    "sampling_period",
    "throughput",
    "peak_mem",
    "avg_mem",
    "leaked",
    "range",
    "interval",
];

impl BenchWriter {
    pub fn write_record(self, config: &Config, perf: &Perf) -> anyhow::Result<()> {
        if let Some(mut output) = self.output {
            output.write_record(&[
                config.owner.clone(),
                config.counter.to_string(),
                config.threads.to_string(),
                (config.get_rate as u8).to_string(),
                config.sampling_period.as_millis().to_string(),
                perf.ops_per_sec.to_string(),
                perf.peak_mem.to_string(),
                perf.avg_mem.to_string(),
                perf.leaked.to_string(),
                config.range.to_string(),
                config.interval.to_string(),
            ])?;
            output.flush()?;
        }
        Ok(())
    }
}

fn open_output(output_name: &str) -> anyhow::Result<Writer<File>> {
    let output_path = Path::new(output_name);
    if let Some(dir) = output_path.parent() {
        create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    if let Ok(f) = OpenOptions::new().read(true).append(true).open(output_path) {
        return Ok(csv::Writer::from_writer(f));
    }
    let f = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(output_path)
        .with_context(|| format!("creating {}", output_path.display()))?;
    let mut output = csv::Writer::from_writer(f);
    // NOTE: keep in sync with `BenchWriter::write_record`.
    output.write_record(HEADER)?;
    output.flush()?;
    Ok(output)
}

fn command(owner: String) -> Command {
    Command::new(owner)
        .arg(
            Arg::new("threads")
                .short('t')
                .value_parser(value_parser!(usize))
                .required(true)
                .help("Numbers of threads to run."),
        )
        .arg(
            Arg::new("get rate")
                .short('g')
                .help(
                    "The proportion of `get`(read) operations. \
                     0: 0%, 1: 50%, 2: 90%, 3: 100%",
                )
                .value_parser(value_parser!(u8).range(0..4))
                .default_value("1"),
        )
        .arg(
            Arg::new("range")
                .short('r')
                .value_parser(value_parser!(usize))
                .help("Owner slots per thread: [0..RANGE]")
                .default_value("10000"),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .value_parser(value_parser!(u64).range(1..))
                .help("Time interval in seconds to run the benchmark")
                .default_value("10"),
        )
        .arg(
            Arg::new("sampling period")
                .short('s')
                .value_parser(value_parser!(u64))
                .help(
                    "The period to query jemalloc stats.allocated (ms). 0 for no sampling. \
                     Only supported on linux.",
                )
                .default_value("1"),
        )
        .arg(
            Arg::new("counter")
                .short('c')
                .value_parser(value_parser!(CounterKind))
                .ignore_case(true)
                .help("Reference counter of shared owners")
                .default_value("local"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .help("Output CSV filename. Appends the data if the file already exists."),
        )
        .arg(
            Arg::new("dry run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Check whether the arguments are parsable, without running a benchmark"),
        )
}

/// Parses the command line of the driver named `owner`.
///
/// Exits the process after parsing if `--dry-run` is given.
pub fn setup(owner: String) -> anyhow::Result<(Config, BenchWriter)> {
    let m = command(owner.clone()).get_matches();
    from_matches(owner, &m)
}

pub fn setup_from<I, A>(owner: String, args: I) -> anyhow::Result<(Config, BenchWriter)>
where
    I: IntoIterator<Item = A>,
    A: Into<std::ffi::OsString> + Clone,
{
    let m = command(owner.clone()).try_get_matches_from(args)?;
    from_matches(owner, &m)
}

fn from_matches(owner: String, m: &ArgMatches) -> anyhow::Result<(Config, BenchWriter)> {
    let threads = *m.get_one::<usize>("threads").context("missing threads")?;
    let get_rate = match m.get_one::<u8>("get rate").copied() {
        Some(0) => GetRate::WriteOnly,
        Some(1) => GetRate::ReadWrite,
        Some(2) => GetRate::ReadIntensive,
        Some(3) => GetRate::ReadOnly,
        _ => unreachable!("get_rate is invalid"),
    };
    anyhow::ensure!(threads > 0, "at least one thread is needed");
    let range = *m.get_one::<usize>("range").context("missing range")?;
    anyhow::ensure!(range > 0, "at least one owner slot is needed");
    let interval = *m.get_one::<u64>("interval").context("missing interval")?;
    let sampling_period = *m
        .get_one::<u64>("sampling period")
        .context("missing sampling period")?;
    let sampling = sampling_period > 0 && cfg!(all(not(feature = "sanitize"), target_os = "linux"));
    let counter = *m.get_one::<CounterKind>("counter").context("missing counter")?;
    let duration = Duration::from_secs(interval);

    let op_dist = WeightedIndex::new(get_rate.op_weights())?;
    let slot_dist = Uniform::from(0..range);

    let output = m
        .get_one::<String>("output")
        .map(|name| open_output(name))
        .transpose()?;

    let config = Config {
        owner,
        counter,
        threads,

        aux_thread: if sampling { 1 } else { 0 },
        aux_thread_period: Duration::from_millis(1),
        sampling,
        sampling_period: Duration::from_millis(sampling_period),

        get_rate,
        op_dist,
        slot_dist,
        range,
        interval,
        duration,

        mem_sampler: MemSampler::new()?,
    };

    if m.get_flag("dry run") {
        log::info!("{config}: arguments are valid");
        std::process::exit(0);
    }

    Ok((config, BenchWriter { output }))
}
