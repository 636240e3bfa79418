use anyhow::Context;
use rand::prelude::*;
use std::hint::black_box;
use std::path::Path;
use std::time::Instant;

use smart_owners::config::workload::{setup, Config, CounterKind, Op, Perf};
use smart_owners::payload::Payload;
use smart_owners::runner::{self, Start};
use smart_owners::{AtomicCount, Counter, LocalCount, SharedOwner};

/// Allocations that every `Share` operation draws from.
const SEEDS: usize = 64;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = bench() {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn bench() -> anyhow::Result<()> {
    let owner = Path::new(file!())
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .context("driver name")?;
    let (config, output) = setup(owner)?;
    println!("{}", config);

    let live = Payload::live();
    let measured = match config.counter {
        // Owners with a local counter cannot leave their thread, so every
        // thread gets its own seeds.
        CounterKind::Local => runner::run(&config, |ready| {
            let seeds = make_seeds::<LocalCount>();
            bench_slots(&config, &seeds, ready)
        })?,
        CounterKind::Atomic => {
            let seeds = make_seeds::<AtomicCount>();
            runner::run(&config, |ready| bench_slots(&config, &seeds, ready))?
        }
    };
    let leaked = Payload::live().saturating_sub(live);
    if leaked > 0 {
        log::error!("{leaked} payloads outlived their owners");
    }

    let perf = Perf {
        ops_per_sec: measured.ops_per_sec,
        peak_mem: measured.peak_mem,
        avg_mem: measured.avg_mem,
        leaked,
    };
    output.write_record(&config, &perf)?;
    println!("{}", perf);
    Ok(())
}

fn make_seeds<C: Counter>() -> Vec<SharedOwner<Payload, C>> {
    (0..SEEDS).map(|key| SharedOwner::new(Payload::new(key))).collect()
}

fn bench_slots<C: Counter>(
    config: &Config,
    seeds: &[SharedOwner<Payload, C>],
    ready: &Start<'_>,
) -> u64 {
    let rng = &mut rand::thread_rng();
    let mut slots = (0..config.range)
        .map(|key| SharedOwner::<Payload, C>::new(Payload::new(key)))
        .collect::<Vec<_>>();
    log::debug!("filled {} slots", slots.len());

    ready.wait();
    let start = Instant::now();
    let mut ops: u64 = 0;
    while start.elapsed() < config.duration {
        let key = config.slot_dist.sample(rng);
        match Op::OPS[config.op_dist.sample(rng)] {
            Op::Get => {
                if let Some(payload) = slots[key].as_ref() {
                    black_box(payload.checksum());
                }
            }
            Op::Replace => slots[key].reset_with(Payload::new(key)),
            Op::Transfer => {
                let to = config.slot_dist.sample(rng);
                if to != key {
                    let mut src = slots[key].take();
                    slots[to].move_from(&mut src);
                    debug_assert!(src.is_null() && slots[key].use_count() == 0);
                }
            }
            Op::Share => {
                let seed = &seeds[key % seeds.len()];
                slots[key].clone_from(seed);
                debug_assert!(slots[key] == *seed);
            }
        }
        ops += 1;
    }
    ops
}
