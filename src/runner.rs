//! Runs workload threads for a fixed interval, next to a memory sampler.

use std::cell::Cell;
use std::cmp::max;
use std::sync::Barrier;
use std::thread;
use std::time::Instant;

use anyhow::anyhow;
use crossbeam_utils::thread::scope;

use crate::config::workload::Config;

/// Throughput and allocator footprint of one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Measured {
    pub ops_per_sec: u64,
    pub peak_mem: usize,
    pub avg_mem: usize,
}

/// A worker's pass through the barrier that starts every thread together.
pub struct Start<'a> {
    barrier: &'a Barrier,
    passed: Cell<bool>,
}

impl<'a> Start<'a> {
    fn new(barrier: &'a Barrier) -> Self {
        Self {
            barrier,
            passed: Cell::new(false),
        }
    }

    /// Blocks until every thread is ready. Later calls return immediately.
    pub fn wait(&self) {
        if !self.passed.replace(true) {
            self.barrier.wait();
        }
    }
}

/// Spawns `config.threads` copies of `worker` and, if sampling is on, one
/// sampling thread.
///
/// A worker prepares its state, calls [`Start::wait`], runs its operations
/// until `config.duration` has elapsed, and returns how many it performed.
/// A worker that returns or panics without waiting still passes the barrier,
/// so the other threads are never stranded; its panic is reported as an error.
pub fn run<W>(config: &Config, worker: W) -> anyhow::Result<Measured>
where
    W: Fn(&Start<'_>) -> u64 + Sync,
{
    let barrier = &Barrier::new(config.threads + config.aux_thread);
    let worker = &worker;

    let (ops, mem) = scope(|s| {
        let sampler = (config.aux_thread > 0).then(|| s.spawn(move |_| sample(config, barrier)));
        let workers = (0..config.threads)
            .map(|_| {
                s.spawn(move |_| {
                    let start = scopeguard::guard(Start::new(barrier), |start| start.wait());
                    worker(&*start)
                })
            })
            .collect::<Vec<_>>();

        let mut ops = 0;
        for handle in workers {
            ops += handle
                .join()
                .map_err(|_| anyhow!("a workload thread panicked"))?;
        }
        let mem = match sampler {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("the sampling thread panicked"))??,
            None => (0, 0),
        };
        Ok::<_, anyhow::Error>((ops, mem))
    })
    .map_err(|_| anyhow!("a scoped thread panicked"))??;

    log::debug!("{ops} operations in {}s", config.interval);
    Ok(Measured {
        ops_per_sec: ops / config.interval,
        peak_mem: mem.0,
        avg_mem: mem.1,
    })
}

/// Samples the allocator until the interval ends. Returns the peak and the
/// average of the samples.
fn sample(config: &Config, barrier: &Barrier) -> anyhow::Result<(usize, usize)> {
    let mut samples = 0usize;
    let mut acc = 0usize;
    let mut peak = 0usize;
    barrier.wait();

    let start = Instant::now();
    let mut next_sampling = start + config.sampling_period;
    while start.elapsed() < config.duration {
        let now = Instant::now();
        if now > next_sampling {
            let allocated = config.mem_sampler.sample()?;
            samples += 1;

            acc += allocated;
            peak = max(peak, allocated);

            next_sampling = now + config.sampling_period;
        }
        thread::sleep(config.aux_thread_period);
    }

    Ok((peak, if samples > 0 { acc / samples } else { 0 }))
}
