//! Ownership primitives that free a heap allocation exactly once.
//!
//! - [`ExclusiveOwner`]: the sole owner of an allocation. Move-only.
//! - [`SharedOwner`]: one of several owners of an allocation, counted in an
//!   out-of-line control block. Copying an owner increments the count, and
//!   the last owner to go frees the value and the block.
//!
//! Both wrap pointers obtained from [`Box::into_raw`], and both can be null.
//! Dereferencing a null owner panics.
//!
//! The library also carries the workload harness used by the `exclusive` and
//! `shared` binaries (see [`config::workload`], [`runner`] and [`payload`]).

#[cfg(all(not(feature = "sanitize"), target_os = "linux"))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod control;
mod error;
mod exclusive;
mod shared;

pub mod config;
pub mod payload;
pub mod runner;

pub use control::{AtomicCount, Counter, LocalCount};
pub use error::ResetError;
pub use exclusive::ExclusiveOwner;
pub use shared::SharedOwner;

cfg_if::cfg_if! {
    if #[cfg(all(not(feature = "sanitize"), target_os = "linux"))] {
        /// Reads jemalloc's `stats.allocated`.
        pub struct MemSampler {
            epoch_mib: tikv_jemalloc_ctl::epoch_mib,
            allocated_mib: tikv_jemalloc_ctl::stats::allocated_mib,
        }

        impl MemSampler {
            pub fn new() -> anyhow::Result<Self> {
                Ok(MemSampler {
                    epoch_mib: tikv_jemalloc_ctl::epoch::mib()?,
                    allocated_mib: tikv_jemalloc_ctl::stats::allocated::mib()?,
                })
            }

            pub fn sample(&self) -> anyhow::Result<usize> {
                self.epoch_mib.advance()?;
                Ok(self.allocated_mib.read()?)
            }
        }
    } else {
        pub struct MemSampler {}

        impl MemSampler {
            pub fn new() -> anyhow::Result<Self> {
                log::warn!("memory usage sampling is supported only on linux without `sanitize`");
                Ok(MemSampler {})
            }

            pub fn sample(&self) -> anyhow::Result<usize> {
                Ok(0)
            }
        }
    }
}
