//! The value type the workload harness puts behind owners.

use std::sync::atomic::{AtomicUsize, Ordering};

static LIVE: AtomicUsize = AtomicUsize::new(0);

/// A value that counts how many instances are alive, process-wide.
///
/// After every owner has been torn down the count must be back to where it
/// started; anything left over was leaked.
#[derive(Debug)]
pub struct Payload {
    key: usize,
    words: [u64; 4],
}

impl Payload {
    pub fn new(key: usize) -> Self {
        LIVE.fetch_add(1, Ordering::Relaxed);
        Self {
            key,
            words: [key as u64; 4],
        }
    }

    #[inline]
    pub fn key(&self) -> usize {
        self.key
    }

    /// Reads the whole payload, so that a `Get` touches the allocation.
    #[inline]
    pub fn checksum(&self) -> u64 {
        self.words
            .iter()
            .fold(self.key as u64, |acc, w| acc.wrapping_mul(31).wrapping_add(*w))
    }

    /// The number of payloads currently alive.
    pub fn live() -> usize {
        LIVE.load(Ordering::Acquire)
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        LIVE.fetch_sub(1, Ordering::Release);
    }
}
