use std::{
    cell::Cell,
    ptr::NonNull,
    sync::atomic::{fence, AtomicU64, Ordering},
};

mod sealed {
    /// The operations of a [`Counter`](super::Counter). The module is
    /// private, so only the control block can call them.
    pub trait Count {
        fn one() -> Self;

        fn increment(&self);

        /// Returns true if this decrement released the last owner.
        fn decrement(&self) -> bool;

        fn load(&self) -> u64;
    }
}

use sealed::Count;

/// A reference counter stored in the control block of a shared allocation.
///
/// The counter starts at one (the owner that allocated the block) and reports
/// the decrement that released the last owner. It is sealed, and its
/// operations are not callable from outside this crate: the soundness of
/// [`SharedOwner`](crate::SharedOwner) depends on the counts that only its
/// control block maintains.
///
/// ```compile_fail
/// use smart_owners::{Counter, LocalCount};
///
/// let count = LocalCount::one();
/// ```
pub trait Counter: Count {}

/// A single-threaded counter. Owners using it are neither `Send` nor `Sync`.
#[derive(Debug)]
pub struct LocalCount {
    cnt: Cell<u64>,
}

impl Counter for LocalCount {}

impl Count for LocalCount {
    #[inline(always)]
    fn one() -> Self {
        Self { cnt: Cell::new(1) }
    }

    #[inline(always)]
    fn increment(&self) {
        self.cnt.set(self.cnt.get() + 1);
    }

    #[inline(always)]
    fn decrement(&self) -> bool {
        let cnt = self.cnt.get();
        debug_assert!(cnt >= 1);
        self.cnt.set(cnt - 1);
        cnt == 1
    }

    #[inline(always)]
    fn load(&self) -> u64 {
        self.cnt.get()
    }
}

/// A thread-safe counter for owners that are shared between threads.
#[derive(Debug)]
pub struct AtomicCount {
    cnt: AtomicU64,
}

impl Counter for AtomicCount {}

impl Count for AtomicCount {
    #[inline(always)]
    fn one() -> Self {
        Self {
            cnt: AtomicU64::new(1),
        }
    }

    #[inline(always)]
    fn increment(&self) {
        // A new owner is always made from an existing one, which keeps the
        // count above zero, so no ordering is needed here.
        self.cnt.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    fn decrement(&self) -> bool {
        // A decrement-release + an acquire fence is recommended by Boost's documentation:
        // https://www.boost.org/doc/libs/1_57_0/doc/html/atomic/usage_examples.html
        let prev = self.cnt.fetch_sub(1, Ordering::Release);
        debug_assert!(prev >= 1);
        if prev == 1 {
            fence(Ordering::Acquire);
            true
        } else {
            false
        }
    }

    #[inline(always)]
    fn load(&self) -> u64 {
        self.cnt.load(Ordering::Acquire)
    }
}

/// The out-of-line counter shared by every owner of one allocation.
///
/// A block never frees the value it counts: the owner whose decrement
/// releases the last reference disposes of the value and then destroys the
/// block.
pub(crate) struct ControlBlock<C> {
    count: C,
}

impl<C: Counter> ControlBlock<C> {
    /// Allocates a block counting one owner.
    #[inline]
    pub(crate) fn allocate() -> NonNull<Self> {
        NonNull::from(Box::leak(Box::new(Self { count: C::one() })))
    }

    #[inline(always)]
    pub(crate) fn add_ref(&self) {
        self.count.increment();
    }

    /// Drops one owner's claim. Returns true if it was the last one.
    #[inline(always)]
    pub(crate) fn release_ref(&self) -> bool {
        self.count.decrement()
    }

    #[inline(always)]
    pub(crate) fn use_count(&self) -> u64 {
        self.count.load()
    }

    /// # Safety
    ///
    /// `block` must come from [`ControlBlock::allocate`], its count must have
    /// been released to zero, and it must not be used afterwards.
    #[inline]
    pub(crate) unsafe fn destroy(block: NonNull<Self>) {
        debug_assert_eq!(block.as_ref().use_count(), 0);
        drop(Box::from_raw(block.as_ptr()));
    }
}
