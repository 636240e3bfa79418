use std::{
    fmt,
    marker::PhantomData,
    mem,
    ops::Deref,
    ptr::{self, NonNull},
};

use crate::control::{ControlBlock, Counter, LocalCount};
use crate::ResetError;

/// A reference-counted pointer to a heap allocation.
///
/// Every owner of one allocation shares one out-of-line control block, whose
/// count is exactly the number of those owners. The value and the block are
/// freed when the last owner is dropped or reset. A null owner has no block
/// and reports a `use_count` of zero.
///
/// `C` selects the counter. The default [`LocalCount`] is single-threaded
/// and makes the owner `!Send` and `!Sync`; [`AtomicCount`](crate::AtomicCount) allows owners to
/// be cloned and dropped from several threads.
///
/// ```
/// use smart_owners::SharedOwner;
///
/// let mut a: SharedOwner<i32> = SharedOwner::new(5);
/// assert_eq!(a.use_count(), 1);
///
/// let b = a.clone();
/// assert_eq!(a.use_count(), 2);
/// assert_eq!(*a, *b);
/// assert!(a == b);
///
/// a.reset();
/// assert!(a.get().is_null());
/// assert_eq!(*b, 5);
/// assert_eq!(b.use_count(), 1);
/// ```
///
/// Owners with the default counter stay on their thread:
///
/// ```compile_fail
/// use smart_owners::SharedOwner;
///
/// let a: SharedOwner<i32> = SharedOwner::new(5);
/// std::thread::spawn(move || drop(a));
/// ```
///
/// while owners with an [`AtomicCount`](crate::AtomicCount) can be sent:
///
/// ```
/// use smart_owners::{AtomicCount, SharedOwner};
///
/// let a: SharedOwner<i32, AtomicCount> = SharedOwner::new(5);
/// let b = a.clone();
/// std::thread::spawn(move || drop(b)).join().unwrap();
/// assert!(a.unique());
/// ```
pub struct SharedOwner<T, C: Counter = LocalCount> {
    ptr: *mut T,
    block: Option<NonNull<ControlBlock<C>>>,
    _marker: PhantomData<T>,
}

// Any owner may free the value, and clones on other threads touch the same
// counter, so both need a thread-safe counter and a `Send + Sync` value.
unsafe impl<T: Send + Sync, C: Counter + Send + Sync> Send for SharedOwner<T, C> {}
unsafe impl<T: Send + Sync, C: Counter + Send + Sync> Sync for SharedOwner<T, C> {}

impl<T, C: Counter> SharedOwner<T, C> {
    #[inline(always)]
    pub const fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
            block: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn new(value: T) -> Self {
        Self::from(Box::new(value))
    }

    /// Takes ownership of `ptr`. A non-null `ptr` gets a fresh control block
    /// counting one owner; a null `ptr` gets none.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from [`Box::into_raw`] and must not be owned
    /// by anything else.
    #[inline]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        let block = if ptr.is_null() {
            None
        } else {
            Some(ControlBlock::allocate())
        };
        Self {
            ptr,
            block,
            _marker: PhantomData,
        }
    }

    /// Returns the shared pointer without affecting the count.
    #[inline(always)]
    pub fn get(&self) -> *mut T {
        self.ptr
    }

    #[inline(always)]
    pub fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    #[inline(always)]
    pub fn as_ref(&self) -> Option<&T> {
        unsafe { self.ptr.as_ref() }
    }

    /// Returns a mutable reference if this is the only owner.
    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.unique() {
            unsafe { self.ptr.as_mut() }
        } else {
            None
        }
    }

    /// # Safety
    ///
    /// The owner must not be null, and no other reference to the value may be
    /// alive while the returned one is, including ones obtained through other
    /// owners of the same allocation.
    #[inline(always)]
    pub unsafe fn deref_mut_unchecked(&mut self) -> &mut T {
        debug_assert!(!self.ptr.is_null());
        &mut *self.ptr
    }

    /// Whether this is the only owner of its allocation. False when null.
    #[inline]
    pub fn unique(&self) -> bool {
        self.use_count() == 1
    }

    /// The number of owners sharing this allocation, or zero when null.
    #[inline]
    pub fn use_count(&self) -> u64 {
        match self.block {
            Some(block) => unsafe { block.as_ref() }.use_count(),
            None => 0,
        }
    }

    /// Gives up this owner's claim. The value is freed if it was the last one.
    #[inline]
    pub fn reset(&mut self) {
        self.detach();
    }

    /// Gives up this owner's claim, then owns `value` under a fresh block.
    /// Other owners of the old allocation are unaffected.
    #[inline]
    pub fn reset_with(&mut self, value: T) {
        *self = Self::new(value);
    }

    /// Gives up this owner's claim, then takes ownership of `ptr` under a
    /// fresh block.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is the non-null pointer already owned.
    ///
    /// # Safety
    ///
    /// Same as [`from_raw`](Self::from_raw).
    #[inline]
    pub unsafe fn reset_raw(&mut self, ptr: *mut T) {
        if let Err(e) = self.try_reset_raw(ptr) {
            panic!("SharedOwner: {e}");
        }
    }

    /// Like [`reset_raw`](Self::reset_raw), but reports a self-reset instead
    /// of panicking.
    ///
    /// # Safety
    ///
    /// Same as [`from_raw`](Self::from_raw).
    #[inline]
    pub unsafe fn try_reset_raw(&mut self, ptr: *mut T) -> Result<(), ResetError> {
        ResetError::check(self.ptr, ptr)?;
        // The old claim is dropped after the new owner is in place.
        *self = Self::from_raw(ptr);
        Ok(())
    }

    /// Moves this owner's claim out, leaving it null. The count is unchanged.
    #[inline]
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::null())
    }

    /// Gives up this owner's claim, then moves `src`'s claim in. `src`
    /// becomes null.
    #[inline]
    pub fn move_from(&mut self, src: &mut Self) {
        *self = src.take();
    }

    /// Decrements the block and nulls this owner. The last owner frees the
    /// value, then the block.
    #[inline]
    fn detach(&mut self) {
        let ptr = mem::replace(&mut self.ptr, ptr::null_mut());
        let Some(block) = self.block.take() else {
            return;
        };
        unsafe {
            if block.as_ref().release_ref() {
                let _block = scopeguard::guard(block, |block| ControlBlock::destroy(block));
                drop(Box::from_raw(ptr));
            }
        }
    }
}

impl<T, C: Counter> Clone for SharedOwner<T, C> {
    /// Makes another owner of the same allocation and counts it.
    #[inline]
    fn clone(&self) -> Self {
        if let Some(block) = self.block {
            unsafe { block.as_ref() }.add_ref();
        }
        Self {
            ptr: self.ptr,
            block: self.block,
            _marker: PhantomData,
        }
    }

    /// Gives up this owner's claim, then shares `source`'s allocation.
    #[inline]
    fn clone_from(&mut self, source: &Self) {
        if self.block != source.block {
            *self = source.clone();
        }
    }
}

impl<T, C: Counter> Drop for SharedOwner<T, C> {
    #[inline(always)]
    fn drop(&mut self) {
        self.detach();
    }
}

impl<T, C: Counter> Deref for SharedOwner<T, C> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        match self.as_ref() {
            Some(value) => value,
            None => panic!("dereferenced a null SharedOwner"),
        }
    }
}

/// Owners are equal when they point at the same allocation.
///
/// Equality compares addresses. Every zero-sized value lives at the same
/// dangling address, so owners of distinct zero-sized values compare equal.
impl<T, C: Counter> PartialEq for SharedOwner<T, C> {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.ptr, other.ptr)
    }
}

impl<T, C: Counter> Eq for SharedOwner<T, C> {}

impl<T, C: Counter> Default for SharedOwner<T, C> {
    #[inline(always)]
    fn default() -> Self {
        Self::null()
    }
}

impl<T, C: Counter> From<Box<T>> for SharedOwner<T, C> {
    #[inline]
    fn from(value: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(value)) }
    }
}

impl<T, C: Counter> fmt::Debug for SharedOwner<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedOwner")
            .field("ptr", &self.ptr)
            .field("use_count", &self.use_count())
            .finish()
    }
}

impl<T, C: Counter> fmt::Pointer for SharedOwner<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}
