use std::{
    fmt,
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
    ptr,
};

use crate::ResetError;

/// A pointer that is the sole owner of a heap allocation.
///
/// The allocation must come from [`Box`]; it is freed exactly once, when the
/// owner is dropped or reset. An owner can be null, in which case it frees
/// nothing and panics on dereference.
///
/// Ownership is never duplicated. There is no `Clone`, so copying does not
/// compile:
///
/// ```compile_fail
/// use smart_owners::ExclusiveOwner;
///
/// fn copy<T: Clone>(owner: &T) -> T {
///     owner.clone()
/// }
///
/// let a = ExclusiveOwner::new(5);
/// let b = copy(&a);
/// ```
///
/// Ownership moves with a Rust move, or with [`take`](Self::take) and
/// [`move_from`](Self::move_from), which leave the source null:
///
/// ```
/// use smart_owners::ExclusiveOwner;
///
/// let mut a = ExclusiveOwner::new(5);
/// let raw = a.get();
/// let b = a.take();
/// assert!(a.get().is_null());
/// assert_eq!(b.get(), raw);
/// assert_eq!(*b, 5);
/// ```
pub struct ExclusiveOwner<T> {
    ptr: *mut T,
    _marker: PhantomData<T>,
}

// Same as `Box<T>`: the referent is not aliased.
unsafe impl<T: Send> Send for ExclusiveOwner<T> {}
unsafe impl<T: Sync> Sync for ExclusiveOwner<T> {}

impl<T> ExclusiveOwner<T> {
    #[inline(always)]
    pub const fn null() -> Self {
        Self {
            ptr: ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn new(value: T) -> Self {
        Self::from(Box::new(value))
    }

    /// Takes ownership of `ptr`, which may be null.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from [`Box::into_raw`] and must not be owned
    /// by anything else.
    #[inline(always)]
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Returns the owned pointer without affecting its lifetime.
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

    #[inline(always)]
    pub fn as_mut(&mut self) -> Option<&mut T> {
        unsafe { self.ptr.as_mut() }
    }

    /// Gives up ownership without freeing. The owner becomes null and the
    /// caller becomes responsible for the returned pointer.
    #[inline]
    #[must_use = "the released pointer is leaked if it is not used"]
    pub fn release(&mut self) -> *mut T {
        mem::replace(&mut self.ptr, ptr::null_mut())
    }

    #[inline]
    #[must_use = "the released pointer is leaked if it is not used"]
    pub fn into_raw(mut self) -> *mut T {
        self.release()
    }

    /// Converts back into a `Box`, or `None` for a null owner.
    #[inline]
    pub fn into_box(self) -> Option<Box<T>> {
        let ptr = self.into_raw();
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(ptr) })
        }
    }

    /// Frees the owned value, if any. The owner becomes null.
    #[inline]
    pub fn reset(&mut self) {
        unsafe { self.replace(ptr::null_mut()) };
    }

    /// Frees the owned value, if any, and owns `value` instead.
    #[inline]
    pub fn reset_with(&mut self, value: T) {
        unsafe { self.replace(Box::into_raw(Box::new(value))) };
    }

    /// Frees the owned value, if any, and takes ownership of `ptr`.
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
            panic!("ExclusiveOwner: {e}");
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
        self.replace(ptr);
        Ok(())
    }

    /// Moves ownership out, leaving this owner null.
    #[inline]
    pub fn take(&mut self) -> Self {
        mem::replace(self, Self::null())
    }

    /// Frees the owned value, if any, then moves ownership out of `src`.
    /// `src` becomes null.
    #[inline]
    pub fn move_from(&mut self, src: &mut Self) {
        *self = src.take();
    }

    /// Installs `ptr` before freeing the old value, so that a panicking
    /// destructor never leaves `self` dangling.
    #[inline]
    unsafe fn replace(&mut self, ptr: *mut T) {
        let old = mem::replace(&mut self.ptr, ptr);
        if !old.is_null() {
            drop(Box::from_raw(old));
        }
    }
}

impl<T> Drop for ExclusiveOwner<T> {
    #[inline(always)]
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            drop(unsafe { Box::from_raw(self.ptr) });
        }
    }
}

impl<T> Deref for ExclusiveOwner<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        match self.as_ref() {
            Some(value) => value,
            None => panic!("dereferenced a null ExclusiveOwner"),
        }
    }
}

impl<T> DerefMut for ExclusiveOwner<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        match self.as_mut() {
            Some(value) => value,
            None => panic!("dereferenced a null ExclusiveOwner"),
        }
    }
}

impl<T> Default for ExclusiveOwner<T> {
    #[inline(always)]
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Box<T>> for ExclusiveOwner<T> {
    #[inline]
    fn from(value: Box<T>) -> Self {
        unsafe { Self::from_raw(Box::into_raw(value)) }
    }
}

impl<T> fmt::Debug for ExclusiveOwner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ExclusiveOwner").field(&self.ptr).finish()
    }
}

impl<T> fmt::Pointer for ExclusiveOwner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}
