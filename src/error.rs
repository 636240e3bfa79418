use std::mem;

use thiserror::Error;

/// A rejected `try_reset_raw`. The owner is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResetError {
    /// The new pointer is the one the owner already holds. Accepting it would
    /// free the value while it is still owned.
    #[error("reset to the currently owned pointer {ptr:#x}")]
    SelfReset { ptr: usize },
}

impl ResetError {
    /// Rejects a non-null `new` equal to `current`.
    ///
    /// Zero-sized values all live at the same dangling address and are never
    /// deallocated, so for them an equal pointer is not the same value.
    #[inline]
    pub(crate) fn check<T>(current: *mut T, new: *mut T) -> Result<(), Self> {
        if mem::size_of::<T>() != 0 && !new.is_null() && new == current {
            Err(ResetError::SelfReset {
                ptr: new as usize,
            })
        } else {
            Ok(())
        }
    }
}
