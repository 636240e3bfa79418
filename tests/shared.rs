use smart_owners::{ResetError, SharedOwner};

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

/// Counts how many times it has been dropped.
struct Tracked {
    value: i32,
    drops: Rc<Cell<usize>>,
}

impl Tracked {
    fn new(value: i32, drops: &Rc<Cell<usize>>) -> Self {
        Self {
            value,
            drops: drops.clone(),
        }
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}

#[test]
fn copies_share_value_and_compare_equal() {
    let shared1 = unsafe { SharedOwner::<i32>::from_raw(Box::into_raw(Box::new(5))) };
    let shared2 = shared1.clone();
    assert_eq!(*shared1, *shared2);
    assert_eq!(shared1, shared2);
    assert_eq!(shared1.get(), shared2.get());
}

#[test]
fn reset_on_one_copy_keeps_the_other() {
    let mut shared1 = SharedOwner::<i32>::new(5);
    let shared2 = shared1.clone();
    shared1.reset();
    assert_eq!(shared1.get(), ptr::null_mut());
    assert_eq!(*shared2, 5);
    assert_eq!(shared2.use_count(), 1);
    assert_eq!(shared1.use_count(), 0);
}

#[test]
fn unique_until_copied() {
    let shared1 = SharedOwner::<i32>::new(5);
    let is_unique1 = shared1.unique();
    let shared2 = shared1.clone();
    let is_unique2 = shared1.unique();
    assert!(is_unique1);
    assert!(!is_unique2);
    assert!(!shared2.unique());

    drop(shared2);
    assert!(shared1.unique());
    assert!(!SharedOwner::<i32>::null().unique());
}

#[test]
fn copy_increments_count() {
    let shared1 = SharedOwner::<i32>::new(5);
    let shared2 = shared1.clone();
    assert_eq!(shared1.use_count(), 2);
    assert_eq!(shared2.use_count(), 2);
}

#[test]
fn scoped_copy_restores_count() {
    let mut shared1 = SharedOwner::<i32>::new(5);
    {
        assert_eq!(shared1.use_count(), 1);
        let _shared2 = shared1.clone();
        assert_eq!(shared1.use_count(), 2);
    }
    assert_eq!(shared1.use_count(), 1);
    shared1.reset();
    assert_eq!(shared1.use_count(), 0);
}

#[test]
fn null_chain_has_no_count() {
    let mut shared1 = unsafe { SharedOwner::<i32>::from_raw(ptr::null_mut()) };
    let shared2 = shared1.clone();
    assert_eq!(shared1.use_count(), 0);
    assert_eq!(shared2.use_count(), 0);

    let shared3 = shared1.take();
    assert_eq!(shared3.use_count(), 0);
    assert_eq!(shared1.use_count(), 0);
    assert!(shared3.as_ref().is_none());
}

#[test]
#[should_panic(expected = "dereferenced a null SharedOwner")]
fn deref_null_panics() {
    let shared1 = SharedOwner::<i32>::null();
    let shared2 = shared1.clone();
    let _value: i32 = *shared2;
}

#[test]
fn take_transfers_block_without_counting() {
    let shared1 = SharedOwner::<i32>::new(5);
    let mut shared2 = shared1.clone();
    let raw = shared2.get();

    let shared3 = shared2.take();
    assert_eq!(shared2.use_count(), 0);
    assert!(shared2.is_null());
    assert_eq!(shared3.get(), raw);
    assert_eq!(shared3.use_count(), 2);
    assert_eq!(shared1.use_count(), 2);
}

#[test]
fn move_from_releases_previous_claim() {
    let drops = Rc::new(Cell::new(0));
    let mut dst = SharedOwner::<Tracked>::new(Tracked::new(1, &drops));
    let keep = SharedOwner::<Tracked>::new(Tracked::new(2, &drops));
    let mut src = keep.clone();

    // `dst` was the only owner of its value.
    dst.move_from(&mut src);
    assert_eq!(drops.get(), 1);
    assert!(src.is_null());
    assert_eq!(src.use_count(), 0);
    assert_eq!(dst, keep);
    assert_eq!(dst.use_count(), 2);

    // Now `dst` shares with `keep`, so moving over it only detaches.
    let mut other = SharedOwner::<Tracked>::new(Tracked::new(3, &drops));
    dst.move_from(&mut other);
    assert_eq!(drops.get(), 1);
    assert_eq!(keep.use_count(), 1);
    assert_eq!(dst.value, 3);
    assert_eq!(dst.use_count(), 1);

    drop(dst);
    drop(keep);
    assert_eq!(drops.get(), 3);
}

#[test]
fn clone_from_releases_previous_claim() {
    let drops = Rc::new(Cell::new(0));
    let source = SharedOwner::<Tracked>::new(Tracked::new(1, &drops));
    let mut dst = SharedOwner::<Tracked>::new(Tracked::new(2, &drops));

    dst.clone_from(&source);
    assert_eq!(drops.get(), 1);
    assert_eq!(dst, source);
    assert_eq!(source.use_count(), 2);

    // Same block: nothing changes.
    dst.clone_from(&source);
    assert_eq!(source.use_count(), 2);

    dst.clone_from(&SharedOwner::null());
    assert!(dst.is_null());
    assert_eq!(source.use_count(), 1);
    assert_eq!(drops.get(), 1);
}

#[test]
fn last_owner_frees_exactly_once() {
    let drops = Rc::new(Cell::new(0));
    let shared1 = SharedOwner::<Tracked>::new(Tracked::new(5, &drops));
    let copies = (0..10).map(|_| shared1.clone()).collect::<Vec<_>>();
    assert_eq!(shared1.use_count(), 11);

    drop(copies);
    assert_eq!(drops.get(), 0);
    assert_eq!(shared1.use_count(), 1);

    drop(shared1);
    assert_eq!(drops.get(), 1);
}

#[test]
fn reset_non_unique_gets_fresh_block() {
    let drops = Rc::new(Cell::new(0));
    let mut shared1 = SharedOwner::<Tracked>::new(Tracked::new(1, &drops));
    let shared2 = shared1.clone();

    let raw = Box::into_raw(Box::new(Tracked::new(2, &drops)));
    unsafe { shared1.reset_raw(raw) };
    assert_eq!(drops.get(), 0);
    assert_eq!(shared1.get(), raw);
    assert_eq!(shared1.use_count(), 1);
    assert_eq!(shared2.use_count(), 1);
    assert_eq!(shared2.value, 1);
    assert_ne!(shared1, shared2);

    shared1.reset_with(Tracked::new(3, &drops));
    assert_eq!(drops.get(), 1);
    assert_eq!(shared1.value, 3);
}

#[test]
fn self_reset_is_rejected() {
    let mut shared1 = SharedOwner::<i32>::new(5);
    let shared2 = shared1.clone();
    let raw = shared1.get();

    let err = unsafe { shared1.try_reset_raw(raw) }.unwrap_err();
    assert_eq!(err, ResetError::SelfReset { ptr: raw as usize });
    assert_eq!(shared1.use_count(), 2);
    assert_eq!(*shared2, 5);
}

#[test]
#[should_panic(expected = "reset to the currently owned pointer")]
fn self_reset_panics() {
    let mut shared1 = SharedOwner::<i32>::new(5);
    let raw = shared1.get();
    unsafe { shared1.reset_raw(raw) };
}

#[test]
fn get_mut_only_when_unique() {
    let mut shared1 = SharedOwner::<i32>::new(5);
    *shared1.get_mut().unwrap() += 1;
    assert_eq!(*shared1, 6);

    let shared2 = shared1.clone();
    assert!(shared1.get_mut().is_none());
    drop(shared2);
    assert!(shared1.get_mut().is_some());
    assert!(SharedOwner::<i32>::null().get_mut().is_none());
}

#[test]
fn end_to_end() {
    let mut a = SharedOwner::<i32>::new(5);
    assert_eq!(a.use_count(), 1);

    let b = a.clone();
    assert_eq!(a.use_count(), 2);
    assert_eq!(b.use_count(), 2);
    assert_eq!(*a, 5);
    assert_eq!(*b, 5);

    a.reset();
    assert!(a.get().is_null());
    assert_eq!(*b, 5);
    assert_eq!(b.use_count(), 1);
}

/// A value whose destructor panics.
struct Bomb(u8);

impl Drop for Bomb {
    fn drop(&mut self) {
        panic!("bomb {} dropped", self.0);
    }
}

#[test]
fn panicking_drop_leaves_owner_null() {
    let mut owner = SharedOwner::<Bomb>::new(Bomb(1));
    let result = panic::catch_unwind(AssertUnwindSafe(|| owner.reset()));
    assert!(result.is_err());
    assert!(owner.is_null());
    assert_eq!(owner.use_count(), 0);
}

#[test]
fn only_the_last_owner_runs_a_panicking_drop() {
    let mut a = SharedOwner::<Bomb>::new(Bomb(2));
    let mut b = a.clone();
    a.reset();
    assert_eq!(b.use_count(), 1);

    let result = panic::catch_unwind(AssertUnwindSafe(|| b.reset()));
    assert!(result.is_err());
    assert!(b.is_null());
}

#[derive(Debug, PartialEq)]
struct Unit;

#[test]
fn zero_sized_reset_takes_distinct_box() {
    let mut owner = SharedOwner::<Unit>::new(Unit);
    let keep = owner.clone();
    let raw = Box::into_raw(Box::new(Unit));
    assert_eq!(owner.get(), raw);

    assert!(unsafe { owner.try_reset_raw(raw) }.is_ok());
    assert!(owner.unique());
    assert!(keep.unique());
    assert_eq!(*owner, Unit);
}

#[test]
fn zero_sized_owners_compare_equal() {
    let a = SharedOwner::<Unit>::new(Unit);
    let b = SharedOwner::<Unit>::new(Unit);
    assert!(a == b);
    assert_eq!(a.use_count(), 1);
    assert_eq!(b.use_count(), 1);
}
