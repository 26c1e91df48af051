//! Owning handle over a reference-counted resource.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::{self, NonNull};

use crate::block::{self, BoxedBlock, EmbeddedBlock, Header};
use crate::error::{Error, Result};
use crate::observer::Observer;

/// A shared-ownership handle.
///
/// Every live `Shared` owns one strong unit of its control block; the resource
/// is destroyed when the last strong unit is released, and the block memory is
/// freed once no [`Observer`] handles remain either.
///
/// The value pointer is tracked separately from the block, so a handle may
/// point at the block's embedded value, at a sub-object of it (see
/// [`project`](Shared::project)), or at any other address whose lifetime is
/// tied to the managed resource (see [`alias`](Shared::alias)).
///
/// A `Shared` may also be *empty* (no block, no value); [`Shared::empty`],
/// [`Default`] and [`take`](Shared::take) produce that state. Counters are
/// plain cells, so handles are neither `Send` nor `Sync`.
pub struct Shared<T> {
    block: Option<NonNull<Header>>,
    value: *const T,
    _owns: PhantomData<T>,
}

impl<T> Shared<T> {
    /// Creates a handle over `value`, storing it inline in the control block.
    ///
    /// This is the preferred construction path: a single heap allocation
    /// serves both the value and its bookkeeping.
    pub fn new(value: T) -> Shared<T> {
        let (block, value) = EmbeddedBlock::allocate(value);
        Shared {
            block: Some(block),
            value,
            _owns: PhantomData,
        }
    }

    /// Creates a handle over a value that needs an [`Observer`] of itself
    /// during construction.
    ///
    /// `f` receives an observer of the allocation before the value exists;
    /// promoting it inside `f` fails with a dangling-observer condition, but
    /// it may be cloned into the value being built and promoted later.
    pub fn new_cyclic(f: impl FnOnce(&Observer<T>) -> T) -> Shared<T> {
        let (block, slot) = EmbeddedBlock::<T>::allocate_deferred();
        // Owns the construction weak unit; if `f` panics, dropping it frees
        // the block without touching the unwritten value.
        let observer = Observer::from_parts(Some(block), slot as *const T);

        let value = f(&observer);
        unsafe { slot.write(value) };
        unsafe { block.as_ref() }.claim_first_strong();

        Shared {
            block: Some(block),
            value: slot,
            _owns: PhantomData,
        }
    }

    /// Creates a handle adopting an already-boxed value. The box's allocation
    /// is kept and released when the last owner is gone; the control block is
    /// a second, separate allocation.
    pub fn from_box(boxed: Box<T>) -> Shared<T> {
        let value = Box::into_raw(boxed);
        let block = BoxedBlock::allocate(value);
        Shared {
            block: Some(block),
            value,
            _owns: PhantomData,
        }
    }

    /// Creates a handle adopting a raw allocation.
    ///
    /// Ownership of `value` transfers unconditionally.
    ///
    /// # Safety
    ///
    /// `value` must originate from `Box::into_raw` and must not be adopted by
    /// any other handle, freed, or used as owned elsewhere afterwards.
    /// Adopting the same pointer twice produces a double free.
    pub unsafe fn from_raw(value: *mut T) -> Shared<T> {
        debug_assert!(!value.is_null());
        let block = BoxedBlock::allocate(value);
        Shared {
            block: Some(block),
            value,
            _owns: PhantomData,
        }
    }

    /// Creates an empty handle: no block, no value.
    pub fn empty() -> Shared<T> {
        Shared {
            block: None,
            value: ptr::null(),
            _owns: PhantomData,
        }
    }

    pub(crate) fn from_parts(block: Option<NonNull<Header>>, value: *const T) -> Shared<T> {
        Shared {
            block,
            value,
            _owns: PhantomData,
        }
    }

    pub(crate) fn block(&self) -> Option<NonNull<Header>> {
        self.block
    }

    /// Returns a reference to the value, or `None` for an empty handle.
    #[inline]
    pub fn get(&self) -> Option<&T> {
        if self.value.is_null() {
            None
        } else {
            Some(unsafe { &*self.value })
        }
    }

    /// Returns the raw value pointer (null for an empty handle). The pointer
    /// is valid for as long as any owning handle of this resource lives.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.value
    }

    /// Number of owning handles currently sharing this resource, zero for an
    /// empty handle.
    #[inline]
    pub fn use_count(&self) -> usize {
        self.block
            .map_or(0, |block| unsafe { block.as_ref() }.strong())
    }

    /// Returns `true` iff the handle points at no value.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.value.is_null()
    }

    /// Releases this handle's ownership and leaves it empty.
    pub fn reset(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe { block::release_strong(block) };
        }
        self.value = ptr::null();
    }

    /// Moves the handle out, leaving `self` empty.
    pub fn take(&mut self) -> Shared<T> {
        std::mem::take(self)
    }

    /// Creates a non-owning [`Observer`] of this resource.
    pub fn observer(&self) -> Observer<T> {
        if let Some(block) = self.block {
            unsafe { block.as_ref() }.acquire_weak();
        }
        Observer::from_parts(self.block, self.value)
    }

    /// Creates a handle that shares this handle's ownership lifetime but
    /// points at `value`.
    ///
    /// The aliasing handle counts as a full owner: the managed resource stays
    /// alive as long as it does, even though dereferencing it yields an
    /// unrelated address. Aliasing an empty handle yields an empty handle.
    ///
    /// # Safety
    ///
    /// `value` must stay valid for reads until the last owning handle of this
    /// resource is gone.
    pub unsafe fn alias<U>(&self, value: *const U) -> Shared<U> {
        match self.block {
            Some(block) => {
                unsafe { block.as_ref() }.acquire_strong();
                Shared {
                    block: self.block,
                    value,
                    _owns: PhantomData,
                }
            }
            None => Shared::empty(),
        }
    }

    /// Creates a handle to a part of the managed value, sharing this handle's
    /// ownership lifetime.
    ///
    /// The projection keeps the whole resource alive while only exposing the
    /// projected address. Projecting an empty handle yields an empty handle.
    pub fn project<U>(&self, f: impl FnOnce(&T) -> &U) -> Shared<U> {
        match self.get() {
            Some(value) => {
                let projected: *const U = f(value);
                unsafe { self.alias(projected) }
            }
            None => Shared::empty(),
        }
    }

    /// Returns `true` iff both handles expose the same physical address,
    /// regardless of their apparent value types.
    pub fn ptr_eq<U>(&self, other: &Shared<U>) -> bool {
        self.value.cast::<u8>() == other.value.cast::<u8>()
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Shared<T> {
        if let Some(block) = self.block {
            unsafe { block.as_ref() }.acquire_strong();
        }
        Shared {
            block: self.block,
            value: self.value,
            _owns: PhantomData,
        }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block {
            unsafe { block::release_strong(block) };
        }
    }
}

impl<T> Default for Shared<T> {
    fn default() -> Shared<T> {
        Shared::empty()
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics when the handle is empty. Use [`Shared::get`] for the
    /// non-panicking form.
    fn deref(&self) -> &T {
        self.get().expect("dereferenced an empty handle")
    }
}

impl<T> From<T> for Shared<T> {
    fn from(value: T) -> Shared<T> {
        Shared::new(value)
    }
}

impl<T> From<Box<T>> for Shared<T> {
    fn from(boxed: Box<T>) -> Shared<T> {
        Shared::from_box(boxed)
    }
}

/// The strict promotion form: fails with a dangling-observer error when the
/// resource is already destroyed. [`Observer::promote`] is the silent form.
impl<T> TryFrom<&Observer<T>> for Shared<T> {
    type Error = Error;

    fn try_from(observer: &Observer<T>) -> Result<Shared<T>> {
        let block = observer
            .block()
            .ok_or_else(|| Error::dangling("observer promotion"))?;
        // Liveness must be validated before the count mutates.
        if !unsafe { block.as_ref() }.try_acquire_strong() {
            return Err(Error::dangling("observer promotion"));
        }
        Ok(Shared::from_parts(Some(block), observer.value_ptr()))
    }
}

/// Identity comparison of the exposed value addresses, not of control blocks:
/// two aliased handles to the same address compare equal.
impl<T> PartialEq for Shared<T> {
    fn eq(&self, other: &Shared<T>) -> bool {
        ptr::eq(self.value, other.value)
    }
}

impl<T> Eq for Shared<T> {}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("value", &self.value)
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Tally {
        drops: Rc<Cell<usize>>,
        payload: u32,
    }

    impl Tally {
        fn new(drops: &Rc<Cell<usize>>, payload: u32) -> Tally {
            Tally {
                drops: drops.clone(),
                payload,
            }
        }
    }

    impl Drop for Tally {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn test_factory_construction() {
        let handle = Shared::new(42u32);
        assert_eq!(*handle, 42);
        assert_eq!(handle.use_count(), 1);
        assert!(!handle.is_empty());
    }

    #[test]
    fn test_clone_shares_ownership() {
        let drops = Rc::new(Cell::new(0));
        let a = Shared::new(Tally::new(&drops, 7));
        let b = a.clone();
        assert_eq!(a.use_count(), 2);
        assert_eq!(b.use_count(), 2);
        assert!(a.ptr_eq(&b));
        drop(a);
        assert_eq!(b.use_count(), 1);
        assert_eq!(drops.get(), 0);
        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_take_leaves_source_empty() {
        let a = Shared::new(5i64);
        let mut b = a.clone();
        let c = b.take();
        assert!(b.is_empty());
        assert_eq!(b.use_count(), 0);
        assert_eq!(a.use_count(), 2);
        assert_eq!(*c, 5);
    }

    #[test]
    fn test_reset_releases_ownership() {
        let drops = Rc::new(Cell::new(0));
        let mut a = Shared::new(Tally::new(&drops, 1));
        let b = a.clone();
        a.reset();
        assert!(a.is_empty());
        assert_eq!(drops.get(), 0);
        assert_eq!(b.use_count(), 1);
        // Resetting an already-empty handle is a no-op.
        a.reset();
        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_from_box_adopts_allocation() {
        let drops = Rc::new(Cell::new(0));
        let boxed = Box::new(Tally::new(&drops, 3));
        let a = Shared::from_box(boxed);
        assert_eq!(a.payload, 3);
        let b = a.clone();
        drop(a);
        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_from_raw_adopts_allocation() {
        let drops = Rc::new(Cell::new(0));
        let raw = Box::into_raw(Box::new(Tally::new(&drops, 4)));
        let a = unsafe { Shared::from_raw(raw) };
        assert_eq!(a.use_count(), 1);
        drop(a);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_new_cyclic_hands_out_observer() {
        struct Node {
            this: Observer<Node>,
            label: &'static str,
        }

        let node = Shared::new_cyclic(|this| {
            assert!(this.promote().is_none());
            Node {
                this: this.clone(),
                label: "root",
            }
        });
        assert_eq!(node.use_count(), 1);
        let again = node.this.promote().expect("alive");
        assert_eq!(again.label, "root");
        assert_eq!(node.use_count(), 2);
        assert!(node.ptr_eq(&again));
    }

    #[test]
    fn test_equality_is_value_address_identity() {
        let a = Shared::new(10u8);
        let b = a.clone();
        let c = Shared::new(10u8);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(Shared::<u8>::empty(), Shared::empty());
    }

    #[test]
    fn test_project_keeps_aggregate_alive() {
        struct Pair {
            left: Tally,
            right: u64,
        }

        let drops = Rc::new(Cell::new(0));
        let pair = Shared::new(Pair {
            left: Tally::new(&drops, 0),
            right: 99,
        });
        let right = pair.project(|p| &p.right);
        assert_eq!(pair.use_count(), 2);
        assert_eq!(right.use_count(), 2);
        assert!(!pair.ptr_eq(&right));

        drop(pair);
        // The projection still owns the aggregate.
        assert_eq!(drops.get(), 0);
        assert_eq!(*right, 99);
        drop(right);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn test_project_left_field_shares_address() {
        #[repr(C)]
        struct Pair {
            left: u16,
            _right: u16,
        }

        let pair = Shared::new(Pair {
            left: 1,
            _right: 2,
        });
        let left = pair.project(|p| &p.left);
        // The first field lives at the aggregate's own address.
        assert!(pair.ptr_eq(&left));
        assert_eq!(*left, 1);
    }

    #[test]
    fn test_empty_handle_observers() {
        let empty = Shared::<String>::empty();
        assert!(empty.is_empty());
        assert!(empty.get().is_none());
        assert!(empty.as_ptr().is_null());
        assert_eq!(empty.use_count(), 0);
        assert!(empty.clone().is_empty());
        assert!(empty.project(|s| s.as_str()).is_empty());
    }

    #[test]
    #[should_panic(expected = "dereferenced an empty handle")]
    fn test_deref_of_empty_handle_panics() {
        let empty = Shared::<u32>::empty();
        let _ = *empty;
    }
}
