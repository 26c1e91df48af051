//! Non-owning handle that can be promoted back to an owner.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

use crate::block::{self, Header};
use crate::shared::Shared;

/// A non-owning observer of a reference-counted resource.
///
/// An `Observer` keeps the control block alive (it owns one weak unit) but
/// never keeps the resource itself alive and never dereferences its value
/// pointer. To reach the value it must first be promoted to a [`Shared`]
/// handle via [`promote`](Observer::promote) (silent) or
/// `Shared::try_from(&observer)` (strict).
pub struct Observer<T> {
    block: Option<NonNull<Header>>,
    value: *const T,
    _marker: PhantomData<T>,
}

impl<T> Observer<T> {
    /// Creates an empty observer, observing nothing.
    pub fn new() -> Observer<T> {
        Observer {
            block: None,
            value: ptr::null(),
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_parts(block: Option<NonNull<Header>>, value: *const T) -> Observer<T> {
        Observer {
            block,
            value,
            _marker: PhantomData,
        }
    }

    pub(crate) fn block(&self) -> Option<NonNull<Header>> {
        self.block
    }

    pub(crate) fn value_ptr(&self) -> *const T {
        self.value
    }

    /// Returns `true` iff this observer holds no block at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.block.is_none()
    }

    /// Returns `true` iff the observed resource is gone: the observer is
    /// empty, or the resource has already been destroyed.
    #[inline]
    pub fn expired(&self) -> bool {
        self.block
            .is_none_or(|block| unsafe { block.as_ref() }.strong() == 0)
    }

    /// Number of owning handles currently sharing the observed resource,
    /// zero once expired.
    #[inline]
    pub fn use_count(&self) -> usize {
        self.block
            .map_or(0, |block| unsafe { block.as_ref() }.strong())
    }

    /// Attempts to promote this observer into an owning handle.
    ///
    /// Returns `None` once the resource has been destroyed; after that point
    /// no promotion of this observer (or any clone of it) ever succeeds
    /// again.
    pub fn promote(&self) -> Option<Shared<T>> {
        Shared::try_from(self).ok()
    }

    /// Stops observing and leaves the observer empty.
    pub fn reset(&mut self) {
        if let Some(block) = self.block.take() {
            unsafe { block::release_weak(block) };
        }
        self.value = ptr::null();
    }

    /// Moves the observer out, leaving `self` empty.
    pub fn take(&mut self) -> Observer<T> {
        std::mem::take(self)
    }
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Observer<T> {
        if let Some(block) = self.block {
            unsafe { block.as_ref() }.acquire_weak();
        }
        Observer {
            block: self.block,
            value: self.value,
            _marker: PhantomData,
        }
    }
}

impl<T> Drop for Observer<T> {
    fn drop(&mut self) {
        if let Some(block) = self.block {
            unsafe { block::release_weak(block) };
        }
    }
}

impl<T> Default for Observer<T> {
    fn default() -> Observer<T> {
        Observer::new()
    }
}

/// Demotion: observing an owning handle never affects its strong count.
impl<T> From<&Shared<T>> for Observer<T> {
    fn from(shared: &Shared<T>) -> Observer<T> {
        shared.observer()
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("value", &self.value)
            .field("use_count", &self.use_count())
            .field("expired", &self.expired())
            .finish()
    }
}
