//! Control blocks: the per-resource bookkeeping units behind [`Shared`] and
//! [`Observer`] handles.
//!
//! Every managed resource is tracked by exactly one block. The block records
//! how many owning and observing handles exist and knows, through two dispatch
//! slots in its header, how to destroy the resource and how to free its own
//! allocation. Two block shapes exist behind the same header:
//!
//! - [`EmbeddedBlock`]: the resource lives inline in the block, so a single
//!   heap allocation serves both the value and its metadata.
//! - [`BoxedBlock`]: the resource was allocated separately (adopted from a
//!   `Box` or a raw pointer) and the block records how to release it.
//!
//! Dispatch goes through monomorphized function pointers rather than a trait
//! object, which keeps every handle one machine pointer wide regardless of the
//! block shape behind it.
//!
//! # Lifetime invariants
//!
//! - The resource is alive iff `strong > 0`.
//! - The block memory is alive iff `strong + weak > 0`.
//! - `destroy` runs exactly once, on the strong `1 -> 0` transition, and
//!   happens-before `dealloc`, which also runs exactly once.
//!
//! [`Shared`]: crate::Shared
//! [`Observer`]: crate::Observer

use std::cell::{Cell, UnsafeCell};
use std::mem::MaybeUninit;
use std::ptr::NonNull;

/// Shape-independent prefix of every control block.
///
/// Handles hold a `NonNull<Header>` and never see the concrete block type;
/// the `destroy` and `dealloc` slots recover it.
pub(crate) struct Header {
    strong: Cell<usize>,
    weak: Cell<usize>,
    /// Destroys the managed resource without freeing the block memory.
    destroy: unsafe fn(*mut Header),
    /// Frees the block allocation itself. The resource must already be
    /// destroyed when this runs.
    dealloc: unsafe fn(*mut Header),
}

impl Header {
    /// Header for a block created together with its first owning handle.
    fn new(destroy: unsafe fn(*mut Header), dealloc: unsafe fn(*mut Header)) -> Header {
        Header {
            strong: Cell::new(1),
            weak: Cell::new(0),
            destroy,
            dealloc,
        }
    }

    /// Header for a block whose value is written after allocation. The block
    /// starts with no owners and a single weak unit held by the construction
    /// observer, so a promotion attempt during initialization fails cleanly
    /// instead of exposing an uninitialized value.
    fn new_deferred(destroy: unsafe fn(*mut Header), dealloc: unsafe fn(*mut Header)) -> Header {
        Header {
            strong: Cell::new(0),
            weak: Cell::new(1),
            destroy,
            dealloc,
        }
    }

    /// Number of owning handles currently sharing the resource.
    #[inline]
    pub(crate) fn strong(&self) -> usize {
        self.strong.get()
    }

    /// Claims one more strong unit. The caller must already own one.
    #[inline]
    pub(crate) fn acquire_strong(&self) {
        debug_assert!(self.strong.get() > 0);
        self.strong.set(self.strong.get() + 1);
    }

    /// Attempts to claim a strong unit, validating liveness first. Fails iff
    /// the resource has already been destroyed (strong count is zero).
    #[inline]
    pub(crate) fn try_acquire_strong(&self) -> bool {
        let strong = self.strong.get();
        if strong == 0 {
            return false;
        }
        self.strong.set(strong + 1);
        true
    }

    /// Claims one more weak unit.
    #[inline]
    pub(crate) fn acquire_weak(&self) {
        self.weak.set(self.weak.get() + 1);
    }

    /// Claims the first strong unit after deferred initialization. The value
    /// must be fully written before this is called.
    #[inline]
    pub(crate) fn claim_first_strong(&self) {
        debug_assert_eq!(self.strong.get(), 0);
        self.strong.set(1);
    }
}

/// Releases one strong unit. On the `1 -> 0` transition this destroys the
/// resource and, once no observers remain, frees the block.
///
/// A transient weak unit guards the block while the resource destructor runs:
/// the dying resource may hold the last observer of its own block (a
/// self-registration slot), and dropping that observer must not free the
/// memory the destructor is still running inside of.
///
/// # Safety
///
/// `block` must point to a live block header, and the caller must own the
/// strong unit being released.
pub(crate) unsafe fn release_strong(block: NonNull<Header>) {
    let header = unsafe { block.as_ref() };
    let strong = header.strong.get() - 1;
    header.strong.set(strong);
    if strong > 0 {
        return;
    }

    header.weak.set(header.weak.get() + 1);
    let destroy = header.destroy;
    unsafe { destroy(block.as_ptr()) };

    // The guard kept the header alive through the destructor; re-read the
    // weak count, since the destructor may have dropped observers.
    let header = unsafe { block.as_ref() };
    let weak = header.weak.get() - 1;
    header.weak.set(weak);
    if weak == 0 {
        let dealloc = header.dealloc;
        unsafe { dealloc(block.as_ptr()) };
    }
}

/// Releases one weak unit, freeing the block iff the combined count reaches
/// zero.
///
/// # Safety
///
/// `block` must point to a live block header, and the caller must own the
/// weak unit being released.
pub(crate) unsafe fn release_weak(block: NonNull<Header>) {
    let header = unsafe { block.as_ref() };
    let weak = header.weak.get() - 1;
    header.weak.set(weak);
    if weak == 0 && header.strong.get() == 0 {
        let dealloc = header.dealloc;
        unsafe { dealloc(block.as_ptr()) };
    }
}

/// Control block with the managed value stored inline: one allocation holds
/// both the bookkeeping and the value.
#[repr(C)]
pub(crate) struct EmbeddedBlock<T> {
    header: Header,
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> EmbeddedBlock<T> {
    /// Allocates a block with the value written in place. Returns the header
    /// pointer and the address of the embedded value.
    pub(crate) fn allocate(value: T) -> (NonNull<Header>, *const T) {
        let block = Box::new(EmbeddedBlock {
            header: Header::new(Self::destroy, Self::dealloc),
            value: UnsafeCell::new(MaybeUninit::new(value)),
        });
        let block = NonNull::from(Box::leak(block));
        let value = unsafe { (*block.as_ref().value.get()).as_ptr() };
        (block.cast(), value)
    }

    /// Allocates a block whose value slot is left uninitialized, kept alive
    /// by a construction-time weak unit. The caller must write the value
    /// through the returned pointer before claiming the first strong unit.
    pub(crate) fn allocate_deferred() -> (NonNull<Header>, *mut T) {
        let block = Box::new(EmbeddedBlock {
            header: Header::new_deferred(Self::destroy, Self::dealloc),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        });
        let block = NonNull::from(Box::leak(block));
        let value = unsafe { (*block.as_ref().value.get()).as_mut_ptr() };
        (block.cast(), value)
    }

    unsafe fn destroy(header: *mut Header) {
        let block = header as *mut EmbeddedBlock<T>;
        unsafe { (*(*block).value.get()).assume_init_drop() };
    }

    unsafe fn dealloc(header: *mut Header) {
        drop(unsafe { Box::from_raw(header as *mut EmbeddedBlock<T>) });
    }
}

/// Control block for a resource that was allocated separately; destroying the
/// resource releases that allocation, while the block itself lives on until
/// the last observer is gone.
#[repr(C)]
pub(crate) struct BoxedBlock<T> {
    header: Header,
    resource: *mut T,
}

impl<T> BoxedBlock<T> {
    /// Allocates a block taking ownership of `resource`. The pointer must
    /// originate from `Box::into_raw`.
    pub(crate) fn allocate(resource: *mut T) -> NonNull<Header> {
        let block = Box::new(BoxedBlock {
            header: Header::new(Self::destroy, Self::dealloc),
            resource,
        });
        NonNull::from(Box::leak(block)).cast()
    }

    unsafe fn destroy(header: *mut Header) {
        let block = header as *mut BoxedBlock<T>;
        drop(unsafe { Box::from_raw((*block).resource) });
    }

    unsafe fn dealloc(header: *mut Header) {
        drop(unsafe { Box::from_raw(header as *mut BoxedBlock<T>) });
    }
}
