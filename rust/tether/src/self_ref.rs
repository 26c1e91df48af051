//! Self-registration: letting a managed value mint handles to itself.
//!
//! A type opts in by embedding a [`SelfSlot`] and implementing
//! [`SelfReferential`]. Construction paths that establish ownership over such
//! a value ([`SelfReferential::into_shared`],
//! [`SelfReferential::boxed_into_shared`], or [`Shared::register`] after a raw
//! adoption) populate the slot with an observer of the new handle. The value
//! can then produce owning or observing handles to itself at any later point.
//!
//! The capability check is a trait bound, resolved at compile time; types
//! without the slot pay nothing.

use std::cell::RefCell;
use std::fmt;

use crate::error::Result;
use crate::observer::Observer;
use crate::shared::Shared;

/// The embedded observer cell of a self-referential value.
///
/// Populated at most once per object, by the first ownership-establishing
/// construction over it. Aliasing and projection constructions never touch
/// the slot.
pub struct SelfSlot<T> {
    slot: RefCell<Observer<T>>,
}

impl<T> SelfSlot<T> {
    /// Creates an unpopulated slot.
    pub fn new() -> SelfSlot<T> {
        SelfSlot {
            slot: RefCell::new(Observer::new()),
        }
    }

    pub(crate) fn bind(&self, handle: &Shared<T>) {
        let mut slot = self.slot.borrow_mut();
        if slot.is_empty() {
            *slot = handle.observer();
        }
    }

    fn shared(&self) -> Result<Shared<T>> {
        Shared::try_from(&*self.slot.borrow())
    }

    fn observer(&self) -> Observer<T> {
        self.slot.borrow().clone()
    }
}

impl<T> Default for SelfSlot<T> {
    fn default() -> SelfSlot<T> {
        SelfSlot::new()
    }
}

impl<T> fmt::Debug for SelfSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelfSlot")
            .field("bound", &!self.slot.borrow().is_empty())
            .finish()
    }
}

/// Capability of a managed value to obtain handles to itself.
///
/// Implementors embed a [`SelfSlot`] field and return it from
/// [`self_slot`](SelfReferential::self_slot); everything else is provided.
pub trait SelfReferential: Sized {
    /// The embedded slot that receives an observer of the first owning
    /// handle.
    fn self_slot(&self) -> &SelfSlot<Self>;

    /// Consumes the value into a [`Shared`] handle with the slot populated.
    /// Single-allocation factory path.
    fn into_shared(self) -> Shared<Self> {
        Shared::new(self).register()
    }

    /// Adopts an already-boxed value into a [`Shared`] handle with the slot
    /// populated.
    fn boxed_into_shared(self: Box<Self>) -> Shared<Self> {
        Shared::from_box(self).register()
    }

    /// Produces an owning handle to this value.
    ///
    /// Fails with a dangling-observer error when called before any owning
    /// handle exists (slot never populated, or populated mid-destruction)
    /// or after all owning handles are gone.
    fn shared_from_self(&self) -> Result<Shared<Self>> {
        self.self_slot().shared()
    }

    /// Produces an observer of this value. Never fails; the result may be
    /// empty or expired.
    fn observer_from_self(&self) -> Observer<Self> {
        self.self_slot().observer()
    }
}

impl<T: SelfReferential> Shared<T> {
    /// Populates the value's self slot with an observer of this handle.
    ///
    /// Needed only after [`Shared::from_raw`] / [`Shared::from_box`] on a
    /// self-referential type; the trait's own construction paths call it
    /// already. A slot that is already populated is left untouched, and an
    /// empty handle registers nothing.
    pub fn register(self) -> Shared<T> {
        if let Some(value) = self.get() {
            value.self_slot().bind(&self);
        }
        self
    }
}
