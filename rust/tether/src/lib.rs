//! Shared-ownership handles with observer promotion over a single-allocation
//! control block.
//!
//! The crate provides two handle types around one bookkeeping unit:
//!
//! - [`Shared<T>`]: an owning handle. The resource is destroyed exactly once,
//!   when the last owner releases it.
//! - [`Observer<T>`]: a non-owning handle that keeps only the bookkeeping
//!   alive and can attempt promotion back to an owner while the resource
//!   still lives.
//!
//! [`Shared::new`] stores the value inline in the control block, so one heap
//! allocation serves both the value and its metadata. [`Shared::from_box`]
//! and [`Shared::from_raw`] adopt an existing allocation instead. Handles can
//! alias: [`Shared::project`] yields a handle to a sub-object that keeps the
//! whole aggregate alive.
//!
//! Types that embed a [`SelfSlot`] and implement [`SelfReferential`] can mint
//! handles to themselves after construction.
//!
//! Counters are plain (non-atomic) cells: handles are intended for
//! single-threaded sharing and are neither `Send` nor `Sync`.
//!
//! # Example
//!
//! ```
//! use tether::Shared;
//!
//! let a = Shared::new(42u32);
//! let b = a.clone();
//! assert_eq!(a.use_count(), 2);
//!
//! let w = a.observer();
//! drop(a);
//! drop(b);
//! assert!(w.expired());
//! assert!(w.promote().is_none());
//! ```

mod block;
pub mod error;
mod observer;
mod self_ref;
mod shared;

pub use error::{Error, ErrorKind, Result};
pub use observer::Observer;
pub use self_ref::{SelfReferential, SelfSlot};
pub use shared::Shared;
