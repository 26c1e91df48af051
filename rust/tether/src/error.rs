//! Error surface of the crate.
//!
//! Exactly one recoverable condition exists: promoting an [`Observer`] whose
//! resource has already been destroyed. Every other misuse (double adoption of
//! a raw pointer, aliasing to an address outside the resource's lifetime) is
//! a violation of an `unsafe` contract, not a handled error.
//!
//! [`Observer`]: crate::Observer

use thiserror::Error;

/// Error raised by the fallible operations of this crate.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

/// `Result` alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    /// Consumes the error, returning its kind.
    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Creates a dangling-observer error for the given operation context.
    pub fn dangling(context: impl Into<String>) -> Error {
        Error(
            ErrorKind::DanglingObserver {
                context: context.into(),
            }
            .into(),
        )
    }
}

/// Specific error conditions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An observer handle was promoted after the resource it observes was
    /// destroyed (or before any owning handle ever existed).
    #[error("dangling observer in '{context}': the resource is already destroyed")]
    DanglingObserver { context: String },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}
