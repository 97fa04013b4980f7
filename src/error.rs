//! # Kernel Result Codes
//!
//! Every kernel call reports through [`Result`]. There are no panics on the
//! scheduling paths: pool exhaustion and bad arguments come back as
//! [`Error::Fail`], and a blocking call that resumes too late comes back as
//! [`Error::DeadlineReached`] after it has otherwise completed.

use core::fmt;

/// Failure reported by a kernel operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A pool is exhausted or an argument is invalid.
    Fail,
    /// A mailbox still holds messages and cannot be removed.
    NotEmpty,
    /// The caller was resumed after its own deadline had passed.
    ///
    /// This is a real-time signal, not a fault: the operation has run to
    /// completion and the caller decides how to recover.
    DeadlineReached,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Fail => f.write_str("resource exhausted or invalid argument"),
            Error::NotEmpty => f.write_str("mailbox still holds messages"),
            Error::DeadlineReached => f.write_str("deadline reached before resumption"),
        }
    }
}

/// Result type used across the kernel API.
pub type Result<T> = core::result::Result<T, Error>;
