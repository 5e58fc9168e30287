//! Uniform failure type for every TFS operation.
//!
//! Every fallible operation returns one flat `Error` enum instead of
//! a grab-bag of panics or ad hoc booleans, so callers (and tests) can
//! match on a specific failure kind instead of guessing from a message.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Bad path shape, out-of-range handle or inumber, empty name,
    /// length overflow.
    #[error("invalid argument")]
    InvalidArgument,

    /// No free inode slot, data block, open-file slot, or directory
    /// entry slot.
    #[error("resource exhausted")]
    ResourceExhausted,

    /// Name lookup found no matching entry.
    #[error("not found")]
    NotFound,

    /// A handle's offset exceeds its inode's current size, because
    /// another handle truncated the file out from under it.
    #[error("stale cursor")]
    StaleCursor,

    /// A host synchronization primitive reported failure (e.g. a
    /// poisoned lock).
    #[error("lock primitive failure")]
    LockFailure,
}

pub type Result<T> = core::result::Result<T, Error>;
