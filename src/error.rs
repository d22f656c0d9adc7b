//! Typed failure kinds shared by every facility operation.
//!
//! Every registry or parsing failure is returned synchronously as one of
//! these kinds; nothing in this crate aborts the process.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = core::result::Result<T, Error>;

/// Failure kinds for facility operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// An entry with the requested name is already registered.
    #[error("an entry with that name already exists")]
    AlreadyExists,

    /// No matching entry, or no pending command in the session slot.
    #[error("no matching entry or pending command")]
    NotFound,

    /// The version string does not match the registered entry.
    #[error("version string does not match the registered entry")]
    VersionMismatch,

    /// Malformed command text or out-of-range argument.
    #[error("malformed command or invalid argument")]
    InvalidArgument,

    /// The caller's destination buffer cannot hold the full payload.
    #[error("destination buffer is too small for the payload")]
    InsufficientBuffer,

    /// Allocation failed while creating an entry; nothing was registered.
    #[error("allocation failed")]
    OutOfMemory,

    /// The command keyword is not recognized.
    #[error("unrecognized command")]
    NotImplemented,

    /// The final byte transfer to the caller's memory failed. The source
    /// data structure is left intact so the transfer can be retried.
    #[error("failed to transfer bytes to the caller")]
    TransferFault,
}
