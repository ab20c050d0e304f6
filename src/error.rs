//! # Kernel Errors
//!
//! Every fallible kernel call returns [`Result`]. Errors never cross task
//! boundaries; each one is surfaced at the offending call and leaves kernel
//! state untouched.

/// Error values surfaced by the kernel API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// A creation argument was rejected (stack too small, zero-sized queue,
    /// mismatched item length, unknown task handle).
    InvalidArgument,
    /// The task arena or the kernel heap is exhausted.
    OutOfMemory,
    /// The operation is not valid in the object's current state
    /// (release above the ceiling, pause of a paused task, resume of a
    /// running one).
    InvalidState,
    /// A non-blocking operation could not proceed. The caller decides
    /// whether to retry, drop, or switch to the blocking variant.
    WouldBlock,
}

/// Kernel result alias.
pub type Result<T> = core::result::Result<T, KernelError>;
