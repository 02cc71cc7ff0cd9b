//! Error types for hookmem.

use std::io;

use thiserror::Error;

use crate::Address;

/// Errors reported by the operations that can fail without faulting.
///
/// Invalid addresses handed to [`copy`][crate::copy], [`put`][crate::put] or [`get`][crate::get]
/// are not reported here: they fault the process.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The OS refused to change the protection of a page span.
    #[error("failed to unprotect {len:#x} bytes at {addr:#x}: {source}")]
    Protect {
        /// Page aligned start of the span that was requested.
        addr: Address,
        /// Length of the span that was requested.
        len: usize,
        source: io::Error,
    },

    /// No executable memory could be mapped.
    #[error("failed to map {len:#x} bytes of executable memory: {source}")]
    Map { len: usize, source: io::Error },

    /// The OS refused to unmap a block.
    #[error("failed to unmap {len:#x} bytes at {addr:#x}: {source}")]
    Unmap {
        addr: Address,
        len: usize,
        source: io::Error,
    },

    /// The instruction cache could not be flushed after a code write.
    #[error("failed to flush instruction cache for {len:#x} bytes at {addr:#x}: {source}")]
    FlushInstructionCache {
        addr: Address,
        len: usize,
        source: io::Error,
    },

    /// The attach request was denied, e.g. because a tracer is already present.
    #[cfg(feature = "attach")]
    #[error("failed to attach to process {pid}: {source}")]
    Attach {
        pid: crate::ProcessId,
        source: io::Error,
    },

    /// The host buffer for a read could not be allocated.
    #[error("failed to allocate a buffer of {len:#x} bytes")]
    BufferAllocation { len: usize },
}
