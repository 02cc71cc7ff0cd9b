//! Scratch executable memory for generated trampolines.

use crate::{
    code_manipulate::CodeManipulator, error::MemoryError, os::ArchCodeManipulator, Address,
};

/// An anonymous mapping that is readable, writable and executable at once.
///
/// A block is created by [`allocate`] and destroyed only by [`free`]. Dropping it does **not**
/// unmap the memory, there is no reference counting and nothing is reclaimed automatically.
/// The block deliberately does not implement `Clone`: handing the same mapping to [`free`] twice
/// requires going through the unsafe [`from_raw_parts`][Self::from_raw_parts].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping an ExecutableBlock leaks the mapping, pass it to `free` instead"]
pub struct ExecutableBlock {
    addr: Address,
    len: usize,
}

impl ExecutableBlock {
    /// Base address of the block.
    pub fn addr(&self) -> Address {
        self.addr
    }

    /// Length the block was created with.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the block spans no bytes. Never true for a block returned by [`allocate`].
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rebuild a block from an address and length obtained through [`into_raw_parts`][Self::into_raw_parts].
    ///
    /// # Safety
    ///
    /// `addr` and `len` must describe exactly one live block returned by [`allocate`], with the
    /// same length it was created with, and that block must not be freed through any other
    /// handle.
    pub unsafe fn from_raw_parts(addr: Address, len: usize) -> Self {
        Self { addr, len }
    }

    /// Give up the handle and return its address and length.
    pub fn into_raw_parts(self) -> (Address, usize) {
        (self.addr, self.len)
    }
}

/// Map `len` bytes of anonymous, process-private memory with read, write and execute permission.
///
/// The memory is writable and executable at the same time, so generated code can be written
/// with [`put`][crate::put] and jumped to without any finalization step. When the OS refuses the
/// mapping (no space, a length of zero or too large) the refusal is logged and returned as
/// [`MemoryError::Map`]; no partially valid address is ever handed out.
pub fn allocate(len: usize) -> Result<ExecutableBlock, MemoryError> {
    allocate_with::<ArchCodeManipulator>(len)
}

/// [`allocate`] through a custom [`CodeManipulator`].
pub fn allocate_with<M: CodeManipulator>(len: usize) -> Result<ExecutableBlock, MemoryError> {
    match M::map_rwx(len) {
        Ok(addr) => {
            log::debug!("Mapped memory of size {:#x} at {:#x}", len, addr);
            Ok(ExecutableBlock { addr, len })
        }
        Err(source) => {
            log::warn!("Mapping {:#x} bytes of executable memory failed: {}", len, source);
            Err(MemoryError::Map { len, source })
        }
    }
}

/// Unmap exactly the range of `block`.
///
/// # Safety
///
/// No thread may still be executing code inside the block, and no pointer into it may be used
/// afterwards.
pub unsafe fn free(block: ExecutableBlock) -> Result<(), MemoryError> {
    unsafe { free_with::<ArchCodeManipulator>(block) }
}

/// [`free`] through a custom [`CodeManipulator`].
///
/// # Safety
///
/// See [`free`].
pub unsafe fn free_with<M: CodeManipulator>(block: ExecutableBlock) -> Result<(), MemoryError> {
    let (addr, len) = block.into_raw_parts();
    log::debug!("Removing mapped memory of size {:#x} at {:#x}", len, addr);
    unsafe { M::unmap(addr, len) }.map_err(|source| {
        log::warn!("Unmapping {:#x} bytes at {:#x} failed: {}", len, addr, source);
        MemoryError::Unmap { addr, len, source }
    })
}
