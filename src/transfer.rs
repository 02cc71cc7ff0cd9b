//! Moving bytes between raw addresses and host buffers.
//!
//! These are the only functions of the crate that dereference caller supplied addresses. None of
//! them can detect an invalid address: touching memory that is not mapped, or not writable for
//! [`copy`] and [`put`], faults the process.

use crate::{
    code_manipulate::CodeManipulator, error::MemoryError, hexdump::hexdump, os::ArchCodeManipulator,
    Address,
};

/// Copy `len` bytes from `src` to `dest`.
///
/// This is how a trampoline is written over the entry of a target function, or how the original
/// entry bytes are backed up before patching. A zero `len` returns without touching either address.
///
/// # Safety
///
/// - `[src, src + len)` must be readable and `[dest, dest + len)` writable, usually through a
///   prior [`unprotect`][crate::unprotect].
/// - The ranges may overlap in either direction, the bytes end up as if `src` had been read
///   completely before `dest` was written.
/// - No other thread may execute or modify `[dest, dest + len)` during the copy.
pub unsafe fn copy(src: Address, dest: Address, len: usize) {
    if len == 0 {
        return;
    }
    log::debug!("Copying {:#x} bytes from {:#x} to {:#x}", len, src, dest);
    unsafe { core::ptr::copy(src as *const u8, dest as *mut u8, len) };
}

/// Write every byte of `src` to memory starting at `dest`.
///
/// An empty `src` returns without touching `dest`.
///
/// # Safety
///
/// - `[dest, dest + src.len())` must be writable and must not overlap `src`.
/// - No other thread may execute or modify the destination during the write.
pub unsafe fn put(src: &[u8], dest: Address) {
    if src.is_empty() {
        return;
    }
    log::debug!("Writing {:#x} bytes to {:#x}", src.len(), dest);
    if log::log_enabled!(log::Level::Trace) {
        log::trace!("\n{}", hexdump(src, dest));
    }
    unsafe { core::ptr::copy_nonoverlapping(src.as_ptr(), dest as *mut u8, src.len()) };
}

/// Read `len` bytes starting at `src` into a new buffer.
///
/// Returns [`MemoryError::BufferAllocation`] when the buffer cannot be allocated. A zero `len`
/// returns an empty buffer without touching `src`.
///
/// # Safety
///
/// `[src, src + len)` must be readable.
pub unsafe fn get(src: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(len)
        .map_err(|_| MemoryError::BufferAllocation { len })?;
    if len == 0 {
        return Ok(bytes);
    }
    log::debug!("Reading {:#x} bytes from {:#x}", len, src);
    unsafe {
        core::ptr::copy_nonoverlapping(src as *const u8, bytes.as_mut_ptr(), len);
        bytes.set_len(len);
    }
    if log::log_enabled!(log::Level::Trace) {
        log::trace!("\n{}", hexdump(&bytes, src));
    }
    Ok(bytes)
}

/// [`put`] machine code and make it visible to instruction fetch.
///
/// On architectures with separate instruction and data caches, freshly written code may not be
/// seen by the CPU until the instruction cache is flushed for its range.
///
/// # Safety
///
/// See [`put`].
pub unsafe fn write_code(src: &[u8], dest: Address) -> Result<(), MemoryError> {
    unsafe { write_code_with::<ArchCodeManipulator>(src, dest) }
}

/// [`write_code`] through a custom [`CodeManipulator`].
///
/// # Safety
///
/// See [`put`].
pub unsafe fn write_code_with<M: CodeManipulator>(
    src: &[u8],
    dest: Address,
) -> Result<(), MemoryError> {
    if src.is_empty() {
        return Ok(());
    }
    unsafe {
        put(src, dest);
        M::flush_instruction_cache(dest, src.len())
    }
    .map_err(|source| {
        log::warn!("Instruction cache flush failed at {:#x}: {}", dest, source);
        MemoryError::FlushInstructionCache {
            addr: dest,
            len: src.len(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{copy, get, put, write_code_with};
    use crate::{
        code_manipulate::fake::{take_requests, RecordingManipulator, RefusingManipulator, Request},
        error::MemoryError,
    };

    #[test]
    fn test_copy_between_buffers() {
        let src: Vec<u8> = (0..=255).collect();
        let mut dest = vec![0u8; 256];
        unsafe { copy(src.as_ptr() as usize, dest.as_mut_ptr() as usize, src.len()) };
        assert_eq!(src, dest);
    }

    #[test]
    fn test_copy_partial() {
        let src = [1u8, 2, 3, 4, 5, 6];
        let mut dest = [0u8; 6];
        unsafe { copy(src.as_ptr() as usize + 2, dest.as_mut_ptr() as usize, 3) };
        assert_eq!(dest, [3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn test_copy_overlapping_towards_lower_address() {
        let mut buffer = [1u8, 2, 3, 4, 5, 6];
        let base = buffer.as_mut_ptr() as usize;
        unsafe { copy(base + 2, base, 4) };
        assert_eq!(buffer, [3, 4, 5, 6, 5, 6]);
    }

    #[test]
    fn test_copy_overlapping_towards_higher_address() {
        let mut buffer = [1u8, 2, 3, 4, 5, 6];
        let base = buffer.as_mut_ptr() as usize;
        unsafe { copy(base, base + 2, 4) };
        assert_eq!(buffer, [1, 2, 1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_length_never_touches_memory() {
        // Address 0 is never mapped, any access would fault.
        unsafe {
            copy(0, 0, 0);
            put(&[], 0);
        }
        let bytes = unsafe { get(0, 0) }.unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_put_then_get() {
        let mut target = [0u8; 8];
        let addr = target.as_mut_ptr() as usize;
        unsafe { put(&[0xde, 0xad, 0xbe, 0xef], addr + 2) };
        let bytes = unsafe { get(addr, 8) }.unwrap();
        assert_eq!(bytes, [0, 0, 0xde, 0xad, 0xbe, 0xef, 0, 0]);
    }

    #[test]
    fn test_get_reports_buffer_allocation_failure() {
        // The reservation fails before anything is read.
        let err = unsafe { get(0, usize::MAX) }.unwrap_err();
        assert!(matches!(err, MemoryError::BufferAllocation { len: usize::MAX }));
    }

    #[test]
    fn test_write_code_flushes_written_range() {
        take_requests();
        let mut target = [0u8; 4];
        let addr = target.as_mut_ptr() as usize;
        unsafe { write_code_with::<RecordingManipulator>(&[0x90; 4], addr) }.unwrap();
        assert_eq!(target, [0x90; 4]);
        assert_eq!(take_requests(), vec![Request::Flush(addr, 4)]);
    }

    #[test]
    fn test_write_code_empty_is_noop() {
        take_requests();
        unsafe { write_code_with::<RefusingManipulator>(&[], 0) }.unwrap();
        assert!(take_requests().is_empty());
    }

    #[test]
    fn test_write_code_reports_flush_failure() {
        let mut target = [0u8; 2];
        let addr = target.as_mut_ptr() as usize;
        let err = unsafe { write_code_with::<RefusingManipulator>(&[1, 2], addr) }.unwrap_err();
        assert!(matches!(
            err,
            MemoryError::FlushInstructionCache { len: 2, .. }
        ));
        assert_eq!(target, [1, 2]);
    }
}
