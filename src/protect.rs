//! Making code regions writable.

use std::io;

use crate::{
    code_manipulate::CodeManipulator, error::MemoryError, os::ArchCodeManipulator, Address, Region,
};

/// Make `[addr, addr + len)` readable, writable and executable.
///
/// Protection can only be changed per page, so the request is widened to start at the page
/// containing `addr`: the span handed to the OS is `[addr - alignment, addr + len)` where
/// `alignment = addr % page_size`. A zero `len` still issues the request for the alignment-only
/// span. A request running past the end of the address space is refused with
/// [`MemoryError::Protect`] without reaching the OS.
///
/// The previous protection is not recorded and never restored. Callers that need W^X must
/// re-tighten the pages themselves. The whole pages become writable, including whatever else
/// lives on them.
///
/// On macOS the request carries `VM_PROT_COPY`: a shared or file-backed mapping is replaced by a
/// private copy of its pages. Later writes are then only visible to this process, and changes
/// made to the shared mapping by anyone else are no longer seen through these pages.
pub fn unprotect(addr: Address, len: usize) -> Result<(), MemoryError> {
    unprotect_with::<ArchCodeManipulator>(addr, len)
}

/// [`unprotect`] through a custom [`CodeManipulator`].
pub fn unprotect_with<M: CodeManipulator>(
    addr: Address,
    len: usize,
) -> Result<(), MemoryError> {
    let page_size = M::page_size();
    let Some(aligned) = Region::new(addr, len).page_aligned(page_size) else {
        let alignment = addr % page_size;
        log::warn!(
            "Unprotect of {:#x} bytes at {:#x} runs past the address space",
            len,
            addr
        );
        return Err(MemoryError::Protect {
            addr: addr - alignment,
            len,
            source: io::Error::from(io::ErrorKind::InvalidInput),
        });
    };
    log::debug!(
        "Disabling memory protection from {:#x} ({:#x} bytes, page span {:#x}+{:#x})",
        addr,
        len,
        aligned.addr,
        aligned.len
    );
    M::protect_rwx(aligned.addr, aligned.len).map_err(|source| {
        log::warn!("Unprotect failed at {:#x}: {}", aligned.addr, source);
        MemoryError::Protect {
            addr: aligned.addr,
            len: aligned.len,
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::unprotect_with;
    use crate::{
        code_manipulate::fake::{take_requests, RecordingManipulator, RefusingManipulator, Request},
        error::MemoryError,
    };

    #[test]
    fn test_unprotect_widens_to_page_start() {
        take_requests();
        unprotect_with::<RecordingManipulator>(0x1000 + 10, 20).unwrap();
        assert_eq!(take_requests(), vec![Request::Protect(0x1000, 30)]);
    }

    #[test]
    fn test_unprotect_zero_length_still_requests() {
        take_requests();
        unprotect_with::<RecordingManipulator>(0x5000 + 0x123, 0).unwrap();
        assert_eq!(take_requests(), vec![Request::Protect(0x5000, 0x123)]);
    }

    #[test]
    fn test_unprotect_overflowing_length_is_refused() {
        take_requests();
        let err = unprotect_with::<RecordingManipulator>(0x1001, usize::MAX).unwrap_err();
        match err {
            MemoryError::Protect { addr, len, source } => {
                assert_eq!(addr, 0x1000);
                assert_eq!(len, usize::MAX);
                assert_eq!(source.kind(), io::ErrorKind::InvalidInput);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(take_requests().is_empty());
    }

    #[test]
    fn test_unprotect_refusal_is_reported() {
        let err = unprotect_with::<RefusingManipulator>(0x4000 + 3, 2).unwrap_err();
        match err {
            MemoryError::Protect { addr, len, source } => {
                assert_eq!(addr, 0x4000);
                assert_eq!(len, 5);
                assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
