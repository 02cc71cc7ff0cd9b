//! Installing and removing code patches.
//!
//! The primitives of this crate take no locks. Installing a hook is still a sequence of them
//! (unprotect, back up the original bytes, write the new code, flush the instruction cache) and
//! two sequences racing on the same code leave a torn instruction stream behind. [`patch`] and
//! [`Patch::restore`] run the whole sequence while holding one process-wide lock, so patches
//! installed through them never interleave. Callers mixing these with direct calls to
//! [`put`][crate::put] or [`copy`][crate::copy] on the same code must serialize those themselves.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    code_manipulate::CodeManipulator, error::MemoryError, os::ArchCodeManipulator,
    protect::unprotect_with, transfer, Address,
};

static PATCH_LOCK: Mutex<()> = Mutex::new(());

fn lock() -> MutexGuard<'static, ()> {
    // The lock guards no data, a panic while holding it leaves nothing inconsistent.
    PATCH_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Code written over a target, together with the bytes it replaced.
#[derive(Debug)]
#[must_use = "dropping a Patch keeps the code in place but loses the original bytes"]
pub struct Patch {
    addr: Address,
    original: Vec<u8>,
}

impl Patch {
    /// Address the code was written to.
    pub fn addr(&self) -> Address {
        self.addr
    }

    /// The bytes that were at [`addr`][Self::addr] before patching.
    pub fn original(&self) -> &[u8] {
        &self.original
    }

    /// Write the original bytes back and return them.
    ///
    /// # Safety
    ///
    /// The target must still be mapped and writable, and no thread may be executing inside the
    /// patched bytes.
    pub unsafe fn restore(self) -> Result<Vec<u8>, MemoryError> {
        unsafe { self.restore_with::<ArchCodeManipulator>() }
    }

    /// [`restore`][Self::restore] through a custom [`CodeManipulator`].
    ///
    /// # Safety
    ///
    /// See [`restore`][Self::restore].
    pub unsafe fn restore_with<M: CodeManipulator>(self) -> Result<Vec<u8>, MemoryError> {
        let _guard = lock();
        log::debug!(
            "Restoring {:#x} original bytes at {:#x}",
            self.original.len(),
            self.addr
        );
        unprotect_with::<M>(self.addr, self.original.len())?;
        unsafe { transfer::write_code_with::<M>(&self.original, self.addr)? };
        Ok(self.original)
    }
}

/// Write `code` over the bytes at `addr`, keeping a backup of what was there.
///
/// Runs unprotect, backup, write and instruction cache flush under the process-wide patch lock.
/// On error the target holds its original bytes again: a failed flush puts the backup back before
/// the error is returned.
///
/// # Safety
///
/// - `[addr, addr + code.len())` must be mapped memory the process may patch.
/// - No thread may be executing inside that range while it is written.
pub unsafe fn patch(addr: Address, code: &[u8]) -> Result<Patch, MemoryError> {
    unsafe { patch_with::<ArchCodeManipulator>(addr, code) }
}

/// [`patch`] through a custom [`CodeManipulator`].
///
/// # Safety
///
/// See [`patch`].
pub unsafe fn patch_with<M: CodeManipulator>(
    addr: Address,
    code: &[u8],
) -> Result<Patch, MemoryError> {
    let _guard = lock();
    log::debug!("Patching {:#x} bytes at {:#x}", code.len(), addr);
    unprotect_with::<M>(addr, code.len())?;
    let original = unsafe { transfer::get(addr, code.len())? };
    if let Err(err) = unsafe { transfer::write_code_with::<M>(code, addr) } {
        log::warn!("Rolling back patch at {:#x}", addr);
        unsafe { transfer::put(&original, addr) };
        return Err(err);
    }
    Ok(Patch { addr, original })
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::patch_with;
    use crate::{
        code_manipulate::fake::{
            take_requests, RecordingManipulator, RefusingManipulator, Request,
            UnflushableManipulator,
        },
        error::MemoryError,
    };

    #[test]
    #[serial(patch)]
    fn test_patch_backs_up_and_restores() {
        take_requests();
        let mut target = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let addr = target.as_mut_ptr() as usize + 2;

        let patch = unsafe { patch_with::<RecordingManipulator>(addr, &[0xcc, 0xcc, 0xcc]) }
            .unwrap();
        assert_eq!(patch.addr(), addr);
        assert_eq!(patch.original(), &[3, 4, 5]);
        assert_eq!(target, [1, 2, 0xcc, 0xcc, 0xcc, 6, 7, 8]);

        let original = unsafe { patch.restore_with::<RecordingManipulator>() }.unwrap();
        assert_eq!(original, [3, 4, 5]);
        assert_eq!(target, [1, 2, 3, 4, 5, 6, 7, 8]);

        let page = addr - addr % 4096;
        let span = addr % 4096 + 3;
        assert_eq!(
            take_requests(),
            vec![
                Request::Protect(page, span),
                Request::Flush(addr, 3),
                Request::Protect(page, span),
                Request::Flush(addr, 3),
            ]
        );
    }

    #[test]
    #[serial(patch)]
    fn test_patch_stops_when_unprotect_fails() {
        let mut target = [9u8; 4];
        let addr = target.as_mut_ptr() as usize;
        let err = unsafe { patch_with::<RefusingManipulator>(addr, &[0; 4]) }.unwrap_err();
        assert!(matches!(err, MemoryError::Protect { .. }));
        assert_eq!(target, [9; 4]);
    }

    #[test]
    #[serial(patch)]
    fn test_patch_rolls_back_when_flush_fails() {
        let mut target = [1u8, 2, 3, 4];
        let addr = target.as_mut_ptr() as usize;
        let err = unsafe { patch_with::<UnflushableManipulator>(addr, &[9; 4]) }.unwrap_err();
        assert!(matches!(
            err,
            MemoryError::FlushInstructionCache { len: 4, .. }
        ));
        assert_eq!(target, [1, 2, 3, 4]);
    }
}
