//! Windows-specific implementations

use std::{ffi::c_void, io, sync::OnceLock};

use windows::Win32::System::{
    Diagnostics::Debug::{DebugActiveProcess, FlushInstructionCache},
    Memory::{
        VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
        PAGE_EXECUTE_READWRITE, PAGE_PROTECTION_FLAGS,
    },
    SystemInformation::{GetSystemInfo, SYSTEM_INFO},
    Threading::GetCurrentProcess,
};

use crate::{code_manipulate::CodeManipulator, Address};

/// Arch-specific [`CodeManipulator`] using `VirtualProtect`, `VirtualAlloc` and `DebugActiveProcess`.
pub struct ArchCodeManipulator;

impl CodeManipulator for ArchCodeManipulator {
    fn page_size() -> usize {
        static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
        *PAGE_SIZE.get_or_init(|| {
            let mut system_info = SYSTEM_INFO::default();
            unsafe {
                GetSystemInfo(&mut system_info);
            }
            system_info.dwPageSize as usize
        })
    }

    fn protect_rwx(addr: Address, length: usize) -> io::Result<()> {
        let mut origin_protect = PAGE_PROTECTION_FLAGS::default();
        unsafe {
            VirtualProtect(
                addr as *const c_void,
                length,
                PAGE_EXECUTE_READWRITE,
                &mut origin_protect,
            )
        }
        .map_err(|_| io::Error::last_os_error())
    }

    fn map_rwx(length: usize) -> io::Result<Address> {
        let space = unsafe {
            VirtualAlloc(
                None,
                length,
                MEM_COMMIT | MEM_RESERVE,
                PAGE_EXECUTE_READWRITE,
            )
        };
        if space.is_null() {
            return Err(io::Error::last_os_error());
        }
        Ok(space as Address)
    }

    /// `MEM_RELEASE` always frees the whole reservation, so `length` only has to be non-zero
    /// to be consistent with the other platforms.
    unsafe fn unmap(addr: Address, length: usize) -> io::Result<()> {
        if length == 0 {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        unsafe { VirtualFree(addr as *mut c_void, 0, MEM_RELEASE) }
            .map_err(|_| io::Error::last_os_error())
    }

    unsafe fn flush_instruction_cache(addr: Address, length: usize) -> io::Result<()> {
        unsafe {
            FlushInstructionCache(GetCurrentProcess(), Some(addr as *const c_void), length)
        }
        .map_err(|_| io::Error::last_os_error())
    }

    #[cfg(feature = "attach")]
    fn attach(pid: crate::ProcessId) -> io::Result<()> {
        unsafe { DebugActiveProcess(pid) }.map_err(|_| io::Error::last_os_error())
    }
}
