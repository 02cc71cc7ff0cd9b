//! macOS-specific implementations

use std::{io, ptr, sync::OnceLock};

use mach2::{
    kern_return::KERN_SUCCESS,
    traps::mach_task_self,
    vm::mach_vm_protect,
    vm_prot::{VM_PROT_COPY, VM_PROT_EXECUTE, VM_PROT_READ, VM_PROT_WRITE},
};

use crate::{code_manipulate::CodeManipulator, Address};

/// Arch-specific [`CodeManipulator`] using [`mach2`] for protection changes and [`libc`] for the rest.
pub struct ArchCodeManipulator;

// Apple Silicon refuses writable and executable anonymous mappings without MAP_JIT.
#[cfg(target_arch = "aarch64")]
const MAP_RWX_EXTRA_FLAGS: libc::c_int = libc::MAP_JIT;
#[cfg(not(target_arch = "aarch64"))]
const MAP_RWX_EXTRA_FLAGS: libc::c_int = 0;

impl CodeManipulator for ArchCodeManipulator {
    fn page_size() -> usize {
        static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
        *PAGE_SIZE.get_or_init(|| match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
            size if size > 0 => size as usize,
            _ => 16384,
        })
    }

    fn protect_rwx(addr: Address, length: usize) -> io::Result<()> {
        // Text pages are mapped with a maximum protection lacking write, VM_PROT_COPY
        // asks for a private writable copy instead.
        let res = unsafe {
            mach_vm_protect(
                mach_task_self(),
                addr as u64,
                length as u64,
                0,
                VM_PROT_READ | VM_PROT_WRITE | VM_PROT_EXECUTE | VM_PROT_COPY,
            )
        };
        if res != KERN_SUCCESS {
            return Err(io::Error::other(format!("mach_vm_protect returned {res}")));
        }
        Ok(())
    }

    fn map_rwx(length: usize) -> io::Result<Address> {
        let space = unsafe {
            libc::mmap(
                ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANON | MAP_RWX_EXTRA_FLAGS,
                -1,
                0,
            )
        };
        if space == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(space as Address)
    }

    unsafe fn unmap(addr: Address, length: usize) -> io::Result<()> {
        let res = unsafe { libc::munmap(addr as *mut libc::c_void, length) };
        if res != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    unsafe fn flush_instruction_cache(addr: Address, length: usize) -> io::Result<()> {
        let start = addr as *const u8;
        let end = addr.wrapping_add(length) as *const u8;
        if !unsafe { clear_cache::clear_cache(start, end) } {
            return Err(io::Error::other("unable to clear instruction cache"));
        }
        Ok(())
    }

    #[cfg(feature = "attach")]
    fn attach(pid: crate::ProcessId) -> io::Result<()> {
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        let res = unsafe { libc::ptrace(libc::PT_ATTACHEXC, pid, ptr::null_mut(), 0) };
        if res == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
