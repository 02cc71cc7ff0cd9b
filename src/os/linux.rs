//! Linux and Android implementations

use std::{io, ptr, sync::OnceLock};

use crate::{code_manipulate::CodeManipulator, Address};

/// Arch-specific [`CodeManipulator`] using [`libc`] with `mprotect`, `mmap` and `ptrace`.
pub struct ArchCodeManipulator;

impl CodeManipulator for ArchCodeManipulator {
    fn page_size() -> usize {
        static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
        *PAGE_SIZE.get_or_init(|| match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
            size if size > 0 => size as usize,
            // sysconf cannot really fail for _SC_PAGESIZE
            _ => 4096,
        })
    }

    fn protect_rwx(addr: Address, length: usize) -> io::Result<()> {
        let res = unsafe {
            libc::mprotect(
                addr as *mut libc::c_void,
                length,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
            )
        };
        if res != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn map_rwx(length: usize) -> io::Result<Address> {
        let space = unsafe {
            libc::mmap(
                ptr::null_mut(),
                length,
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
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
        let res = unsafe {
            libc::ptrace(
                libc::PTRACE_ATTACH,
                pid,
                ptr::null_mut::<libc::c_void>(),
                ptr::null_mut::<libc::c_void>(),
            )
        };
        if res == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
