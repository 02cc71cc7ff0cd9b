//! Utilities to manipulate memory protection, mappings and tracer status.
//!
//! Every operation of this crate eventually reaches the operating system through one of the
//! functions of [`CodeManipulator`]. The platform implementation lives in [`crate::os`] as
//! [`ArchCodeManipulator`][crate::os::ArchCodeManipulator]; the generic `*_with` entry points
//! accept any other implementation, which is how the page arithmetic is tested without touching
//! real memory.

use std::io;

use crate::Address;

/// OS-level requests needed to patch code in the running process.
///
/// All functions are stateless. Addresses handed to [`protect_rwx`][Self::protect_rwx] and
/// [`unmap`][Self::unmap] are already page aligned by the caller.
pub trait CodeManipulator {
    /// Size of a memory page in bytes.
    fn page_size() -> usize;

    /// Grant read, write and execute permission on `[addr, addr + length)`.
    fn protect_rwx(addr: Address, length: usize) -> io::Result<()>;

    /// Map `length` bytes of anonymous, private memory with read, write and execute permission.
    fn map_rwx(length: usize) -> io::Result<Address>;

    /// Unmap `[addr, addr + length)`.
    ///
    /// # Safety
    ///
    /// The range must not be in use anymore, including by code currently executing in it.
    unsafe fn unmap(addr: Address, length: usize) -> io::Result<()>;

    /// Make the bytes written to `[addr, addr + length)` visible to instruction fetch.
    ///
    /// # Safety
    ///
    /// The range must be mapped.
    unsafe fn flush_instruction_cache(addr: Address, length: usize) -> io::Result<()>;

    /// Request tracer status over `pid`.
    #[cfg(feature = "attach")]
    fn attach(pid: crate::ProcessId) -> io::Result<()>;
}
