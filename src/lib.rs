#![doc = include_str!("../docs/README.md")]

pub mod code_manipulate;
mod error;
mod exec_alloc;
mod hexdump;
pub mod os;
mod patch;
mod protect;
mod region;
mod transfer;

#[cfg(feature = "attach")]
mod attach;

#[cfg(feature = "attach")]
pub use attach::{attach, attach_with};
pub use error::MemoryError;
pub use exec_alloc::{allocate, allocate_with, free, free_with, ExecutableBlock};
pub use hexdump::hexdump;
pub use patch::{patch, patch_with, Patch};
pub use protect::{unprotect, unprotect_with};
pub use region::{Address, ProcessId, Region};
pub use transfer::{copy, get, put, write_code, write_code_with};

/// Size of a memory page of the running system, queried once.
pub fn page_size() -> usize {
    use code_manipulate::CodeManipulator;

    os::ArchCodeManipulator::page_size()
}

/// Whether the running process uses 64-bit pointers.
///
/// Trampoline generators need this to pick the width of absolute addresses they embed.
pub const fn is_64_bit() -> bool {
    cfg!(target_pointer_width = "64")
}
