//! Address ranges and page alignment.

/// A raw memory location in the current process.
///
/// The crate does not know what an address refers to and tracks no ownership for it.
pub type Address = usize;

/// A process id as understood by the host OS.
pub type ProcessId = u32;

/// A byte range `[addr, addr + len)` to protect or copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    /// First byte of the range
    pub addr: Address,
    /// Number of bytes in the range
    pub len: usize,
}

impl Region {
    /// Create a region starting at `addr` spanning `len` bytes.
    pub const fn new(addr: Address, len: usize) -> Self {
        Self { addr, len }
    }

    /// Offset of `addr` inside its page.
    pub const fn alignment(&self, page_size: usize) -> usize {
        self.addr % page_size
    }

    /// The region moved back to the start of its first page.
    ///
    /// The start moves back by [`alignment`][Self::alignment] and the length grows by the same
    /// amount, so the result always contains `self`. The end is left where it was: protection
    /// syscalls round the length up to whole pages themselves.
    ///
    /// Returns `None` when `self` runs past the end of the address space.
    pub const fn page_aligned(&self, page_size: usize) -> Option<Self> {
        if self.addr.checked_add(self.len).is_none() {
            return None;
        }
        let alignment = self.alignment(page_size);
        match self.len.checked_add(alignment) {
            Some(len) => Some(Self {
                addr: self.addr - alignment,
                len,
            }),
            None => None,
        }
    }

    /// One past the last byte.
    pub const fn end(&self) -> Address {
        self.addr.wrapping_add(self.len)
    }

    /// Whether `other` lies entirely inside `self`.
    pub const fn contains(&self, other: &Region) -> bool {
        other.addr >= self.addr && other.end() <= self.end()
    }
}
