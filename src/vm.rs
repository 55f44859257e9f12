//! The hugetlb test buffer and the mmap plumbing beneath it.
//!
//! [`HugeRegion`] owns one `MAP_HUGETLB` mapping and releases it page by
//! page from the high-address end, which is the order that exercises the
//! kernel's surplus retirement. The raw syscalls sit behind [`VmOps`] so the
//! lifecycle driver can run against plain anonymous memory in tests.

use std::fmt;
use std::io;
use std::marker::PhantomData;
use std::ptr::NonNull;

use fixedbitset::FixedBitSet;

use crate::error::{CheckError, Result};

/// Abstract interface for the two syscalls the test buffer needs.
pub trait VmOps {
    /// Map `len` bytes of anonymous read-write memory.
    unsafe fn map(len: usize) -> io::Result<NonNull<u8>>;

    /// Unmap `len` bytes starting at `ptr`.
    unsafe fn unmap(ptr: NonNull<u8>, len: usize) -> io::Result<()>;
}

/// Real syscalls; mappings come from the hugetlb pool via `MAP_HUGETLB`.
pub struct PlatformVmOps;

impl VmOps for PlatformVmOps {
    unsafe fn map(len: usize) -> io::Result<NonNull<u8>> {
        // Safety: FFI call to mmap.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_HUGETLB,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned null"))
    }

    unsafe fn unmap(ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        // Safety: FFI call to munmap.
        if unsafe { libc::munmap(ptr.as_ptr().cast::<libc::c_void>(), len) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

/// One owned huge-page mapping of `pages` pages of `page_bytes` each.
///
/// Pages are released strictly from the top of the address range, so the
/// live pages always form a prefix of the original region. The bitset
/// records which pages are still mapped and guards against releasing a page
/// twice; whatever remains live is unmapped on drop.
pub struct HugeRegion<V: VmOps = PlatformVmOps> {
    base: NonNull<u8>,
    page_bytes: usize,
    live: FixedBitSet,
    _vm: PhantomData<V>,
}

impl<V: VmOps> HugeRegion<V> {
    /// Map a fresh region covering `pages` pages of `page_bytes` each.
    ///
    /// Rejects empty regions up front; mmap would refuse a zero length
    /// anyway, and a zero page size would make every page offset alias the
    /// base address.
    pub fn map(pages: usize, page_bytes: usize) -> Result<Self> {
        if pages == 0 || page_bytes == 0 {
            return Err(CheckError::Map {
                len: 0,
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty huge page region"),
            });
        }
        let len = pages
            .checked_mul(page_bytes)
            .ok_or(CheckError::RegionTooLarge { pages, page_bytes })?;

        // Safety: len is a non-zero multiple of page_bytes.
        let base = unsafe { V::map(len) }.map_err(|source| CheckError::Map { len, source })?;

        let mut live = FixedBitSet::with_capacity(pages);
        live.insert_range(..);

        Ok(Self {
            base,
            page_bytes,
            live,
            _vm: PhantomData,
        })
    }

    /// Fault in every live page with a one-byte volatile write at its start.
    ///
    /// This is what converts a reservation into real backing; the write is
    /// volatile so the store cannot be elided.
    pub fn touch_pages(&mut self) {
        for index in self.live.ones() {
            // Safety: the bit is set, so the page at this offset is still
            // mapped read-write and inside the original region.
            unsafe {
                self.base.as_ptr().add(index * self.page_bytes).write_volatile(1);
            }
        }
    }

    /// Unmap the highest still-mapped page and return its index.
    ///
    /// # Panics
    /// Panics if every page has already been released; callers drive the
    /// release loop off [`Self::mapped_pages`].
    pub fn release_top(&mut self) -> Result<usize> {
        let Some(index) = self.live.ones().last() else {
            panic!("no mapped pages left to release");
        };
        let offset = index * self.page_bytes;

        // Safety: the bit for `index` is set, so base + offset is a mapped
        // page inside the original region and cannot be null.
        let page = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) };
        // Safety: the page is mapped and exactly page_bytes long.
        unsafe { V::unmap(page, self.page_bytes) }
            .map_err(|source| CheckError::Unmap { index, source })?;

        self.live.set(index, false);
        Ok(index)
    }

    /// Pages still mapped.
    #[must_use]
    pub fn mapped_pages(&self) -> usize {
        self.live.count_ones(..)
    }

    /// Start of the mapping; stays valid while any page is live.
    #[must_use]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }
}

// Not derived: a derive would demand `V: Debug` through the phantom
// parameter.
impl<V: VmOps> fmt::Debug for HugeRegion<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HugeRegion")
            .field("base", &self.base)
            .field("page_bytes", &self.page_bytes)
            .field("mapped_pages", &self.mapped_pages())
            .finish()
    }
}

impl<V: VmOps> Drop for HugeRegion<V> {
    fn drop(&mut self) {
        // Errors cannot propagate out of drop; a failed munmap leaves the
        // page to die with the address space.
        for index in self.live.ones() {
            let offset = index * self.page_bytes;
            // Safety: the bit is set, so this page is still mapped.
            let page = unsafe { NonNull::new_unchecked(self.base.as_ptr().add(offset)) };
            // Safety: the page is mapped and exactly page_bytes long.
            let _ = unsafe { V::unmap(page, self.page_bytes) };
        }
    }
}

/// Plain anonymous mappings, no hugetlb pool required. Sub-range munmap
/// works the same way, so release-from-the-top behaves as in production.
#[cfg(test)]
pub(crate) struct MockVm;

#[cfg(test)]
impl VmOps for MockVm {
    unsafe fn map(len: usize) -> io::Result<NonNull<u8>> {
        // Safety: FFI call to mmap.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(ptr.cast::<u8>()).ok_or_else(|| io::Error::other("mmap returned null"))
    }

    unsafe fn unmap(ptr: NonNull<u8>, len: usize) -> io::Result<()> {
        // Safety: forwarded FFI call to munmap.
        unsafe { PlatformVmOps::unmap(ptr, len) }
    }
}
