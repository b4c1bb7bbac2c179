//! Page-granular memory chunks.
//!
//! A chunk reserves a virtual address range up front and commits pages
//! lazily in page-size multiples; nothing is handed back to the OS until
//! the chunk is torn down. Allocators bump inside committed space.

use std::io;

/// A reserved, lazily committed virtual memory region.
pub struct MemoryChunk {
    base: *mut u8,
    size: usize,
    committed: usize,
}

// Chunk access is serialized behind the heap lock.
unsafe impl Send for MemoryChunk {}

impl MemoryChunk {
    /// The OS page size.
    pub fn page_size() -> usize {
        #[cfg(unix)]
        {
            use once_cell::sync::Lazy;
            static PAGE_SIZE: Lazy<usize> =
                Lazy::new(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize });
            *PAGE_SIZE
        }
        #[cfg(not(unix))]
        {
            4096
        }
    }

    /// Round `size` up to a page multiple.
    pub fn page_align(size: usize) -> usize {
        let page = Self::page_size();
        size.div_ceil(page) * page
    }

    /// Reserve `size` bytes (rounded up to whole pages) without
    /// committing any of them.
    pub fn reserve(size: usize) -> io::Result<Self> {
        let size = Self::page_align(size.max(1));

        #[cfg(unix)]
        {
            let base = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    size,
                    libc::PROT_NONE,
                    libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                    -1,
                    0,
                )
            };
            if base == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            Ok(Self {
                base: base as *mut u8,
                size,
                committed: 0,
            })
        }

        #[cfg(not(unix))]
        {
            // Fallback: commit-tracking over an ordinary allocation.
            let layout = std::alloc::Layout::from_size_align(size, Self::page_size())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let base = unsafe { std::alloc::alloc_zeroed(layout) };
            if base.is_null() {
                return Err(io::Error::new(io::ErrorKind::OutOfMemory, "reserve failed"));
            }
            Ok(Self {
                base,
                size,
                committed: 0,
            })
        }
    }

    /// Commit `size` more bytes (a page multiple) at the top of the
    /// committed region.
    pub fn commit(&mut self, size: usize) -> io::Result<()> {
        assert_eq!(size % Self::page_size(), 0, "commit size not page aligned");
        assert!(
            self.committed + size <= self.size,
            "commit exceeds reservation"
        );

        #[cfg(unix)]
        {
            let at = unsafe { self.base.add(self.committed) };
            let result = unsafe {
                libc::mprotect(
                    at as *mut libc::c_void,
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                )
            };
            if result != 0 {
                return Err(io::Error::last_os_error());
            }
        }

        self.committed += size;
        Ok(())
    }

    /// Give back `size` bytes (a page multiple) from the top of the
    /// committed region; the reservation itself stays.
    pub fn release(&mut self, size: usize) {
        assert_eq!(size % Self::page_size(), 0, "release size not page aligned");
        assert!(size <= self.committed, "release exceeds committed");

        #[cfg(unix)]
        unsafe {
            let at = self.base.add(self.committed - size);
            libc::mprotect(at as *mut libc::c_void, size, libc::PROT_NONE);
        }

        self.committed -= size;
    }

    pub fn base(&self) -> *mut u8 {
        self.base
    }

    pub fn reserved(&self) -> usize {
        self.size
    }

    pub fn committed(&self) -> usize {
        self.committed
    }
}

impl Drop for MemoryChunk {
    fn drop(&mut self) {
        #[cfg(unix)]
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.size);
        }

        #[cfg(not(unix))]
        unsafe {
            let layout =
                std::alloc::Layout::from_size_align_unchecked(self.size, Self::page_size());
            std::alloc::dealloc(self.base, layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        let page = MemoryChunk::page_size();
        assert!(page.is_power_of_two());
    }

    #[test]
    fn test_reserve_rounds_to_pages() {
        let chunk = MemoryChunk::reserve(1).unwrap();
        assert_eq!(chunk.reserved(), MemoryChunk::page_size());
        assert_eq!(chunk.committed(), 0);
    }

    #[test]
    fn test_commit_and_write() {
        let page = MemoryChunk::page_size();
        let mut chunk = MemoryChunk::reserve(page * 4).unwrap();

        chunk.commit(page).unwrap();
        assert_eq!(chunk.committed(), page);

        // committed memory is readable and writable
        unsafe {
            chunk.base().write(0xAB);
            assert_eq!(chunk.base().read(), 0xAB);
            chunk.base().add(page - 1).write(0xCD);
        }

        chunk.commit(page * 2).unwrap();
        assert_eq!(chunk.committed(), page * 3);
    }

    #[test]
    fn test_release_shrinks_committed() {
        let page = MemoryChunk::page_size();
        let mut chunk = MemoryChunk::reserve(page * 2).unwrap();
        chunk.commit(page * 2).unwrap();
        chunk.release(page);
        assert_eq!(chunk.committed(), page);
    }

    #[test]
    #[should_panic(expected = "commit exceeds reservation")]
    fn test_commit_past_reservation_panics() {
        let page = MemoryChunk::page_size();
        let mut chunk = MemoryChunk::reserve(page).unwrap();
        chunk.commit(page * 2).unwrap();
    }
}
