//! The allocation-only collector.
//!
//! Bump allocation out of two reserved chunks, committing pages on
//! demand; `collect` returns immediately and nothing is ever reclaimed.
//! This is the shipped default; a generational collector replaces it
//! behind the same [`Allocator`] interface.

use std::io;
use std::ptr::NonNull;

use super::alloc::{Allocator, FailReason, GcStatistics, Region, TriggerReason};
use super::chunk::MemoryChunk;
use super::header::{Generation, ObjectHeader, OBJECT_ALIGNMENT};
use super::options::GcOptions;

pub struct NoopAllocator {
    heap: MemoryChunk,
    metadata: MemoryChunk,
    /// Bump offsets into each chunk.
    heap_top: usize,
    metadata_top: usize,
    last_fail: FailReason,
}

impl NoopAllocator {
    pub fn create(options: &GcOptions) -> io::Result<Box<dyn Allocator>> {
        Ok(Box::new(Self {
            heap: MemoryChunk::reserve(options.max_heap_size)?,
            metadata: MemoryChunk::reserve(options.max_metadata_size)?,
            heap_top: 0,
            metadata_top: 0,
            last_fail: FailReason::None,
        }))
    }

    /// Header plus payload, padded to the object alignment.
    fn calibrate(size: usize) -> usize {
        let payload = size.div_ceil(OBJECT_ALIGNMENT) * OBJECT_ALIGNMENT;
        OBJECT_ALIGNMENT + payload
    }

    fn bump(
        chunk: &mut MemoryChunk,
        top: &mut usize,
        size: usize,
        total: usize,
    ) -> Option<NonNull<u8>> {
        if *top + total > chunk.reserved() {
            return None;
        }

        // Commit further pages on demand.
        if *top + total > chunk.committed() {
            let needed = MemoryChunk::page_align(*top + total - chunk.committed());
            chunk.commit(needed).ok()?;
        }

        let header_ptr = unsafe { chunk.base().add(*top) } as *mut ObjectHeader;
        unsafe {
            header_ptr.write(ObjectHeader::new(size));
        }
        *top += total;

        let payload = unsafe { ObjectHeader::to_payload(header_ptr) };
        NonNull::new(payload)
    }
}

impl Allocator for NoopAllocator {
    fn allocate(&mut self, size: usize, region: Region) -> Option<NonNull<u8>> {
        let total = Self::calibrate(size);

        let payload = match region {
            Region::Main => Self::bump(&mut self.heap, &mut self.heap_top, size, total),
            Region::Metadata => {
                Self::bump(&mut self.metadata, &mut self.metadata_top, size, total)
            }
        };

        if payload.is_none() {
            self.last_fail = FailReason::OutOfMemory;
        }
        payload
    }

    fn collect(&mut self, _generation: Generation, _reason: TriggerReason) {
        // allocation only; nothing to reclaim
    }

    fn has_pending_gc(&self) -> bool {
        false
    }

    fn last_fail_reason(&self) -> FailReason {
        self.last_fail
    }

    fn statistics(&self) -> GcStatistics {
        GcStatistics {
            max_pool_size: self.heap.reserved(),
            max_metadata_size: self.metadata.reserved(),
            heap_used: self.heap_top,
            metadata_used: self.metadata_top,
        }
    }
}
