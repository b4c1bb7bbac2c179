//! Runtime memory management for the Mason build-script language.
//!
//! The GC heap lives here: reserved page-granular chunks, object-headed
//! bump allocation, rootset tracking across threads and the cooperative
//! tricolor tracing interface. The shipped collector allocates only;
//! real collectors plug in behind [`gc::Allocator`].

pub mod gc;

pub use gc::{
    allocate, write_barrier, Allocator, FailReason, GcError, GcHeap, GcOptions, GcRef, GcValue,
    Generation, GlobalHandle, LocalHandle, Mark, MemoryChunk, NoopAllocator, ObjectHeader,
    Region, Rootable, Trace, Tracer, TriggerReason, NOOP_GC, OBJECT_ALIGNMENT,
};
