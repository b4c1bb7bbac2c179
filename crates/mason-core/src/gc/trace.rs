//! Cooperative tracing.
//!
//! Objects implement [`Trace`] and visit every owned GC reference;
//! the [`Tracer`] drives tricolor marking: visiting turns a white
//! header gray and queues it, draining blackens. Collection is done
//! when no gray objects remain.

use super::header::{Mark, ObjectHeader};

/// A GC-managed reference: the payload pointer of an allocation.
pub type GcRef = *mut u8;

/// Implemented by objects that own GC references.
pub trait Trace {
    fn trace(&self, tracer: &mut Tracer);
}

/// An external root: anything registered with the heap that must be
/// treated as live.
pub trait Rootable: Send + Sync {
    fn trace(&self, tracer: &mut Tracer);
}

/// A value slot: either an immediate or an object reference. Slots are
/// trace entry points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GcValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Ref(GcRef),
}

impl GcValue {
    pub fn is_ref(&self) -> bool {
        matches!(self, GcValue::Ref(_))
    }
}

impl Trace for GcValue {
    fn trace(&self, tracer: &mut Tracer) {
        if let GcValue::Ref(ptr) = self {
            tracer.visit(*ptr);
        }
    }
}

impl Default for GcValue {
    fn default() -> Self {
        GcValue::None
    }
}

/// Drives tricolor marking over object headers.
#[derive(Default)]
pub struct Tracer {
    gray: Vec<GcRef>,
    visited: usize,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reachable reference: a white object turns gray and is
    /// queued for scanning.
    pub fn visit(&mut self, payload: GcRef) {
        if payload.is_null() {
            return;
        }

        unsafe {
            let header = ObjectHeader::from_payload(payload);
            if (*header).mark() == Mark::White {
                (*header).set_mark(Mark::Gray);
                self.gray.push(payload);
                self.visited += 1;
            }
        }
    }

    /// Scan queued objects until no gray remains. `scan` receives each
    /// object and visits its children through the tracer.
    pub fn drain(&mut self, mut scan: impl FnMut(GcRef, &mut Tracer)) {
        while let Some(payload) = self.gray.pop() {
            unsafe {
                (*ObjectHeader::from_payload(payload)).set_mark(Mark::Black);
            }
            scan(payload, self);
        }
    }

    /// Objects marked so far.
    pub fn visited(&self) -> usize {
        self.visited
    }

    /// Remaining gray objects.
    pub fn pending(&self) -> usize {
        self.gray.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::alloc::{Allocator, Region};
    use crate::gc::chunk::MemoryChunk;
    use crate::gc::noop::NoopAllocator;
    use crate::gc::options::GcOptions;

    fn allocator() -> Box<dyn Allocator> {
        NoopAllocator::create(&GcOptions::with_sizes(
            MemoryChunk::page_size() * 4,
            MemoryChunk::page_size(),
        ))
        .unwrap()
    }

    fn mark_of(payload: GcRef) -> Mark {
        unsafe { (*ObjectHeader::from_payload(payload)).mark() }
    }

    #[test]
    fn test_visit_turns_white_gray() {
        let mut allocator = allocator();
        let payload = allocator.allocate(16, Region::Main).unwrap().as_ptr();

        let mut tracer = Tracer::new();
        assert_eq!(mark_of(payload), Mark::White);
        tracer.visit(payload);
        assert_eq!(mark_of(payload), Mark::Gray);
        assert_eq!(tracer.pending(), 1);

        // a second visit does not requeue
        tracer.visit(payload);
        assert_eq!(tracer.pending(), 1);
        assert_eq!(tracer.visited(), 1);
    }

    #[test]
    fn test_drain_blackens_and_follows_children() {
        let mut allocator = allocator();
        let child = allocator.allocate(16, Region::Main).unwrap().as_ptr();
        let parent = allocator.allocate(16, Region::Main).unwrap().as_ptr();

        // parent's payload stores a reference to child
        unsafe {
            (parent as *mut GcRef).write(child);
        }

        let mut tracer = Tracer::new();
        tracer.visit(parent);
        tracer.drain(|payload, tracer| {
            if payload == parent {
                let child = unsafe { (payload as *mut GcRef).read() };
                tracer.visit(child);
            }
        });

        // terminal state: no gray left, everything reachable is black
        assert_eq!(tracer.pending(), 0);
        assert_eq!(mark_of(parent), Mark::Black);
        assert_eq!(mark_of(child), Mark::Black);
        assert_eq!(tracer.visited(), 2);
    }

    #[test]
    fn test_value_slots_trace_refs_only() {
        let mut allocator = allocator();
        let payload = allocator.allocate(16, Region::Main).unwrap().as_ptr();

        let mut tracer = Tracer::new();
        GcValue::Int(7).trace(&mut tracer);
        GcValue::None.trace(&mut tracer);
        assert_eq!(tracer.visited(), 0);

        GcValue::Ref(payload).trace(&mut tracer);
        assert_eq!(tracer.visited(), 1);
    }
}
