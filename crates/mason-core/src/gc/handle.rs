//! GC handles.
//!
//! Global handles live in a process-wide registry behind a mutex; local
//! handles form a thread-local singly-linked LIFO chain anchored at a
//! per-thread root pointer, so pushing and popping never locks. Both
//! are rootset entry points.

use std::cell::Cell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::trace::{GcRef, Tracer};

// ---------------------------------------------------------------------
// Global handles
// ---------------------------------------------------------------------

static GLOBAL_HANDLES: Lazy<Mutex<Vec<Weak<AtomicPtr<u8>>>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

/// A process-wide handle to a GC object; registered as a root for its
/// whole lifetime.
pub struct GlobalHandle {
    slot: Arc<AtomicPtr<u8>>,
}

impl GlobalHandle {
    pub fn new(value: GcRef) -> Self {
        let slot = Arc::new(AtomicPtr::new(value));
        GLOBAL_HANDLES.lock().push(Arc::downgrade(&slot));
        Self { slot }
    }

    pub fn get(&self) -> GcRef {
        self.slot.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: GcRef) {
        write_barrier(self, value);
    }
}

/// The store hook a future generational collector interposes on; the
/// no-op collector performs a plain store.
pub fn write_barrier(handle: &GlobalHandle, value: GcRef) {
    handle.slot.store(value, Ordering::SeqCst);
}

/// Visit every live global handle. Dead registry entries are pruned on
/// the way.
pub(crate) fn scan_global_handles(tracer: &mut Tracer) {
    let mut handles = GLOBAL_HANDLES.lock();
    handles.retain(|weak| match weak.upgrade() {
        Some(slot) => {
            tracer.visit(slot.load(Ordering::SeqCst));
            true
        }
        None => false,
    });
}

#[cfg(test)]
pub(crate) fn global_handle_count() -> usize {
    let mut handles = GLOBAL_HANDLES.lock();
    handles.retain(|weak| weak.strong_count() > 0);
    handles.len()
}

// ---------------------------------------------------------------------
// Local handles
// ---------------------------------------------------------------------

pub(crate) struct LocalNode {
    value: Cell<GcRef>,
    prev: *const LocalNode,
}

thread_local! {
    static LOCAL_HEAD: Cell<*const LocalNode> = const { Cell::new(ptr::null()) };
}

/// Address of this thread's chain anchor, registered with the heap by
/// `register_thread`.
pub(crate) fn local_chain_anchor() -> *const Cell<*const LocalNode> {
    LOCAL_HEAD.with(|head| head as *const Cell<*const LocalNode>)
}

/// Walk a thread's local handle chain starting at its anchor.
///
/// # Safety
///
/// The owning thread must still be registered (its TLS alive) and must
/// not be pushing or popping handles concurrently; collection happens
/// at safepoints.
pub(crate) unsafe fn scan_local_chain(
    anchor: *const Cell<*const LocalNode>,
    tracer: &mut Tracer,
) {
    let mut node = (*anchor).get();
    while !node.is_null() {
        tracer.visit((*node).value.get());
        node = (*node).prev;
    }
}

/// A scoped handle on the current thread's chain. Handles link in on
/// construction and unlink on drop, strictly LIFO.
pub struct LocalHandle {
    node: Box<LocalNode>,
}

impl LocalHandle {
    pub fn new(value: GcRef) -> Self {
        let node = Box::new(LocalNode {
            value: Cell::new(value),
            prev: LOCAL_HEAD.with(|head| head.get()),
        });
        LOCAL_HEAD.with(|head| head.set(&*node as *const LocalNode));
        Self { node }
    }

    pub fn get(&self) -> GcRef {
        self.node.value.get()
    }

    pub fn set(&self, value: GcRef) {
        self.node.value.set(value);
    }
}

impl Drop for LocalHandle {
    fn drop(&mut self) {
        LOCAL_HEAD.with(|head| {
            debug_assert_eq!(
                head.get(),
                &*self.node as *const LocalNode,
                "local handles must be dropped in LIFO order"
            );
            head.set(self.node.prev);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_ref(value: usize) -> GcRef {
        value as GcRef
    }

    #[test]
    fn test_local_handles_link_lifo() {
        let a = LocalHandle::new(fake_ref(0x10));
        {
            let b = LocalHandle::new(fake_ref(0x20));
            assert_eq!(b.get(), fake_ref(0x20));

            // the chain sees b first, then a
            let mut seen = Vec::new();
            unsafe {
                let mut node = (*local_chain_anchor()).get();
                while !node.is_null() {
                    seen.push((*node).value.get());
                    node = (*node).prev;
                }
            }
            assert_eq!(seen, vec![fake_ref(0x20), fake_ref(0x10)]);
        }

        // after b drops, the head is back at a
        unsafe {
            assert_eq!((*local_chain_anchor()).get(), &*a.node as *const LocalNode);
        }
    }

    #[test]
    fn test_local_handle_set() {
        let handle = LocalHandle::new(fake_ref(0x1));
        handle.set(fake_ref(0x2));
        assert_eq!(handle.get(), fake_ref(0x2));
    }

    #[test]
    fn test_global_handle_registry() {
        let before = global_handle_count();
        {
            let handle = GlobalHandle::new(fake_ref(0x30));
            assert_eq!(handle.get(), fake_ref(0x30));
            handle.set(fake_ref(0x40));
            assert_eq!(handle.get(), fake_ref(0x40));
            assert_eq!(global_handle_count(), before + 1);
        }
        // dropping deregisters (weak entry dies)
        assert_eq!(global_handle_count(), before);
    }
}
