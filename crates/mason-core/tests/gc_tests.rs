//! GC heap integration tests.
//!
//! The heap is a process singleton, so every test goes through one
//! shared initialization and registers its own thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

/// Tests that scan the rootset or push local handles serialize here;
/// chain scanning assumes the owning threads sit at safepoints.
static SCAN_LOCK: Mutex<()> = Mutex::new(());

use mason_core::{
    FailReason, GcHeap, GcOptions, GcValue, Generation, GlobalHandle, LocalHandle, Mark,
    ObjectHeader, Region, Rootable, Tracer, TriggerReason, NOOP_GC,
};

fn heap() -> &'static GcHeap {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        GcHeap::get()
            .initialize(NOOP_GC, GcOptions::default())
            .expect("heap initialization failed");
    });
    GcHeap::get()
}

/// RAII thread registration for tests.
struct Registered;

impl Registered {
    fn new() -> Self {
        heap().register_thread();
        Registered
    }
}

impl Drop for Registered {
    fn drop(&mut self) {
        heap().unregister_thread();
    }
}

#[test]
fn unknown_collector_is_rejected() {
    // Either the heap is still uninitialized (unknown name fails the
    // lookup) or it is initialized (second init fails); both are Err.
    let result = GcHeap::get().initialize("mark-compact", GcOptions::default());
    assert!(result.is_err());
}

#[test]
fn allocation_returns_headed_payloads() {
    let _thread = Registered::new();

    let payload = heap().allocate(40, Region::Main).expect("allocation");
    assert_eq!(
        payload.as_ptr() as usize % mason_core::OBJECT_ALIGNMENT,
        0
    );

    unsafe {
        let header = ObjectHeader::from_payload(payload.as_ptr());
        assert_eq!((*header).size(), 40);
        assert_eq!((*header).mark(), Mark::White);
        assert_eq!((*header).generation(), Generation::Nursery);
    }

    // payload memory is usable
    unsafe {
        payload.as_ptr().write_bytes(0x5A, 40);
        assert_eq!(payload.as_ptr().add(39).read(), 0x5A);
    }
}

#[test]
fn collect_is_immediate_and_pending_is_false() {
    let _thread = Registered::new();

    heap().collect(Generation::Nursery, TriggerReason::UserRequest);
    assert!(!heap().has_pending_gc());
    heap().wait_for_gc();
}

#[test]
fn statistics_track_usage() {
    let _thread = Registered::new();

    let before = heap().statistics().heap_used;
    heap().allocate(128, Region::Main).expect("allocation");
    let after = heap().statistics().heap_used;
    assert!(after > before);
}

#[test]
fn metadata_region_allocates_separately() {
    let _thread = Registered::new();

    let before = heap().statistics().metadata_used;
    heap().allocate(64, Region::Metadata).expect("allocation");
    assert!(heap().statistics().metadata_used > before);
    assert_eq!(heap().last_fail_reason(), FailReason::None);
}

struct StackRoot {
    /// Payload address of the referenced object, stored as an integer
    /// so the root can cross threads.
    slot: AtomicUsize,
    traced: AtomicUsize,
}

impl Rootable for StackRoot {
    fn trace(&self, tracer: &mut Tracer) {
        use mason_core::Trace;
        self.traced.fetch_add(1, Ordering::SeqCst);
        GcValue::Ref(self.slot.load(Ordering::SeqCst) as *mut u8).trace(tracer);
    }
}

#[test]
fn rootset_scan_visits_rootables_and_handles() {
    let _guard = SCAN_LOCK.lock().unwrap();
    let _thread = Registered::new();

    let a = heap().allocate(16, Region::Main).unwrap().as_ptr();
    let b = heap().allocate(16, Region::Main).unwrap().as_ptr();
    let c = heap().allocate(16, Region::Main).unwrap().as_ptr();

    let root: Arc<dyn Rootable> = Arc::new(StackRoot {
        slot: AtomicUsize::new(a as usize),
        traced: AtomicUsize::new(0),
    });
    heap().add_root(root.clone());
    let global = GlobalHandle::new(b);
    let local = LocalHandle::new(c);

    let mut tracer = Tracer::new();
    heap().scan_roots(&mut tracer);
    tracer.drain(|_, _| {});

    unsafe {
        assert_eq!((*ObjectHeader::from_payload(a)).mark(), Mark::Black);
        assert_eq!((*ObjectHeader::from_payload(b)).mark(), Mark::Black);
        assert_eq!((*ObjectHeader::from_payload(c)).mark(), Mark::Black);
    }

    drop(local);
    let _ = global;
    heap().remove_root(&root);
}

#[test]
fn local_handles_unlink_on_drop() {
    let _guard = SCAN_LOCK.lock().unwrap();
    let _thread = Registered::new();

    let a = heap().allocate(16, Region::Main).unwrap().as_ptr();
    let b = heap().allocate(16, Region::Main).unwrap().as_ptr();

    let outer = LocalHandle::new(a);
    {
        let inner = LocalHandle::new(b);
        assert_eq!(inner.get(), b);
    }

    // after the inner handle dropped, a scan sees only the outer one
    let mut tracer = Tracer::new();
    heap().scan_roots(&mut tracer);
    tracer.drain(|_, _| {});

    unsafe {
        assert_eq!((*ObjectHeader::from_payload(a)).mark(), Mark::Black);
        assert_eq!((*ObjectHeader::from_payload(b)).mark(), Mark::White);
    }
    drop(outer);
}

#[test]
fn write_barrier_stores_through_handles() {
    let _thread = Registered::new();

    let a = heap().allocate(16, Region::Main).unwrap().as_ptr();
    let b = heap().allocate(16, Region::Main).unwrap().as_ptr();

    let handle = GlobalHandle::new(a);
    mason_core::write_barrier(&handle, b);
    assert_eq!(handle.get(), b);
}

#[test]
fn registration_is_per_thread() {
    let _thread = Registered::new();
    assert!(heap().is_thread_registered());

    std::thread::spawn(|| {
        // a fresh thread starts unregistered
        assert!(!GcHeap::get().is_thread_registered());
        GcHeap::get().register_thread();
        assert!(GcHeap::get().is_thread_registered());
        GcHeap::get().unregister_thread();
    })
    .join()
    .unwrap();
}
