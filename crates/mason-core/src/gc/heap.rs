//! The process-wide GC heap facade.
//!
//! One heap serves every script-execution thread. Threads bracket their
//! participation with `register_thread`/`unregister_thread`; the thread
//! registry, rootset and global handle set are each guarded by their own
//! mutex, while local handle chains stay lock-free in thread-local
//! storage. Collectors are pluggable by name; "noop" ships.

use std::cell::Cell;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;
use std::thread::ThreadId;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::alloc::{Allocator, AllocatorCtor, FailReason, GcStatistics, Region, TriggerReason};
use super::handle::{scan_global_handles, scan_local_chain, local_chain_anchor, LocalNode};
use super::header::Generation;
use super::noop::NoopAllocator;
use super::options::GcOptions;
use super::trace::{Rootable, Tracer};

/// Name of the shipped allocation-only collector.
pub const NOOP_GC: &str = "noop";

#[derive(Debug, Error)]
pub enum GcError {
    #[error("unknown collector '{0}'")]
    UnknownCollector(String),
    #[error("heap is already initialized")]
    AlreadyInitialized,
    #[error("collector setup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-registered-thread bookkeeping: where that thread's local handle
/// chain is anchored.
struct ThreadInfo {
    local_anchor: *const Cell<*const LocalNode>,
}

// Anchors are only dereferenced while the registry lock is held and the
// owning thread is at a safepoint.
unsafe impl Send for ThreadInfo {}

static COLLECTORS: Lazy<Mutex<FxHashMap<&'static str, AllocatorCtor>>> = Lazy::new(|| {
    let mut map: FxHashMap<&'static str, AllocatorCtor> = FxHashMap::default();
    map.insert(NOOP_GC, NoopAllocator::create);
    Mutex::new(map)
});

static HEAP: Lazy<GcHeap> = Lazy::new(GcHeap::new);

pub struct GcHeap {
    allocator: Mutex<Option<Box<dyn Allocator>>>,
    threads: Mutex<FxHashMap<ThreadId, ThreadInfo>>,
    roots: Mutex<Vec<Arc<dyn Rootable>>>,
    log: Mutex<Option<std::fs::File>>,
}

impl GcHeap {
    fn new() -> Self {
        Self {
            allocator: Mutex::new(None),
            threads: Mutex::new(FxHashMap::default()),
            roots: Mutex::new(Vec::new()),
            log: Mutex::new(None),
        }
    }

    /// The process-wide heap.
    pub fn get() -> &'static GcHeap {
        &HEAP
    }

    /// Register an additional collector implementation.
    pub fn register_collector(name: &'static str, ctor: AllocatorCtor) {
        COLLECTORS.lock().insert(name, ctor);
    }

    /// Select and construct the collector. Must happen once, before any
    /// allocation.
    pub fn initialize(&self, name: &str, options: GcOptions) -> Result<(), GcError> {
        let mut allocator = self.allocator.lock();
        if allocator.is_some() {
            return Err(GcError::AlreadyInitialized);
        }

        let ctor = *COLLECTORS
            .lock()
            .get(name)
            .ok_or_else(|| GcError::UnknownCollector(name.to_string()))?;

        if let Some(path) = &options.log_path {
            *self.log.lock() = Some(open_log(path)?);
        }

        *allocator = Some(ctor(&options)?);
        drop(allocator);

        self.log_line(&format!("initialized collector '{}'", name));
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.allocator.lock().is_some()
    }

    /// Register the calling thread. Threads that may hold live handles
    /// must be registered before allocating or collecting.
    pub fn register_thread(&self) {
        let info = ThreadInfo {
            local_anchor: local_chain_anchor(),
        };
        self.threads.lock().insert(std::thread::current().id(), info);
    }

    pub fn unregister_thread(&self) {
        let removed = self.threads.lock().remove(&std::thread::current().id());
        debug_assert!(
            removed.is_some(),
            "unregistered thread; all participating threads must register with the heap"
        );
    }

    pub fn is_thread_registered(&self) -> bool {
        self.threads.lock().contains_key(&std::thread::current().id())
    }

    pub fn add_root(&self, root: Arc<dyn Rootable>) {
        self.roots.lock().push(root);
    }

    pub fn remove_root(&self, root: &Arc<dyn Rootable>) {
        self.roots
            .lock()
            .retain(|existing| !Arc::ptr_eq(existing, root));
    }

    /// Allocate `size` payload bytes in `region`; `None` means the
    /// region is exhausted (see [`GcHeap::last_fail_reason`]).
    pub fn allocate(&self, size: usize, region: Region) -> Option<NonNull<u8>> {
        debug_assert!(
            self.is_thread_registered(),
            "allocating thread is not registered with the heap"
        );

        let mut allocator = self.allocator.lock();
        let allocator = allocator.as_mut().expect("heap is not initialized");
        let payload = allocator.allocate(size, region);
        if payload.is_none() {
            self.log_line("allocation failed: out of memory");
        }
        payload
    }

    pub fn collect(&self, generation: Generation, reason: TriggerReason) {
        debug_assert!(
            self.is_thread_registered(),
            "collecting thread is not registered with the heap"
        );

        self.log_line(&format!("collect {:?} ({})", generation, reason));
        let mut allocator = self.allocator.lock();
        if let Some(allocator) = allocator.as_mut() {
            allocator.collect(generation, reason);
        }
    }

    pub fn has_pending_gc(&self) -> bool {
        self.allocator
            .lock()
            .as_ref()
            .map(|allocator| allocator.has_pending_gc())
            .unwrap_or(false)
    }

    pub fn wait_for_gc(&self) {
        if let Some(allocator) = self.allocator.lock().as_ref() {
            allocator.wait_for_gc();
        }
    }

    pub fn last_fail_reason(&self) -> FailReason {
        self.allocator
            .lock()
            .as_ref()
            .map(|allocator| allocator.last_fail_reason())
            .unwrap_or_default()
    }

    pub fn statistics(&self) -> GcStatistics {
        self.allocator
            .lock()
            .as_ref()
            .map(|allocator| allocator.statistics())
            .unwrap_or_default()
    }

    /// Visit the whole rootset: registered rootables, global handles and
    /// every registered thread's local handle chain.
    ///
    /// Participating threads must be stopped at safepoints; the no-op
    /// collector only calls this from tests and tooling.
    pub fn scan_roots(&self, tracer: &mut Tracer) {
        for root in self.roots.lock().iter() {
            root.trace(tracer);
        }

        scan_global_handles(tracer);

        let threads = self.threads.lock();
        for info in threads.values() {
            unsafe {
                scan_local_chain(info.local_anchor, tracer);
            }
        }
    }

    fn log_line(&self, message: &str) {
        if let Some(file) = self.log.lock().as_mut() {
            let _ = writeln!(file, "[gc] {}", message);
        }
    }
}

fn open_log(path: &Path) -> std::io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Convenience: allocate from the process heap.
pub fn allocate(size: usize, region: Region) -> Option<NonNull<u8>> {
    GcHeap::get().allocate(size, region)
}
