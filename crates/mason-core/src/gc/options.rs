//! GC configuration.

use std::path::PathBuf;

/// Configuration handed to [`GcHeap::initialize`](super::GcHeap::initialize).
#[derive(Debug, Clone)]
pub struct GcOptions {
    /// Reserved size of the main heap chunk.
    pub max_heap_size: usize,
    /// Reserved size of the metadata chunk.
    pub max_metadata_size: usize,
    /// When set, the heap appends a plain-text log here.
    pub log_path: Option<PathBuf>,
}

impl Default for GcOptions {
    fn default() -> Self {
        Self {
            max_heap_size: 64 * 1024 * 1024,
            max_metadata_size: 16 * 1024 * 1024,
            log_path: None,
        }
    }
}

impl GcOptions {
    /// Small configuration for tests and tools.
    pub fn with_sizes(max_heap_size: usize, max_metadata_size: usize) -> Self {
        Self {
            max_heap_size,
            max_metadata_size,
            log_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = GcOptions::default();
        assert_eq!(options.max_heap_size, 64 * 1024 * 1024);
        assert!(options.log_path.is_none());
    }
}
