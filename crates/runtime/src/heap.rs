//! The table allocator behind one spin lock.
//!
//! [`LockedHeap`] serializes every operation on the allocation table, which
//! makes it usable from several execution contexts and as the Rust global
//! allocator.

use core::{
    alloc::{GlobalAlloc, Layout},
    ptr,
};

use allocator::{AllocError, DEFAULT_CAPACITY, TableAllocator};
use spin::{Mutex, MutexGuard};

use crate::log::{self, LogLevel};

/// The global heap, installed with the `global-allocator` feature.
#[cfg(feature = "global-allocator")]
#[global_allocator]
pub static HEAP: LockedHeap = LockedHeap::new();

pub struct LockedHeap<const N: usize = DEFAULT_CAPACITY> {
    inner: Mutex<TableAllocator<N>>,
}

impl<const N: usize> Default for LockedHeap<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LockedHeap<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(TableAllocator::new()),
        }
    }

    /// Locks the heap for direct access to the allocator.
    ///
    /// Nothing may allocate through this heap while the guard is held.
    pub fn lock(&self) -> MutexGuard<'_, TableAllocator<N>> {
        self.inner.lock()
    }

    /// Hands `heap_start..heap_start + heap_size` to the allocator.
    ///
    /// # Safety
    ///
    /// Same as [`TableAllocator::init`].
    pub unsafe fn init(&self, heap_start: *mut u8, heap_size: usize) -> Result<(), AllocError> {
        let region = {
            let mut heap = self.lock();
            unsafe { heap.init(heap_start, heap_size) }?;
            heap.region()
        };
        crate::info!(
            "heap initialized: {:#x}..{:#x} ({} bytes, {} allocation slots)",
            region.base(),
            region.end(),
            region.size(),
            N,
        );
        Ok(())
    }
}

// The allocator may be called while the console is locked, for example by a
// sink that allocates, so it only logs through the non-blocking path.
unsafe impl<const N: usize> GlobalAlloc for LockedHeap<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let result = self.lock().allocate_aligned(layout.size(), layout.align());
        or_null(result, layout)
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let result = self
            .lock()
            .zero_allocate_aligned(1, layout.size(), layout.align());
        or_null(result, layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let result = self.lock().release(ptr);
        if let Err(err) = result {
            log::try_log(
                LogLevel::Error,
                format_args!("invalid free of {ptr:p}: {err}"),
            );
        }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let result = self
            .lock()
            .reallocate_aligned(ptr, new_size, layout.align());
        match result {
            Ok(Some(new_ptr)) => new_ptr.as_ptr(),
            // `new_size` is never zero here.
            Ok(None) => ptr::null_mut(),
            Err(err) => {
                log::try_log(
                    LogLevel::Debug,
                    format_args!("reallocation of {ptr:p} to {new_size} bytes failed: {err}"),
                );
                ptr::null_mut()
            }
        }
    }
}

fn or_null(result: Result<ptr::NonNull<u8>, AllocError>, layout: Layout) -> *mut u8 {
    match result {
        Ok(ptr) => ptr.as_ptr(),
        Err(err) => {
            log::try_log(
                LogLevel::Debug,
                format_args!("allocation of {layout:?} failed: {err}"),
            );
            ptr::null_mut()
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use core::{
        fmt,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use std::{sync::mpsc, thread, time::Duration};

    use super::*;
    use crate::{console, testing};

    fn with_test_heap<F>(heap_size: usize, test_fn: F) -> String
    where
        F: FnOnce(&LockedHeap<4>, *mut u8),
    {
        let mut memory = vec![0u8; heap_size];
        let heap_start = memory.as_mut_ptr();
        testing::with_captured_console(|| {
            let heap = LockedHeap::<4>::new();
            unsafe { heap.init(heap_start, heap_size) }.unwrap();
            test_fn(&heap, heap_start);
        })
    }

    #[test]
    fn test_init_logs_region() {
        let output = with_test_heap(256, |heap, heap_start| {
            assert_eq!(heap.lock().region().base(), heap_start.addr());
            assert_eq!(heap.lock().region().size(), 256);
        });
        assert!(output.contains("heap initialized"));
        assert!(output.contains("(256 bytes, 4 allocation slots)"));
    }

    #[test]
    fn test_init_rejects_empty_region() {
        let _output = testing::with_captured_console(|| {
            let heap = LockedHeap::<4>::new();
            let mut memory = [0u8; 8];
            let err = unsafe { heap.init(memory.as_mut_ptr(), 0) }.unwrap_err();
            assert!(err.kind().is_invalid_argument());
        });
    }

    #[test]
    fn test_alloc_dealloc() {
        let _output = with_test_heap(256, |heap, heap_start| {
            let layout = Layout::from_size_align(64, 1).unwrap();
            unsafe {
                let a = heap.alloc(layout);
                let b = heap.alloc(layout);
                assert_eq!(a, heap_start);
                assert_eq!(b.addr(), heap_start.addr() + 64);
                assert_eq!(heap.lock().size_of(b), Some(64));

                heap.dealloc(a, layout);
                assert_eq!(heap.alloc(layout), a);
            }
        });
    }

    #[test]
    fn test_alloc_respects_alignment() {
        let _output = with_test_heap(256, |heap, _heap_start| {
            unsafe {
                let _ = heap.alloc(Layout::from_size_align(3, 1).unwrap());
                let p = heap.alloc(Layout::from_size_align(16, 32).unwrap());
                assert!(!p.is_null());
                assert!(p.addr().is_multiple_of(32));
            }
        });
    }

    #[test]
    fn test_alloc_failure_returns_null() {
        let output = with_test_heap(128, |heap, _heap_start| {
            log::set_max_level(LogLevel::Debug);
            let p = unsafe { heap.alloc(Layout::from_size_align(129, 1).unwrap()) };
            assert!(p.is_null());
        });
        assert!(output.contains("DEBUG"));
        assert!(output.contains("failed"));
    }

    #[test]
    fn test_alloc_failure_is_quiet_at_info() {
        let output = with_test_heap(128, |heap, _heap_start| {
            log::set_max_level(LogLevel::Info);
            let layout = Layout::from_size_align(1, 1).unwrap();
            for _ in 0..4 {
                assert!(!unsafe { heap.alloc(layout) }.is_null());
            }
            assert!(unsafe { heap.alloc(layout) }.is_null());
        });
        assert!(!output.contains("failed"));
    }

    #[test]
    fn test_alloc_zeroed() {
        let _output = with_test_heap(128, |heap, heap_start| {
            let layout = Layout::from_size_align(32, 4).unwrap();
            unsafe {
                heap_start.write_bytes(0xaa, 128);
                let p = heap.alloc_zeroed(layout);
                assert!(!p.is_null());
                assert!(core::slice::from_raw_parts(p, 32).iter().all(|&b| b == 0));
            }
        });
    }

    #[test]
    fn test_invalid_dealloc_is_logged() {
        let output = with_test_heap(128, |heap, _heap_start| {
            let layout = Layout::from_size_align(16, 1).unwrap();
            unsafe {
                let p = heap.alloc(layout);
                heap.dealloc(p.add(1), layout);
                assert_eq!(heap.lock().size_of(p), Some(16));
                heap.dealloc(p, layout);
                heap.dealloc(p, layout);
            }
            assert_eq!(heap.lock().table().len(), 0);
        });
        assert_eq!(output.matches("ERROR").count(), 2);
        assert!(output.contains("invalid free"));
    }

    #[test]
    fn test_realloc_preserves_contents() {
        let _output = with_test_heap(256, |heap, _heap_start| {
            let layout = Layout::from_size_align(8, 1).unwrap();
            unsafe {
                let a = heap.alloc(layout);
                let b = heap.alloc(layout);
                a.copy_from_nonoverlapping(b"abcdefgh".as_ptr(), 8);

                // `b` blocks in-place growth, so the block moves.
                let moved = heap.realloc(a, layout, 32);
                assert!(!moved.is_null());
                assert_ne!(moved, a);
                assert_eq!(core::slice::from_raw_parts(moved, 8), b"abcdefgh");
                assert_eq!(heap.lock().size_of(a), None);

                // The tail gap lets the moved block grow in place.
                let grown = heap.realloc(moved, Layout::from_size_align(32, 1).unwrap(), 64);
                assert_eq!(grown, moved);

                heap.dealloc(b, layout);
            }
        });
    }

    #[test]
    fn test_realloc_failure_keeps_block() {
        let _output = with_test_heap(64, |heap, _heap_start| {
            let layout = Layout::from_size_align(16, 1).unwrap();
            unsafe {
                let a = heap.alloc(layout);
                let _b = heap.alloc(layout);
                assert!(heap.realloc(a, layout, 128).is_null());
                assert_eq!(heap.lock().size_of(a), Some(16));
            }
        });
    }

    static SINK_HEAP: LockedHeap<4> = LockedHeap::new();
    static SINK_FREES: AtomicUsize = AtomicUsize::new(0);

    struct FreeingSink;

    impl fmt::Write for FreeingSink {
        fn write_str(&mut self, _s: &str) -> fmt::Result {
            // Nothing was allocated, so this free is invalid and gets logged.
            unsafe {
                SINK_HEAP.dealloc(ptr::without_provenance_mut(1), Layout::new::<u8>());
            }
            SINK_FREES.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    #[test]
    fn test_heap_logging_inside_console_write() {
        let _output = testing::with_captured_console(|| {
            let previous = console::install(testing::leak_sink(FreeingSink));

            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                crate::println!("hello");
                let _ = tx.send(());
            });
            let finished = rx.recv_timeout(Duration::from_secs(5));
            assert!(finished.is_ok(), "println did not return");

            console::install(previous.unwrap());
        });
        assert!(SINK_FREES.load(Ordering::Relaxed) > 0);
    }
}
