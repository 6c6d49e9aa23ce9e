//! Bounded-metadata heap allocator for freestanding environments.
//!
//! This crate manages a single fixed-size heap region. Instead of storing
//! block headers inside the heap, it keeps a small, statically-sized table
//! of allocation records next to the allocator, so every heap byte is
//! available to callers. The allocator is `no_std` compatible and does not
//! need a host operating system.
//!
//! # Components
//!
//! ## [`AllocationTable`](table::AllocationTable)
//!
//! The pure bookkeeping part: up to `N` [`AllocationRecord`]s sorted by
//! address, first-fit placement over the gaps between them, exact-match
//! removal, in-place resizing and invariant checks. It works on plain
//! addresses and never touches memory.
//!
//! ## [`TableAllocator`]
//!
//! The allocator built on the table. It owns the heap base pointer and adds
//! the operations that move bytes: copying on
//! [`reallocate`](TableAllocator::reallocate) and zero-filling on
//! [`zero_allocate`](TableAllocator::zero_allocate).
//!
//! # Failure Modes
//!
//! Every operation returns an [`AllocError`]. Its [`kind`](AllocError::kind)
//! tells the four failure classes apart:
//!
//! | Kind | Cause |
//! |------|-------|
//! | `InvalidArgument` | zero size, null address, bad alignment or region, size overflow |
//! | `TableExhausted` | all `N` metadata slots are in use, even if heap space remains |
//! | `OutOfSpace` | no gap is large enough |
//! | `NotFound` | no live allocation starts at the given address |
//!
//! A failed call never changes the table.
//!
//! # Usage Example
//!
//! ```rust
//! use allocator::{AllocErrorKind, TableAllocator};
//!
//! let mut heap = vec![0u8; 256];
//! let mut allocator = TableAllocator::<2>::new();
//! unsafe {
//!     allocator.init(heap.as_mut_ptr(), heap.len()).unwrap();
//! }
//!
//! let a = allocator.allocate(16).unwrap();
//! let _b = allocator.allocate(16).unwrap();
//! let err = allocator.allocate(16).unwrap_err();
//! assert_eq!(err.kind(), AllocErrorKind::TableExhausted);
//!
//! allocator.release(a.as_ptr()).unwrap();
//! assert_eq!(allocator.allocate(16).unwrap(), a);
//! ```
//!
//! # Thread Safety
//!
//! The allocator is `Send` but not `Sync`. Wrap it in a single lock (for
//! example `spin::Mutex`) that covers every operation when more than one
//! execution context may call it.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub use self::{
    error::{AllocError, AllocErrorKind},
    record::{AllocationRecord, HeapRegion},
    table::HeapStats,
    table_allocator::TableAllocator,
};

mod error;
mod record;
pub mod table;
pub mod table_allocator;

/// Number of allocation records a [`TableAllocator`] holds unless told
/// otherwise.
pub const DEFAULT_CAPACITY: usize = 20;
