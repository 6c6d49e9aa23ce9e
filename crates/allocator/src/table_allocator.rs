//! Heap allocator backed by a fixed-capacity allocation table.
//!
//! [`TableAllocator`] hands out byte ranges of a single heap region. All of
//! its bookkeeping lives in an [`AllocationTable`] stored next to the
//! allocator, never inside the heap, so the heap bytes are only ever written
//! with caller payloads (or zeros for [`TableAllocator::zero_allocate`]).
//!
//! # Usage Example
//!
//! ```rust
//! use allocator::TableAllocator;
//!
//! let mut heap = vec![0u8; 1024];
//! let mut allocator = TableAllocator::<8>::new();
//! unsafe {
//!     allocator.init(heap.as_mut_ptr(), heap.len()).unwrap();
//! }
//!
//! let ptr = allocator.allocate(64).unwrap();
//! unsafe { ptr.as_ptr().write_bytes(0xaa, 64) };
//!
//! let ptr = allocator.reallocate(ptr.as_ptr(), 128).unwrap().unwrap();
//! assert_eq!(unsafe { ptr.as_ptr().add(63).read() }, 0xaa);
//!
//! allocator.release(ptr.as_ptr()).unwrap();
//! assert!(allocator.release(ptr.as_ptr()).is_err());
//! ```
//!
//! # Thread Safety
//!
//! The allocator is `Send` but not `Sync`. A single lock around the whole
//! allocator is enough to share it between execution contexts.

use core::ptr::{self, NonNull};

use snafu::{OptionExt as _, ensure};

use crate::{
    DEFAULT_CAPACITY,
    error::{
        AllocError, InvalidAlignmentSnafu, NotFoundSnafu, NullAddressSnafu, SizeOverflowSnafu,
    },
    record::HeapRegion,
    table::{AllocationTable, HeapStats},
};

/// First-fit heap allocator with room for `N` live allocations.
///
/// The allocator starts with an empty heap. Call [`init`](Self::init) before
/// allocating; until then every allocation fails with
/// [`AllocError::OutOfSpace`].
pub struct TableAllocator<const N: usize = DEFAULT_CAPACITY> {
    heap_start: *mut u8,
    table: AllocationTable<N>,
}

unsafe impl<const N: usize> Send for TableAllocator<N> {}

impl<const N: usize> Default for TableAllocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TableAllocator<N> {
    /// Creates an allocator without a heap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            heap_start: ptr::null_mut(),
            table: AllocationTable::new(),
        }
    }

    /// Sets the heap region to `heap_start..heap_start + heap_size` and
    /// forgets every previous allocation.
    ///
    /// May be called again at any time to start over. On failure the previous
    /// state is kept.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - The given heap range `heap_start..heap_start + heap_size` is valid
    ///   for reads and writes
    /// - The memory region is not used by anything else while this allocator
    ///   manages it
    /// - Pointers returned before a re-initialization are no longer used
    pub unsafe fn init(&mut self, heap_start: *mut u8, heap_size: usize) -> Result<(), AllocError> {
        ensure!(!heap_start.is_null(), NullAddressSnafu);
        let region = HeapRegion::new(heap_start.addr(), heap_size)?;
        self.heap_start = heap_start;
        self.table.reset(region);
        Ok(())
    }

    /// Returns the allocation table.
    #[must_use]
    pub fn table(&self) -> &AllocationTable<N> {
        &self.table
    }

    /// Returns the heap region, empty before [`init`](Self::init).
    #[must_use]
    pub fn region(&self) -> HeapRegion {
        self.table.region()
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.table.stats()
    }

    /// Returns the size of the live allocation starting at `ptr`.
    #[must_use]
    pub fn size_of(&self, ptr: *const u8) -> Option<usize> {
        self.table.get(ptr.addr()).map(|record| record.size())
    }

    /// Allocates `size` bytes from the lowest gap that can hold them.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        self.allocate_aligned(size, 1)
    }

    /// Allocates `size` bytes starting at a multiple of `align`.
    ///
    /// `align` must be a power of two.
    pub fn allocate_aligned(&mut self, size: usize, align: usize) -> Result<NonNull<u8>, AllocError> {
        let address = self.table.insert(size, align)?;
        Ok(self.pointer_to(address))
    }

    /// Allocates `count * element_size` bytes and fills them with zeros.
    pub fn zero_allocate(
        &mut self,
        count: usize,
        element_size: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        self.zero_allocate_aligned(count, element_size, 1)
    }

    /// Like [`zero_allocate`](Self::zero_allocate), but the block starts at a
    /// multiple of `align`.
    pub fn zero_allocate_aligned(
        &mut self,
        count: usize,
        element_size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, AllocError> {
        let size = count.checked_mul(element_size).context(SizeOverflowSnafu {
            count,
            element_size,
        })?;
        let ptr = self.allocate_aligned(size, align)?;
        unsafe {
            ptr.as_ptr().write_bytes(0, size);
        }
        Ok(ptr)
    }

    /// Releases the allocation starting exactly at `ptr`.
    ///
    /// Fails with [`AllocError::NotFound`] if no live allocation starts at
    /// `ptr`, including when `ptr` was already released. The heap bytes are
    /// left as they are.
    pub fn release(&mut self, ptr: *mut u8) -> Result<(), AllocError> {
        ensure!(!ptr.is_null(), NullAddressSnafu);
        self.table.remove(ptr.addr())?;
        Ok(())
    }

    /// Changes the size of the allocation starting at `ptr`.
    ///
    /// A `new_size` of zero releases the allocation and returns `None`.
    /// Otherwise the allocation is resized in place when the gap after it can
    /// absorb the change, or moved to a new block holding the first
    /// `min(old_size, new_size)` bytes of the old one. On failure the old
    /// allocation is left untouched.
    pub fn reallocate(
        &mut self,
        ptr: *mut u8,
        new_size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        self.reallocate_aligned(ptr, new_size, 1)
    }

    /// Like [`reallocate`](Self::reallocate), but a moved block starts at a
    /// multiple of `align`.
    pub fn reallocate_aligned(
        &mut self,
        ptr: *mut u8,
        new_size: usize,
        align: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        ensure!(!ptr.is_null(), NullAddressSnafu);
        ensure!(align.is_power_of_two(), InvalidAlignmentSnafu { align });

        let address = ptr.addr();
        let old_size = self
            .table
            .get(address)
            .map(|record| record.size())
            .context(NotFoundSnafu { address })?;

        if new_size == 0 {
            self.table.remove(address)?;
            return Ok(None);
        }

        if address.is_multiple_of(align) && self.table.resize_in_place(address, new_size)? {
            return Ok(Some(self.pointer_to(address)));
        }

        // The old record stays in the table until the copy is done, so the
        // new block never overlaps it.
        let new_address = self.table.insert(new_size, align)?;
        unsafe {
            ptr::copy_nonoverlapping(
                self.heap_start.with_addr(address),
                self.heap_start.with_addr(new_address),
                usize::min(old_size, new_size),
            );
        }
        self.table.remove(address)?;
        Ok(Some(self.pointer_to(new_address)))
    }

    fn pointer_to(&self, address: usize) -> NonNull<u8> {
        debug_assert!(self.region().range().contains(&address));
        // `address` lies inside a region starting at the non-null `heap_start`.
        unsafe { NonNull::new_unchecked(self.heap_start.with_addr(address)) }
    }
}
