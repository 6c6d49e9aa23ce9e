use core::ops::Range;

use snafu::ensure;

use crate::error::{AllocError, InvalidRegionSnafu};

/// The byte range managed by an allocator.
///
/// A region is fixed once the allocator is initialized. Only the empty
/// region returned by [`HeapRegion::empty`] may have a size of zero.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapRegion {
    base: usize,
    size: usize,
}

impl HeapRegion {
    /// Creates the region `base..base + size`.
    ///
    /// Fails if `size` is zero or the region wraps around the address space.
    pub fn new(base: usize, size: usize) -> Result<Self, AllocError> {
        ensure!(
            size > 0 && base.checked_add(size).is_some(),
            InvalidRegionSnafu { base, size }
        );
        Ok(Self { base, size })
    }

    /// Returns a region that contains no bytes.
    #[must_use]
    pub const fn empty() -> Self {
        Self { base: 0, size: 0 }
    }

    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns one past the last address of the region.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.base + self.size
    }

    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.base..self.end()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns `true` if `span` lies entirely inside the region.
    #[must_use]
    pub fn contains_span(&self, span: &Range<usize>) -> bool {
        self.base <= span.start && span.start <= span.end && span.end <= self.end()
    }
}

/// Metadata describing one live allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AllocationRecord {
    address: usize,
    size: usize,
}

impl AllocationRecord {
    pub(crate) const fn new(address: usize, size: usize) -> Self {
        Self { address, size }
    }

    /// Returns the first address of the allocation.
    #[must_use]
    pub const fn address(&self) -> usize {
        self.address
    }

    /// Returns the requested length of the allocation in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Returns one past the last address of the allocation.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.address + self.size
    }

    #[must_use]
    pub const fn span(&self) -> Range<usize> {
        self.address..self.end()
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }
}
