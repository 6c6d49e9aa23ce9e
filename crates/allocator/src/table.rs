//! Fixed-capacity, address-ordered allocation table.
//!
//! The table is the only bookkeeping the allocator keeps. It lives outside
//! the heap region, so every heap byte can be handed out to callers, and it
//! holds at most `N` [`AllocationRecord`]s sorted by ascending address.
//!
//! # Algorithm
//!
//! Free space is never stored. It is derived from the gaps between
//! consecutive records:
//!
//! ```text
//!  base                                                            end
//!   │ gap 0 │ record 0 │ gap 1 │ record 1 │  ...  │ record n-1 │ gap n │
//! ```
//!
//! - **Placement**: [`AllocationTable::insert`] scans the gaps in ascending
//!   address order and takes the first one that can hold the request
//!   (first-fit). The new record is inserted at the gap's index, shifting the
//!   following records up by one slot.
//! - **Removal**: [`AllocationTable::remove`] looks up the record whose
//!   address matches exactly and shifts the following records down. The two
//!   gaps around the removed record merge implicitly.
//! - **Capacity**: when all `N` slots are used, placement fails with
//!   [`AllocError::TableExhausted`] even if the heap still has room.
//!
//! Every operation is O(N) in the fixed capacity.
//!
//! # Example
//!
//! ```
//! use allocator::{AllocError, HeapRegion, table::AllocationTable};
//!
//! let mut table = AllocationTable::<4>::with_region(HeapRegion::new(0, 1000).unwrap());
//! let a = table.insert(100, 1).unwrap();
//! let b = table.insert(200, 1).unwrap();
//! assert_eq!((a, b), (0, 100));
//!
//! table.remove(a).unwrap();
//! assert_eq!(table.insert(50, 1).unwrap(), a);
//! assert!(matches!(table.insert(701, 1), Err(AllocError::OutOfSpace { .. })));
//! ```

use core::{fmt, ops::Range, slice};

use arrayvec::ArrayVec;
use snafu::{OptionExt as _, ensure};

use crate::{
    error::{
        AllocError, InvalidAlignmentSnafu, NotFoundSnafu, OutOfSpaceSnafu, TableExhaustedSnafu,
        ZeroSizeSnafu,
    },
    record::{AllocationRecord, HeapRegion},
};

/// A span of heap bytes not covered by any live record.
///
/// Gaps may be empty, for example between two adjacent records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gap {
    index: usize,
    range: Range<usize>,
}

impl Gap {
    /// Returns the table slot a record placed in this gap would occupy.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.range.end - self.range.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Returns the address where `size` bytes aligned to `align` would be
    /// placed inside this gap, if they fit.
    ///
    /// Returns `None` if `align` is not a power of two.
    #[must_use]
    pub fn fit(&self, size: usize, align: usize) -> Option<usize> {
        let start = checked_align_up(self.range.start, align)?;
        let end = start.checked_add(size)?;
        (end <= self.range.end).then_some(start)
    }
}

fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    if !align.is_power_of_two() {
        return None;
    }
    let mask = align - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Iterator over the gaps of an [`AllocationTable`], in ascending address
/// order.
///
/// Created by [`AllocationTable::gaps`]. A table with `n` records always
/// yields exactly `n + 1` gaps.
#[derive(Debug, Clone)]
pub struct Gaps<'a> {
    region: HeapRegion,
    records: &'a [AllocationRecord],
    index: usize,
}

impl Iterator for Gaps<'_> {
    type Item = Gap;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.index;
        if index > self.records.len() {
            return None;
        }
        self.index += 1;

        let start = match index.checked_sub(1) {
            Some(prev) => self.records[prev].end(),
            None => self.region.base(),
        };
        let end = self
            .records
            .get(index)
            .map_or(self.region.end(), AllocationRecord::address);
        Some(Gap {
            index,
            range: start..end,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.records.len() + 1).saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Gaps<'_> {}

/// A broken table invariant, reported by
/// [`AllocationTable::check_invariants`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum InvariantViolation {
    #[display("record {index} has zero size")]
    ZeroSized { index: usize },
    #[display("record {index} is not above its predecessor")]
    Unsorted { index: usize },
    #[display("record {index} overlaps its predecessor")]
    Overlapping { index: usize },
    #[display("record {index} lies outside the heap region")]
    OutOfRegion { index: usize },
}

/// Usage summary of an allocation table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapStats {
    /// Number of metadata slots.
    pub capacity: usize,
    /// Number of live allocations.
    pub allocations: usize,
    /// Bytes covered by live allocations.
    pub used_bytes: usize,
    /// Bytes not covered by any live allocation.
    pub free_bytes: usize,
    /// Length of the largest gap.
    pub largest_gap: usize,
}

impl fmt::Display for HeapStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} records, {} bytes used, {} bytes free, largest gap {} bytes",
            self.allocations, self.capacity, self.used_bytes, self.free_bytes, self.largest_gap
        )
    }
}

/// Address-ordered table of live allocations with room for `N` records.
///
/// After every public operation the records are sorted strictly by address,
/// their spans do not overlap, and every span lies inside the heap region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationTable<const N: usize> {
    region: HeapRegion,
    records: ArrayVec<AllocationRecord, N>,
}

impl<const N: usize> Default for AllocationTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> AllocationTable<N> {
    /// Number of records the table can hold.
    pub const CAPACITY: usize = N;

    /// Creates a table over an empty region.
    ///
    /// Every placement fails with [`AllocError::OutOfSpace`] until
    /// [`reset`](Self::reset) gives the table a real region.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            region: HeapRegion::empty(),
            records: ArrayVec::new_const(),
        }
    }

    /// Creates an empty table over `region`.
    #[must_use]
    pub fn with_region(region: HeapRegion) -> Self {
        let mut table = Self::new();
        table.reset(region);
        table
    }

    /// Forgets every record and switches to `region`.
    pub fn reset(&mut self, region: HeapRegion) {
        self.region = region;
        self.records.clear();
    }

    #[must_use]
    pub fn region(&self) -> HeapRegion {
        self.region
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.records.is_full()
    }

    /// Returns the live records in ascending address order.
    #[must_use]
    pub fn as_slice(&self) -> &[AllocationRecord] {
        self.records.as_slice()
    }

    pub fn iter(&self) -> slice::Iter<'_, AllocationRecord> {
        self.records.iter()
    }

    /// Returns the record starting exactly at `address`.
    #[must_use]
    pub fn get(&self, address: usize) -> Option<&AllocationRecord> {
        self.position(address).map(|index| &self.records[index])
    }

    fn position(&self, address: usize) -> Option<usize> {
        self.records
            .binary_search_by_key(&address, AllocationRecord::address)
            .ok()
    }

    /// Returns an iterator over every gap, including empty ones, in
    /// ascending address order.
    pub fn gaps(&self) -> Gaps<'_> {
        Gaps {
            region: self.region,
            records: self.records.as_slice(),
            index: 0,
        }
    }

    /// Finds the first gap that can hold `size` bytes aligned to `align`.
    ///
    /// Returns the slot index for the new record and its address.
    #[must_use]
    pub fn find_gap(&self, size: usize, align: usize) -> Option<(usize, usize)> {
        self.gaps()
            .find_map(|gap| gap.fit(size, align).map(|address| (gap.index(), address)))
    }

    /// Places a new record of `size` bytes aligned to `align` and returns
    /// its address.
    ///
    /// The table is left unchanged on failure.
    pub fn insert(&mut self, size: usize, align: usize) -> Result<usize, AllocError> {
        ensure!(size > 0, ZeroSizeSnafu);
        ensure!(align.is_power_of_two(), InvalidAlignmentSnafu { align });
        ensure!(
            !self.is_full(),
            TableExhaustedSnafu {
                capacity: Self::CAPACITY,
            }
        );

        let (index, address) = self
            .find_gap(size, align)
            .context(OutOfSpaceSnafu { size, align })?;
        self.records
            .insert(index, AllocationRecord::new(address, size));

        debug_assert_eq!(self.check_invariants(), Ok(()));
        Ok(address)
    }

    /// Removes the record starting exactly at `address` and returns it.
    ///
    /// Addresses inside an allocation are not accepted.
    pub fn remove(&mut self, address: usize) -> Result<AllocationRecord, AllocError> {
        let index = self.position(address).context(NotFoundSnafu { address })?;
        let record = self.records.remove(index);

        debug_assert_eq!(self.check_invariants(), Ok(()));
        Ok(record)
    }

    /// Changes the size of the record at `address` without moving it.
    ///
    /// Shrinking always succeeds. Growing succeeds only if the gap right
    /// after the record can absorb the extra bytes. Returns `false` and
    /// leaves the table unchanged otherwise.
    pub fn resize_in_place(&mut self, address: usize, new_size: usize) -> Result<bool, AllocError> {
        ensure!(new_size > 0, ZeroSizeSnafu);
        let index = self.position(address).context(NotFoundSnafu { address })?;

        let limit = self
            .records
            .get(index + 1)
            .map_or(self.region.end(), AllocationRecord::address);
        let fits = address
            .checked_add(new_size)
            .is_some_and(|end| end <= limit);
        if !fits {
            return Ok(false);
        }

        self.records[index].set_size(new_size);

        debug_assert_eq!(self.check_invariants(), Ok(()));
        Ok(true)
    }

    /// Returns a usage summary.
    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let used_bytes = self.records.iter().map(AllocationRecord::size).sum::<usize>();
        HeapStats {
            capacity: Self::CAPACITY,
            allocations: self.records.len(),
            used_bytes,
            free_bytes: self.region.size() - used_bytes,
            largest_gap: self.gaps().map(|gap| gap.len()).max().unwrap_or(0),
        }
    }

    /// Verifies that records are non-empty, strictly sorted,
    /// non-overlapping and inside the heap region.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for (index, record) in self.records.iter().enumerate() {
            if record.size() == 0 {
                return Err(InvariantViolation::ZeroSized { index });
            }
            let in_region = record
                .address()
                .checked_add(record.size())
                .is_some_and(|end| self.region.contains_span(&(record.address()..end)));
            if !in_region {
                return Err(InvariantViolation::OutOfRegion { index });
            }
            let Some(prev) = index.checked_sub(1).map(|i| &self.records[i]) else {
                continue;
            };
            if prev.address() >= record.address() {
                return Err(InvariantViolation::Unsorted { index });
            }
            if prev.end() > record.address() {
                return Err(InvariantViolation::Overlapping { index });
            }
        }
        Ok(())
    }
}

impl<'a, const N: usize> IntoIterator for &'a AllocationTable<N> {
    type Item = &'a AllocationRecord;
    type IntoIter = slice::Iter<'a, AllocationRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
