//! Heap set-up from the memory layout reported at boot.
//!
//! The loader reports three ranges: the memory set aside for the heap, the
//! loaded program image and the environment block (command line, device
//! tree or similar). The image and the environment may lie inside the heap
//! range and must never be handed out, so they are cut out first and the
//! largest remaining piece becomes the heap.

use core::{cmp::Reverse, fmt, ops::Range, ptr};

use allocator::AllocError;
use arrayvec::ArrayVec;
use snafu::{Location, OptionExt as _, ResultExt as _, Snafu};

use crate::heap::LockedHeap;

/// A half-open range of physical addresses.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRange {
    start: usize,
    end: usize,
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}..{:#x}", self.start, self.end)
    }
}

impl MemoryRange {
    #[must_use]
    pub const fn empty() -> Self {
        Self { start: 0, end: 0 }
    }

    /// Returns the range `base..base + size`.
    pub fn from_base_size(base: usize, size: usize) -> Result<Self, BootError> {
        let end = base
            .checked_add(size)
            .context(RangeOverflowSnafu { base, size })?;
        Ok(Self { start: base, end })
    }

    fn from_range(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }

    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }

    #[must_use]
    pub const fn size(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub const fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Memory layout handed over by the loader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BootInfo {
    /// The loaded program image.
    pub kernel: MemoryRange,
    /// Memory available for the heap.
    pub heap: MemoryRange,
    /// The environment block passed by the loader.
    pub env: MemoryRange,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BootError {
    #[snafu(display("memory range overflows: base={base:#x}, size={size}"))]
    RangeOverflow {
        base: usize,
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no usable heap memory left in {heap}"))]
    EmptyHeap {
        heap: MemoryRange,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to initialize heap at {range}"))]
    HeapInit {
        range: MemoryRange,
        #[snafu(source)]
        source: AllocError,
        #[snafu(implicit)]
        location: Location,
    },
}

impl BootError {
    /// Returns the location where this error was raised.
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            Self::RangeOverflow { location, .. }
            | Self::EmptyHeap { location, .. }
            | Self::HeapInit { location, .. } => location,
        }
    }
}

// The heap range split by the two reserved ranges.
const MAX_PIECES: usize = 3;

/// Returns the largest part of the heap range outside the program image and
/// the environment block.
///
/// Among pieces of equal size the lowest one wins. Returns `None` when
/// nothing is left.
#[must_use]
pub fn usable_heap_range(info: &BootInfo) -> Option<MemoryRange> {
    let mut pieces = ArrayVec::<Range<usize>, MAX_PIECES>::new();
    if !info.heap.is_empty() {
        pieces.push(info.heap.range());
    }
    for reserved in [info.kernel, info.env] {
        if !reserved.is_empty() {
            exclude_reserved_range(&mut pieces, reserved.range());
        }
    }
    pieces
        .into_iter()
        .max_by_key(|piece| (piece.len(), Reverse(piece.start)))
        .map(MemoryRange::from_range)
}

fn exclude_reserved_range<const N: usize>(
    ranges: &mut ArrayVec<Range<usize>, N>,
    reserved: Range<usize>,
) {
    let mut out = ArrayVec::<Range<usize>, N>::new();
    for range in ranges.iter() {
        if range.start < reserved.end && reserved.start < range.end {
            if range.start < reserved.start {
                out.push(range.start..reserved.start);
            }
            if reserved.end < range.end {
                out.push(reserved.end..range.end);
            }
        } else {
            out.push(range.clone());
        }
    }
    *ranges = out;
}

/// Initializes `heap` with the usable part of the boot heap range and
/// returns that part.
///
/// # Safety
///
/// The heap range in `info` must be memory that is valid for reads and
/// writes and not used by anything else, except where it overlaps the
/// program image or the environment block.
pub unsafe fn init_heap<const N: usize>(
    info: &BootInfo,
    heap: &LockedHeap<N>,
) -> Result<MemoryRange, BootError> {
    let range = usable_heap_range(info).context(EmptyHeapSnafu { heap: info.heap })?;
    if range != info.heap {
        crate::warn!(
            "heap {} trimmed to {range} (kernel {}, env {})",
            info.heap,
            info.kernel,
            info.env,
        );
    }

    let heap_start = ptr::with_exposed_provenance_mut(range.start());
    unsafe { heap.init(heap_start, range.size()) }.context(HeapInitSnafu { range })?;
    Ok(range)
}
