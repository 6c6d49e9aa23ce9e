use snafu::{Location, Snafu};

/// Errors returned by the allocation table and the allocator built on it.
///
/// Every variant is a local, recoverable condition. A failing operation
/// leaves the allocation table exactly as it was before the call.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AllocError {
    #[snafu(display("zero-sized allocation requested"))]
    ZeroSize {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("null address given where a live allocation is required"))]
    NullAddress {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("alignment is not a power of two: align={align}"))]
    InvalidAlignment {
        align: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("invalid heap region: base={base:#x}, size={size}"))]
    InvalidRegion {
        base: usize,
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "allocation size overflows: count={count}, element_size={element_size}"
    ))]
    SizeOverflow {
        count: usize,
        element_size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("allocation table exhausted: capacity={capacity}"))]
    TableExhausted {
        capacity: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no gap large enough in heap: size={size}, align={align}"))]
    OutOfSpace {
        size: usize,
        align: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no live allocation starts at address {address:#x}"))]
    NotFound {
        address: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Coarse classification of an [`AllocError`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    derive_more::Display,
    derive_more::IsVariant,
)]
pub enum AllocErrorKind {
    /// Zero size, null address, bad alignment, bad region or size overflow.
    #[display("invalid argument")]
    InvalidArgument,
    /// Every metadata slot is in use.
    #[display("allocation table exhausted")]
    TableExhausted,
    /// No gap is large enough for the request.
    #[display("out of heap space")]
    OutOfSpace,
    /// The address does not start a live allocation.
    #[display("allocation not found")]
    NotFound,
}

impl AllocError {
    /// Returns the class of this error.
    #[must_use]
    pub fn kind(&self) -> AllocErrorKind {
        match self {
            Self::ZeroSize { .. }
            | Self::NullAddress { .. }
            | Self::InvalidAlignment { .. }
            | Self::InvalidRegion { .. }
            | Self::SizeOverflow { .. } => AllocErrorKind::InvalidArgument,
            Self::TableExhausted { .. } => AllocErrorKind::TableExhausted,
            Self::OutOfSpace { .. } => AllocErrorKind::OutOfSpace,
            Self::NotFound { .. } => AllocErrorKind::NotFound,
        }
    }

    /// Returns the location where this error was raised.
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            Self::ZeroSize { location }
            | Self::NullAddress { location }
            | Self::InvalidAlignment { location, .. }
            | Self::InvalidRegion { location, .. }
            | Self::SizeOverflow { location, .. }
            | Self::TableExhausted { location, .. }
            | Self::OutOfSpace { location, .. }
            | Self::NotFound { location, .. } => location,
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::string::ToString as _;

    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(ZeroSizeSnafu.build().kind().is_invalid_argument());
        assert!(NullAddressSnafu.build().kind().is_invalid_argument());
        assert!(
            SizeOverflowSnafu {
                count: usize::MAX,
                element_size: 2_usize,
            }
            .build()
            .kind()
            .is_invalid_argument()
        );
        assert!(
            TableExhaustedSnafu { capacity: 4_usize }
                .build()
                .kind()
                .is_table_exhausted()
        );
        assert!(
            OutOfSpaceSnafu {
                size: 10_usize,
                align: 1_usize,
            }
            .build()
            .kind()
            .is_out_of_space()
        );
        assert!(
            NotFoundSnafu { address: 0x10_usize }
                .build()
                .kind()
                .is_not_found()
        );
    }

    #[test]
    fn test_display() {
        let err = NotFoundSnafu {
            address: 0x1000_usize,
        }
        .build();
        assert_eq!(
            err.to_string(),
            "no live allocation starts at address 0x1000"
        );
        assert_eq!(err.kind().to_string(), "allocation not found");
    }

    #[test]
    fn test_location_points_at_caller() {
        let err = ZeroSizeSnafu.build();
        assert!(err.location().file.ends_with("error.rs"));
    }
}
