//! Rendering of unrecoverable errors.

use core::{error::Error, fmt};

use allocator::AllocError;
use snafu::Location;

use crate::{
    ansi::{Color, WithFg},
    boot::BootError,
};

/// Formats an error followed by its chain of causes.
///
/// ```text
/// Error: failed to initialize heap at 0x0..0x100
///   at crates/runtime/src/boot.rs:190:52
///
/// Caused by:
///    0: null address given where a live allocation is required
///       at crates/allocator/src/table_allocator.rs:91:9
/// ```
pub struct Report<E> {
    error: E,
}

impl<E> fmt::Debug for Report<E>
where
    E: Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<E> fmt::Display for Report<E>
where
    E: Error + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Error: {}", WithFg::new(Color::Red, &self.error))?;
        if let Some(loc) = location_of(&self.error) {
            writeln!(f, "  at {}", WithFg::new(Color::DarkGray, LocationFormat(loc)))?;
        }
        let mut source = self.error.source();
        if source.is_some() {
            writeln!(f)?;
            writeln!(f, "Caused by:")?;
        }
        let mut index = 0;
        while let Some(s) = source {
            writeln!(f, "{index:4}: {}", WithFg::new(Color::Red, s))?;
            if let Some(loc) = location_of(s) {
                writeln!(f, "      at {}", WithFg::new(Color::DarkGray, LocationFormat(loc)))?;
            }
            source = s.source();
            index += 1;
        }
        Ok(())
    }
}

impl<E> Report<E> {
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

fn location_of<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a Location> {
    if let Some(err) = error.downcast_ref::<BootError>() {
        return Some(err.location());
    }
    error.downcast_ref::<AllocError>().map(AllocError::location)
}

struct LocationFormat<'a>(&'a Location);

impl fmt::Display for LocationFormat<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc = self.0;
        write!(f, "{}:{}:{}", loc.file, loc.line, loc.column)
    }
}

/// Panics with the rendered report of `err`.
#[track_caller]
pub fn report<E>(err: E) -> !
where
    E: Error + 'static,
{
    let panic_message = WithFg::new(Color::Red, "Critical error occurred");
    let report = Report::new(err);
    panic!("{panic_message}\n\n{report}");
}
