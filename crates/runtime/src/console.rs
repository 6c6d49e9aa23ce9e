//! Process-wide console output.
//!
//! Output goes to a single sink: a [`Uart`], a VGA text [`Writer`], or any
//! other [`fmt::Write`] implementor with a `'static` lifetime. Until a sink
//! is installed, everything printed is discarded.

use core::fmt;

use spin::Mutex;
use uart::Uart;
use vga_text::{MmioBuffer, Writer};

static CONSOLE: Mutex<Option<Console>> = Mutex::new(None);

/// A console sink.
#[derive(derive_more::Debug, derive_more::From)]
pub enum Console {
    Uart(Uart),
    Vga(Writer<MmioBuffer>),
    Other(#[debug("..")] &'static mut (dyn fmt::Write + Send)),
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        match self {
            Self::Uart(uart) => uart.write_str(s),
            Self::Vga(writer) => writer.write_str(s),
            Self::Other(writer) => writer.write_str(s),
        }
    }
}

/// Routes console output to `sink` and returns the previously installed
/// sink.
pub fn install<S>(sink: S) -> Option<Console>
where
    S: Into<Console>,
{
    CONSOLE.lock().replace(sink.into())
}

/// Removes the installed sink and returns it.
pub fn uninstall() -> Option<Console> {
    CONSOLE.lock().take()
}

#[must_use]
pub fn is_installed() -> bool {
    CONSOLE.lock().is_some()
}

/// Writes `args` to the installed sink.
///
/// Formatting and sink errors are dropped.
pub fn print(args: fmt::Arguments) {
    if let Some(console) = CONSOLE.lock().as_mut() {
        let _ = fmt::Write::write_fmt(console, args);
    }
}

/// Like [`print`], but drops `args` instead of waiting when the console is
/// in use.
///
/// Code that may run while the console is locked, such as the global
/// allocator called from a sink, must print through here. Returns `false`
/// if the output was dropped.
pub fn try_print(args: fmt::Arguments) -> bool {
    let Some(mut console) = CONSOLE.try_lock() else {
        return false;
    };
    if let Some(console) = console.as_mut() {
        let _ = fmt::Write::write_fmt(console, args);
    }
    true
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {
        $crate::print!("{}\n", format_args!($($arg)*))
    };
}
