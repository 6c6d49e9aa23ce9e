use core::{fmt, mem};
use std::sync::{Mutex, PoisonError};

use crate::{console, log};

static SERIAL: Mutex<()> = Mutex::new(());
static CAPTURED: Mutex<String> = Mutex::new(String::new());

struct Capture;

impl fmt::Write for Capture {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        CAPTURED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(s);
        Ok(())
    }
}

pub(crate) fn leak_sink<W>(writer: W) -> console::Console
where
    W: fmt::Write + Send + 'static,
{
    console::Console::Other(Box::leak(Box::new(writer)))
}

/// Runs `test_fn` with console output captured and returns the output.
///
/// The console and the log level are global, so every test that prints or
/// logs goes through here to run one at a time.
pub(crate) fn with_captured_console<F>(test_fn: F) -> String
where
    F: FnOnce(),
{
    let _serial = SERIAL.lock().unwrap_or_else(PoisonError::into_inner);
    CAPTURED
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();

    let level = log::max_level();
    let previous = console::install(leak_sink(Capture));
    test_fn();
    console::uninstall();
    if let Some(previous) = previous {
        console::install(previous);
    }
    log::set_max_level(level);

    mem::take(&mut *CAPTURED.lock().unwrap_or_else(PoisonError::into_inner))
}
