// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Log facade wiring.
//!
//! The crate logs through the `log` macros only; this module plugs an
//! injected console into them. On hardware the console is a UART writer, in
//! the host harness it is standard output.

use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::mutex::SpinMutex;

static LOGGER: Logger = Logger {
    console: SpinMutex::new(None),
};

struct Logger {
    console: SpinMutex<Option<&'static mut (dyn Write + Send)>>,
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Some(console) = self.console.lock().as_mut() {
            let _ = writeln!(console, "[{:5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Installs the logger over the given console.
pub fn init(
    console: &'static mut (dyn Write + Send),
    level: LevelFilter,
) -> Result<(), SetLoggerError> {
    LOGGER.console.lock().replace(console);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}
