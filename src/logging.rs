//! Console logger for the demonstration binary.
//!
//! Every record is written to stdout as one line tagged with its level and the
//! name of the emitting thread, so the interleaving of workers can be read
//! straight off the terminal. Levels are colour coded when stdout is a
//! terminal.

use std::io::{self, IsTerminal, Write};

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Installs the console logger.
///
/// The level comes from the `LOG` environment variable
/// (`ERROR`, `WARN`, `INFO`, `DEBUG`, `TRACE` or `OFF`, case-insensitive);
/// anything else, or no variable, selects `DEBUG`, which shows every lock
/// acquisition and release.
pub fn init() -> Result<(), SetLoggerError> {
    static LOGGER: ConsoleLogger = ConsoleLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(level_from(std::env::var("LOG").ok().as_deref()));
    Ok(())
}

fn level_from(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(LevelFilter::Debug)
}

struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let current = std::thread::current();
        let thread = current.name().unwrap_or("main");
        let stdout = io::stdout();
        let line = if stdout.is_terminal() {
            format!(
                "\u{1B}[{}m[{:>5}]\u{1B}[0m[{thread}] {}",
                level_to_color_code(record.level()),
                record.level(),
                record.args()
            )
        } else {
            format!("[{:>5}][{thread}] {}", record.level(), record.args())
        };
        let _ = writeln!(stdout.lock(), "{line}");
    }

    fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

fn level_to_color_code(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}
