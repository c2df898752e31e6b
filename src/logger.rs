//! Output plumbing: every protocol line goes through [`emit`], which tees
//! into an optional log file beside the binary. Crate-internal `log`
//! records surface as UCI `info string` lines.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

pub const LOG_NAME: &str = "basalt_log.txt";

static LOG_FILE: Lazy<Mutex<Option<File>>> = Lazy::new(|| Mutex::new(None));

/// Directory of the running binary; falls back to the working directory.
#[must_use]
pub fn binary_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Start or stop duplicating the protocol streams into the log file.
pub fn set_enabled(enabled: bool) {
    let mut file = LOG_FILE.lock();
    *file = if enabled {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(binary_dir().join(LOG_NAME))
            .ok()
    } else {
        None
    };
}

fn tee(prefix: &str, line: &str) {
    let mut file = LOG_FILE.lock();
    if let Some(file) = file.as_mut() {
        let _ = writeln!(file, "{prefix}{line}");
    }
}

/// Print one protocol line and mirror it into the log.
pub fn emit(line: &str) {
    println!("{line}");
    tee(">> ", line);
}

/// Record one received protocol line.
pub fn record_input(line: &str) {
    tee("<< ", line);
}

struct InfoLogger;

impl log::Log for InfoLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        match record.level() {
            log::Level::Error | log::Level::Warn => {
                emit(&format!("info string warning: {}", record.args()));
            }
            _ => emit(&format!("info string {}", record.args())),
        }
    }

    fn flush(&self) {}
}

static LOGGER: InfoLogger = InfoLogger;

/// Install the logger; safe to call more than once.
pub fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(log::LevelFilter::Info);
    }
}
