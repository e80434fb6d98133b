//! A process-wide logger that keeps every record for later assertions.

use log::{Level, LevelFilter, Log, Metadata, Record};
use std::sync::Mutex;

struct CaptureLogger {
    records: Mutex<Vec<(Level, String, String)>>,
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut records) = self.records.lock() {
            records.push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }
    }

    fn flush(&self) {}
}

/// Installs the capturing logger. Later calls (and other loggers) are ignored.
pub fn install() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}

pub fn messages() -> Vec<String> {
    LOGGER
        .records
        .lock()
        .map(|r| r.iter().map(|(_, _, message)| message.clone()).collect())
        .unwrap_or_default()
}

/// Messages logged under `target` at `level` or more severe.
pub fn messages_for(target: &str, level: Level) -> Vec<String> {
    LOGGER
        .records
        .lock()
        .map(|r| {
            r.iter()
                .filter(|(l, t, _)| t == target && *l <= level)
                .map(|(_, _, message)| message.clone())
                .collect()
        })
        .unwrap_or_default()
}

pub fn contains(needle: &str) -> bool {
    messages().iter().any(|m| m.contains(needle))
}
