use std::{collections::VecDeque, sync::Mutex};

use godot::prelude::*;
use log::{Level, LevelFilter, Log, Metadata, Record};
use once_cell::sync::Lazy;

/// Oldest lines are dropped past this point.
const LOG_STORE_LIMIT: usize = 1_000;

static LOG_STORE: Lazy<Mutex<VecDeque<String>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(LOG_STORE_LIMIT)));

static GODOT_LOGGER: GodotLogger = GodotLogger;

fn add_to_log_store(message: String) {
    let Ok(mut store) = LOG_STORE.lock() else {
        return;
    };

    if store.len() >= LOG_STORE_LIMIT {
        store.pop_front();
    }
    store.push_back(message);
}

fn format_record(level: Level, target: &str, message: &str) -> String {
    format!("[{level}] {target}: {message}")
}

/// Forwards the `log` facade to the Godot console.
struct GodotLogger;

impl Log for GodotLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let message = format_record(record.level(), record.target(), &record.args().to_string());
        match record.level() {
            Level::Error => godot_error!("{message}"),
            Level::Warn => godot_warn!("{message}"),
            _ => godot_print!("{message}"),
        }
        add_to_log_store(message);
    }

    fn flush(&self) {}
}

/// Install the Godot logger and set the max level.
///
/// Safe to call more than once, later calls only change the level.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&GODOT_LOGGER);
    log::set_max_level(level);
}

/// Install the Godot logger at info level unless something already did.
pub fn ensure_init() {
    if log::set_logger(&GODOT_LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}

/// Logger usable from GDScript. Messages go through the same sink as the Rust side.
#[derive(Debug, GodotClass)]
pub struct Logger {
    name: String,
}

#[godot_api]
impl RefCountedVirtual for Logger {
    fn init(_base: godot::obj::Base<Self::Base>) -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

impl Logger {
    fn log(&self, level: Level, message: Variant) {
        ensure_init();
        log::log!(target: self.name.as_str(), level, "{}", message.stringify());
    }
}

#[godot_api]
impl Logger {
    #[func]
    fn create(name: GodotString) -> Gd<Logger> {
        Gd::new(Self {
            name: name.to_string(),
        })
    }

    #[func]
    fn debug(&self, message: Variant) {
        self.log(Level::Debug, message);
    }

    #[func]
    fn info(&self, message: Variant) {
        self.log(Level::Info, message);
    }

    #[func]
    fn warn(&self, message: Variant) {
        self.log(Level::Warn, message);
    }

    #[func]
    fn error(&self, message: Variant) {
        self.log(Level::Error, message);
    }

    /// Everything logged so far, oldest first.
    #[func]
    fn logs() -> Array<GodotString> {
        let mut r = Array::new();

        if let Ok(store) = LOG_STORE.lock() {
            for line in store.iter() {
                r.push(GodotString::from(line));
            }
        }

        r
    }
}
