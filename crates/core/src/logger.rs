//! Process-wide log sink: a plain-text file plus, in TUI mode, a channel of
//! structured lines for the log panel.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{mpsc, Mutex, OnceLock};
use chrono::Local;

use crate::types::{StatusKind, StatusLine};

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: File,
    tui_tx: Option<mpsc::Sender<String>>,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for TUI rendering (mapped in ui.rs)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;

/// Field separator of the structured TUI lines.
pub const FIELD_SEP: char = '\x1f';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl From<StatusKind> for Level {
    fn from(kind: StatusKind) -> Self {
        match kind {
            StatusKind::Info | StatusKind::Decoded => Level::Info,
            StatusKind::DecodeFailed => Level::Warn,
            StatusKind::Error => Level::Error,
        }
    }
}

/// Open (and truncate) `cimwatch.log` under `log_dir`.
/// Until this succeeds every log function is a no-op.
pub fn init(log_dir: &Path) -> io::Result<()> {
    fs::create_dir_all(log_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_dir.join("cimwatch.log"))?;

    LOGGER
        .set(Mutex::new(Logger { file, tui_tx: None, prefixes: HashMap::new() }))
        .ok();
    Ok(())
}

/// Wire the TUI log channel.
pub fn set_tui_sender(tx: mpsc::Sender<String>) {
    if let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) {
        l.tui_tx = Some(tx);
    }
}

/// Give `prefix` a color in the TUI log panel.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) {
        l.prefixes.insert(prefix.to_string(), color);
    }
}

fn file_line(level: Level, prefix: &str, ts: &str, msg: &str) -> String {
    if prefix.is_empty() {
        format!("[{}] [{}] {}", ts, level.tag(), msg)
    } else {
        format!("[{}] [{}] [{}] {}", ts, level.tag(), prefix, msg)
    }
}

/// level, prefix, color, timestamp, message joined by [`FIELD_SEP`].
fn tui_line(level: Level, prefix: &str, color: u8, ts: &str, msg: &str) -> String {
    let color = color.to_string();
    [level.tag(), prefix, color.as_str(), ts, msg].join("\x1f")
}

fn write_log(level: Level, prefix: &str, msg: &str) {
    let Some(mut l) = LOGGER.get().and_then(|l| l.lock().ok()) else { return };
    let ts = Local::now().format("%H:%M:%S").to_string();
    let color = l.prefixes.get(prefix).copied().unwrap_or(0);

    writeln!(l.file, "{}", file_line(level, prefix, &ts, msg)).ok();
    if let Some(tx) = &l.tui_tx {
        tx.send(tui_line(level, prefix, color, &ts, msg)).ok();
    }
}

pub fn info(msg: &str) {
    write_log(Level::Info, "", msg);
}

pub fn warn(msg: &str) {
    write_log(Level::Warn, "", msg);
}

pub fn error(msg: &str) {
    write_log(Level::Error, "", msg);
}

pub fn info_p(prefix: &str, msg: &str) {
    write_log(Level::Info, prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log(Level::Warn, prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log(Level::Error, prefix, msg);
}

/// Log a status line at the level matching its kind.
pub fn status(prefix: &str, line: &StatusLine) {
    write_log(line.kind.into(), prefix, line.message.trim_end());
}
