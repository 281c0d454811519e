// src/core/logger.rs

//! # Action Logger
//!
//! Commands announce what they are about to do through a [`Logger`]. The capability
//! has exactly two operations, [`Logger::log`] and [`Logger::logf`], and any
//! implementation can be handed to a command with `with_logger`.
//!
//! Each call carries a [`Label`]: the action key ("run", "start", "dry run", ...), the
//! color to paint it with and the column width it is right-justified to. This is how
//! a command switches keys for dry-run or kill without touching any shared state.
//!
//! Implementations provided here:
//! - [`ConsoleLogger`]: the default, renders `<key> : <message> : <timestamp>` lines.
//! - [`CaptureLogger`]: records every line in memory.
//! - [`FacadeLogger`]: forwards lines to the `log` facade.

use crate::constants::DEFAULT_COLS;
use crate::core::color::paint;
use crate::core::settings::{self, Settings};
use crate::models::AnsiColor;
use crate::system::stdio::Output;
use chrono::{Local, SecondsFormat};
use std::fmt::{self, Write as _};
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// The action key and its presentation for one log call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// The action key, e.g. "run".
    pub key: String,
    /// The color the key is painted with, if any.
    pub color: Option<AnsiColor>,
    /// The width the key is right-justified to.
    pub cols: usize,
}

impl Label {
    /// An uncolored label with the default width.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            color: None,
            cols: DEFAULT_COLS,
        }
    }

    /// Sets the color of the key.
    pub fn with_color(mut self, color: AnsiColor) -> Self {
        self.color = Some(color);
        self
    }

    /// Sets the width the key is right-justified to.
    pub fn with_cols(mut self, cols: usize) -> Self {
        self.cols = cols;
        self
    }
}

/// A sink for command announcements.
pub trait Logger: fmt::Debug + Send + Sync {
    /// Logs the values, each in its default `Display` form, separated by spaces.
    fn log(&self, label: &Label, values: &[&dyn fmt::Display]);

    /// Logs pre-formatted arguments, as produced by `format_args!`.
    fn logf(&self, label: &Label, args: fmt::Arguments<'_>);
}

fn join_values(values: &[&dyn fmt::Display]) -> String {
    let mut joined = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            joined.push(' ');
        }
        joined.push_str(&value.to_string());
    }
    joined
}

/// The default console logger.
///
/// Timestamp presence, time format and color enablement are taken from the current
/// [`Settings`] when the logger is constructed. A key, color or width set with
/// [`with_key`](Self::with_key), [`with_color`](Self::with_color) or
/// [`with_cols`](Self::with_cols) is pinned and wins over the one supplied by each
/// call's label.
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    key: Option<String>,
    color: Option<AnsiColor>,
    cols: Option<usize>,
    no_timestamp: bool,
    timestamps: bool,
    time_format: String,
    colors: bool,
    sink: Output,
}

impl ConsoleLogger {
    /// A logger writing to stdout, configured from the process-wide settings.
    pub fn new() -> Self {
        Self::from_settings(&settings::current())
    }

    /// A logger writing to stdout, configured from `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            key: None,
            color: None,
            cols: None,
            no_timestamp: false,
            timestamps: settings.timestamps,
            time_format: settings.time_format.clone(),
            colors: settings.colors,
            sink: Output::Inherit,
        }
    }

    /// Pins the key this logger prints, regardless of the action.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Pins the color this logger paints keys with.
    pub fn with_color(mut self, color: AnsiColor) -> Self {
        self.color = Some(color);
        self
    }

    /// Pins the width keys are right-justified to.
    pub fn with_cols(mut self, cols: usize) -> Self {
        self.cols = Some(cols);
        self
    }

    /// Omits the timestamp from every line.
    pub fn without_timestamp(mut self) -> Self {
        self.no_timestamp = true;
        self
    }

    /// Redirects lines away from stdout.
    pub fn with_writer(mut self, sink: impl Into<Output>) -> Self {
        self.sink = sink.into();
        self
    }

    /// Renders one complete line, including the trailing newline.
    pub fn render(&self, label: &Label, message: &str) -> String {
        let key = self.key.as_deref().unwrap_or(&label.key);
        let color = self.color.or(label.color);
        let width = self.cols.unwrap_or(label.cols);

        let mut line = paint(&format!("{:>width$}", key), color, self.colors);
        line.push_str(&paint(" : ", Some(AnsiColor::DarkGrey), self.colors));
        line.push_str(message);
        if self.timestamps && !self.no_timestamp {
            let stamp = format!(" : {}", self.timestamp());
            line.push_str(&paint(&stamp, Some(AnsiColor::DarkGrey), self.colors));
        }
        line.push('\n');
        line
    }

    fn timestamp(&self) -> String {
        let now = Local::now();
        let mut stamp = String::new();
        // An invalid user-supplied format must not take the process down.
        if write!(stamp, "{}", now.format(&self.time_format)).is_err() {
            stamp = now.to_rfc3339_opts(SecondsFormat::Secs, false);
        }
        stamp
    }

    fn emit(&self, line: &str) {
        let result = match &self.sink {
            Output::Inherit => io::stdout().lock().write_all(line.as_bytes()),
            Output::Null => Ok(()),
            Output::Writer(writer) => writer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(line.as_bytes()),
        };
        if let Err(e) = result {
            log::debug!("Failed to write log line: {}", e);
        }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, label: &Label, values: &[&dyn fmt::Display]) {
        self.emit(&self.render(label, &join_values(values)));
    }

    fn logf(&self, label: &Label, args: fmt::Arguments<'_>) {
        self.emit(&self.render(label, &args.to_string()));
    }
}

/// One line recorded by a [`CaptureLogger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// The action key the line was logged under.
    pub key: String,
    /// The rendered message, without key or timestamp.
    pub message: String,
}

/// Records log lines in memory. Clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct CaptureLogger {
    records: Arc<Mutex<Vec<Record>>>,
}

impl CaptureLogger {
    /// An empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything logged so far.
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The messages logged so far, in order.
    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    /// The keys logged so far, in order.
    pub fn keys(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.key).collect()
    }

    /// Whether nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    fn push(&self, label: &Label, message: String) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Record {
                key: label.key.clone(),
                message,
            });
    }
}

impl Logger for CaptureLogger {
    fn log(&self, label: &Label, values: &[&dyn fmt::Display]) {
        self.push(label, join_values(values));
    }

    fn logf(&self, label: &Label, args: fmt::Arguments<'_>) {
        self.push(label, args.to_string());
    }
}

/// Forwards command announcements to the `log` facade at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct FacadeLogger {
    level: log::Level,
}

impl FacadeLogger {
    /// Logs every announcement at `level`.
    pub fn new(level: log::Level) -> Self {
        Self { level }
    }
}

impl Default for FacadeLogger {
    fn default() -> Self {
        Self::new(log::Level::Info)
    }
}

impl Logger for FacadeLogger {
    fn log(&self, label: &Label, values: &[&dyn fmt::Display]) {
        log::log!(target: "cmdr", self.level, "{} : {}", label.key, join_values(values));
    }

    fn logf(&self, label: &Label, args: fmt::Arguments<'_>) {
        log::log!(target: "cmdr", self.level, "{} : {}", label.key, args);
    }
}
