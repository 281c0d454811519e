// src/core/settings.rs

//! # Settings
//!
//! The process-wide configuration context: the global dry-run toggle, the action
//! keys, column widths, colors and timestamp presentation of log lines, plus the
//! default logger.
//!
//! The global context is initialized from the environment on first use and can be
//! replaced with [`install`]. Individual commands can bypass it entirely with
//! `Command::with_settings`. The global dry-run flag applies to every command either
//! way.
//!
//! These values are meant to be set once at program start. Changing them while other
//! threads are executing commands is allowed but the outcome for in-flight commands
//! is unspecified.

use crate::constants::{
    COLOR_ENV_VAR, DEFAULT_COLS, DEFAULT_TIME_FORMAT, DRY_RUN_COLOR_ENV_VAR, DRY_RUN_COLS,
    DRY_RUN_ENV_VAR, DRY_RUN_KEY, ENABLE_COLOR_ENV_VARS, KILL_KEY, NO_TIMESTAMP_ENV_VAR,
    OUTPUT_KEY, RUN_KEY, START_KEY, WAIT_KEY,
};
use crate::core::color::{force_terminal_colors, parse_color_name};
use crate::core::logger::{Label, Logger};
use crate::models::{Action, AnsiColor};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

/// The key logged for each execution mode.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ActionKeys {
    /// Logged by `run` and `combined_output`.
    pub run: String,
    /// Logged by `start`.
    pub start: String,
    /// Logged by `wait`.
    pub wait: String,
    /// Logged by `kill`.
    pub kill: String,
    /// Logged by `output` in dry-run mode.
    pub output: String,
    /// Prefix joined with the action's key while dry-run is active.
    pub dry_run: String,
}

impl Default for ActionKeys {
    fn default() -> Self {
        Self {
            run: RUN_KEY.to_string(),
            start: START_KEY.to_string(),
            wait: WAIT_KEY.to_string(),
            kill: KILL_KEY.to_string(),
            output: OUTPUT_KEY.to_string(),
            dry_run: DRY_RUN_KEY.to_string(),
        }
    }
}

impl ActionKeys {
    /// The key for `action`.
    pub fn for_action(&self, action: Action) -> &str {
        match action {
            Action::Run => &self.run,
            Action::Start => &self.start,
            Action::Wait => &self.wait,
            Action::Kill => &self.kill,
            Action::Output => &self.output,
        }
    }
}

/// Ambient configuration shared by every command that doesn't bring its own.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Log every command instead of executing it.
    pub dry_run: bool,
    /// Emit ANSI colors in log lines.
    pub colors: bool,
    /// Append a timestamp to log lines.
    pub timestamps: bool,
    /// `chrono` strftime format of the timestamp.
    pub time_format: String,
    /// Width the action key is right-justified to.
    pub cols: usize,
    /// Width the action key is right-justified to while dry-run is active.
    pub dry_run_cols: usize,
    /// Color of the action key.
    pub color: AnsiColor,
    /// Color of the action key while dry-run is active.
    pub dry_run_color: AnsiColor,
    /// The action keys.
    pub keys: ActionKeys,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dry_run: false,
            colors: false,
            timestamps: true,
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            cols: DEFAULT_COLS,
            dry_run_cols: DRY_RUN_COLS,
            color: AnsiColor::Teal,
            dry_run_color: AnsiColor::Yellow,
            keys: ActionKeys::default(),
        }
    }
}

impl Settings {
    /// Reads the settings from the process environment.
    ///
    /// Colors are off unless `CMDR_ENABLE_COLOR` or `MAGEFILE_ENABLE_COLOR` is a true
    /// boolean. See [`from_lookup`](Self::from_lookup) for the full list.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    ///
    /// Recognized variables: `CMDR_ENABLE_COLOR` / `MAGEFILE_ENABLE_COLOR`,
    /// `CMDR_DRY_RUN`, `CMDR_NO_TIMESTAMP`, `CMDR_COLOR` and `CMDR_DRY_RUN_COLOR`.
    /// Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str| lookup(key).as_deref().and_then(parse_bool).unwrap_or(false);
        let color = |key: &str, fallback: AnsiColor| match lookup(key) {
            Some(name) => parse_color_name(&name).unwrap_or_else(|e| {
                log::warn!("Ignoring {}: {}", key, e);
                fallback
            }),
            None => fallback,
        };

        let defaults = Self::default();
        Self {
            dry_run: flag(DRY_RUN_ENV_VAR),
            colors: ENABLE_COLOR_ENV_VARS.iter().any(|&key| flag(key)),
            timestamps: !flag(NO_TIMESTAMP_ENV_VAR),
            color: color(COLOR_ENV_VAR, defaults.color),
            dry_run_color: color(DRY_RUN_COLOR_ENV_VAR, defaults.dry_run_color),
            ..defaults
        }
    }

    /// Parses settings from TOML. Missing fields keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse cmdr settings")
    }

    /// Loads settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file '{}'", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid settings file '{}'", path.display()))
    }

    /// The label announcing `action`.
    pub fn label(&self, action: Action) -> Label {
        Label::new(self.keys.for_action(action))
            .with_color(self.color)
            .with_cols(self.cols)
    }

    /// The label announcing `action` while dry-run is active.
    ///
    /// `custom` replaces the composed `<dry-run key> <action key>` key.
    pub fn dry_run_label(&self, action: Action, custom: Option<&str>) -> Label {
        let key = match custom {
            Some(custom) => custom.to_string(),
            None => format!("{} {}", self.keys.dry_run, self.keys.for_action(action)),
        };
        Label::new(key)
            .with_color(self.dry_run_color)
            .with_cols(self.dry_run_cols)
    }
}

/// Parses a boolean the way the classic `ParseBool` function does.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

struct Global {
    settings: Arc<Settings>,
    logger: Option<Arc<dyn Logger>>,
}

lazy_static! {
    static ref GLOBAL: RwLock<Global> = {
        let settings = Settings::from_env();
        force_terminal_colors(settings.colors);
        RwLock::new(Global {
            settings: Arc::new(settings),
            logger: None,
        })
    };
}

/// A snapshot of the process-wide settings.
pub fn current() -> Arc<Settings> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .settings
        .clone()
}

/// Replaces the process-wide settings.
pub fn install(settings: Settings) {
    force_terminal_colors(settings.colors);
    GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .settings = Arc::new(settings);
}

/// Turns the global dry-run toggle on or off. While on, every command behaves as if
/// it had been configured with `dry_run`.
pub fn set_dry_run(enabled: bool) {
    let mut global = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    if global.settings.dry_run != enabled {
        let mut settings = (*global.settings).clone();
        settings.dry_run = enabled;
        global.settings = Arc::new(settings);
    }
}

/// Whether the global dry-run toggle is on.
pub fn is_dry_run() -> bool {
    current().dry_run
}

/// Replaces the logger used by commands that don't set their own.
pub fn set_default_logger(logger: impl Logger + 'static) {
    GLOBAL.write().unwrap_or_else(PoisonError::into_inner).logger = Some(Arc::new(logger));
}

/// Restores the default console logger.
pub fn clear_default_logger() {
    GLOBAL.write().unwrap_or_else(PoisonError::into_inner).logger = None;
}

/// The logger installed with [`set_default_logger`], if any.
pub fn default_logger() -> Option<Arc<dyn Logger>> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .logger
        .clone()
}
