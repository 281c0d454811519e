// src/constants.rs

use std::time::Duration;

/// The action key used when a command is run to completion.
pub const RUN_KEY: &str = "run";

/// The action key used when a command is started without waiting.
pub const START_KEY: &str = "start";

/// The action key used when waiting on a started command.
pub const WAIT_KEY: &str = "wait";

/// The action key used when a started command is killed.
pub const KILL_KEY: &str = "kill";

/// The action key used when a command's stdout is captured.
pub const OUTPUT_KEY: &str = "output";

/// The prefix joined with an action key while dry-run is active (e.g. "dry run").
pub const DRY_RUN_KEY: &str = "dry";

/// Width the action key is right-justified to.
pub const DEFAULT_COLS: usize = 5;

/// Width the action key is right-justified to while dry-run is active.
pub const DRY_RUN_COLS: usize = 10;

/// Default `chrono` format for log timestamps (RFC 3339, local offset).
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Either of these set to a true boolean enables ANSI color in log output.
pub const ENABLE_COLOR_ENV_VARS: [&str; 2] = ["CMDR_ENABLE_COLOR", "MAGEFILE_ENABLE_COLOR"];

/// Set to a true boolean to put every command in dry-run mode at startup.
pub const DRY_RUN_ENV_VAR: &str = "CMDR_DRY_RUN";

/// Set to a true boolean to omit timestamps from log lines.
pub const NO_TIMESTAMP_ENV_VAR: &str = "CMDR_NO_TIMESTAMP";

/// Color name used for the action key.
pub const COLOR_ENV_VAR: &str = "CMDR_COLOR";

/// Color name used for the action key while dry-run is active.
pub const DRY_RUN_COLOR_ENV_VAR: &str = "CMDR_DRY_RUN_COLOR";

/// How often a blocked wait re-checks its context for cancellation.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Chunk size used when pumping child output into a shared writer.
pub const PUMP_BUFFER_SIZE: usize = 8 * 1024;
