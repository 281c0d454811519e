//! # cmdr
//!
//! A fluent builder for launching and supervising external processes.
//!
//! A [`Command`] accumulates its configuration (arguments, environment, working
//! directory, stdio routing, cancellation context, dry-run and silent modes) through
//! chained calls, then realizes it through one of several execution modes: blocking
//! [`Command::run`], stdout capture with [`Command::output`], merged capture with
//! [`Command::combined_output`], or [`Command::start`] followed by [`Command::wait`]
//! or [`Command::kill`].
//!
//! Every execution is announced through a [`Logger`] (a [`ConsoleLogger`] by default)
//! unless the command is silent. In dry-run mode the announcement is all that happens.
//!
//! ```no_run
//! use cmdr::Command;
//!
//! let mut cmd = Command::new(["echo", "hello"]);
//! cmd.run()?;
//! assert_eq!(cmd.exit_code(), 0);
//!
//! let go = Command::new(["go"]).as_runnable(cmdr::Sinks::Configured);
//! go(&["mod", "tidy"])?;
//! # Ok::<(), cmdr::ExecutionError>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// A shared flag; setting it to `true` requests cancellation.
pub type CancellationToken = Arc<AtomicBool>;

/// Default keys, widths and environment variable names.
pub mod constants;
/// The command builder, its execution modes and the action logger.
pub mod core;
/// Plain data types shared across the crate.
pub mod models;
/// The operating-system boundary: spawning, stdio and cancellation.
pub mod system;

pub use crate::core::command::Command;
pub use crate::core::execution::Captured;
pub use crate::core::logger::{CaptureLogger, ConsoleLogger, FacadeLogger, Label, Logger, Record};
pub use crate::core::settings::{self, ActionKeys, Settings};
pub use crate::models::{Action, AnsiColor, State};
pub use crate::system::context::{Context, Done};
pub use crate::system::executor::{ExecutionError, Process};
pub use crate::system::stdio::{Input, Output, SharedBuffer, Sinks};
