// src/core/command.rs

//! # Command
//!
//! The configuration half of the builder: construction, the chainable `with_*`
//! calls and the read-only accessors over a command's runtime state. The execution
//! modes live in [`crate::core::execution`].

use crate::core::color::paint;
use crate::core::logger::{ConsoleLogger, Label, Logger};
use crate::core::settings::{self, Settings};
use crate::models::{Action, State};
use crate::system::context::Context;
use crate::system::executor::{ExecutionError, Process, resolve_program};
use crate::system::stdio::{Input, Output};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A configurable, chainable description of a process invocation.
///
/// Configuration calls consume and return the builder. Execution modes take
/// `&mut self` and record the outcome (exit code, timing, process handle) on the
/// instance. Running the same instance again re-executes the process and overwrites
/// that state.
#[derive(Debug)]
pub struct Command {
    pub(crate) argv: Vec<String>,
    pub(crate) env: Vec<OsString>,
    pub(crate) dir: Option<PathBuf>,
    pub(crate) stdin: Input,
    pub(crate) stdout: Output,
    pub(crate) stderr: Output,
    pub(crate) context: Context,
    pub(crate) dry_run: bool,
    pub(crate) dry_run_label: Option<String>,
    pub(crate) silent: bool,
    pub(crate) logger: Option<Arc<dyn Logger>>,
    pub(crate) settings: Option<Arc<Settings>>,

    pub(crate) process: Option<Process>,
    pub(crate) state: State,
    pub(crate) complete: bool,
    pub(crate) failed: bool,
    pub(crate) exit_code: i32,
    pub(crate) started_at: Option<Instant>,
    pub(crate) ended_at: Option<Instant>,
}

impl Command {
    /// A command running `argv[0]` with the remaining elements as arguments.
    ///
    /// Stdio is inherited, the environment is a snapshot of the caller's, and the
    /// context is a background context.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: std::env::vars_os()
                .map(|(key, value)| {
                    let mut entry = key;
                    entry.push("=");
                    entry.push(value);
                    entry
                })
                .collect(),
            dir: None,
            stdin: Input::Inherit,
            stdout: Output::Inherit,
            stderr: Output::Inherit,
            context: Context::background(),
            dry_run: false,
            dry_run_label: None,
            silent: false,
            logger: None,
            settings: None,
            process: None,
            state: State::Configured,
            complete: false,
            failed: false,
            exit_code: 0,
            started_at: None,
            ended_at: None,
        }
    }

    /// Splits a command line with shell quoting rules into a command.
    pub fn from_command_line(command_line: &str) -> Result<Self, ExecutionError> {
        let parts = shlex::split(command_line.trim())
            .ok_or_else(|| ExecutionError::CommandParse(command_line.to_string()))?;
        Ok(Self::new(parts))
    }

    // --- Configuration ---

    /// Appends arguments. Appending nothing leaves the command unchanged.
    pub fn with_arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the context the process is created with. Cancelling it, or letting its
    /// deadline pass, kills the process and fails the execution.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Runs the process in `dir`. An empty path means the caller's current directory.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.dir = if dir.as_os_str().is_empty() { None } else { Some(dir) };
        self
    }

    /// Appends `KEY=VALUE` entries to the environment.
    ///
    /// The process sees the caller's environment plus these entries. When a key
    /// appears more than once, the last value wins.
    pub fn with_environment<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.env.extend(vars.into_iter().map(Into::into));
        self
    }

    /// Feeds `input` to the process's stdin, then closes it.
    pub fn with_input(self, input: impl Into<Vec<u8>>) -> Self {
        self.with_stdin(Input::bytes(input))
    }

    /// Reverts stdin to the caller's stdin.
    pub fn inherit_input(self) -> Self {
        self.with_stdin(Input::Inherit)
    }

    /// Sets stdin to any [`Input`].
    pub fn with_stdin(mut self, stdin: Input) -> Self {
        self.stdin = stdin;
        self
    }

    /// Replaces stdout and, if given, stderr. Without `stderr` the configured stderr
    /// is kept.
    pub fn with_output(mut self, stdout: impl Into<Output>, stderr: Option<Output>) -> Self {
        self.stdout = stdout.into();
        if let Some(stderr) = stderr {
            self.stderr = stderr;
        }
        self
    }

    /// Announces executions through `logger` instead of the default one.
    pub fn with_logger(self, logger: impl Logger + 'static) -> Self {
        self.with_shared_logger(Arc::new(logger))
    }

    /// Announces executions through an already shared logger.
    pub fn with_shared_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Uses `settings` for this command instead of the process-wide ones. The global
    /// dry-run toggle still applies.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = Some(Arc::new(settings));
        self
    }

    /// Suppresses the announcement made before execution. Dry-run lines are still
    /// logged.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Logs instead of executing.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Logs instead of executing, under `label` rather than the composed
    /// `"dry <action>"` key.
    pub fn dry_run_with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.dry_run = true;
        self.dry_run_label = if label.is_empty() { None } else { Some(label) };
        self
    }

    // --- Accessors ---

    /// The program followed by its arguments.
    pub fn arguments(&self) -> &[String] {
        &self.argv
    }

    /// The `KEY=VALUE` environment, including entries inherited at construction.
    pub fn environment(&self) -> &[OsString] {
        &self.env
    }

    /// The configured working directory, if any.
    pub fn working_directory(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// The configured context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// The exit code of the last execution; 0 until one finished.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// How long the last execution took. Zero until it completed.
    pub fn duration(&self) -> Duration {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    /// Whether the last execution ran to completion.
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Whether the last execution failed or was killed.
    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Where the command is in its lifecycle.
    pub fn state(&self) -> State {
        self.state
    }

    /// The underlying process, once started.
    pub fn process_handle(&self) -> Option<&Process> {
        self.process.as_ref()
    }

    /// The OS process id, once started.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(Process::id)
    }

    /// Whether the pre-execution announcement is suppressed.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Whether executions will only be logged, from this command's own flag, its
    /// settings, or the global toggle.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
            || self.settings.as_ref().is_some_and(|s| s.dry_run)
            || settings::is_dry_run()
    }

    /// A human-readable rendering of the invocation, e.g. `/usr/bin/echo foo`.
    ///
    /// For debugging only: it is not quoted and not suitable as shell input.
    pub fn describe(&self) -> String {
        let Some((program, args)) = self.argv.split_first() else {
            return String::new();
        };
        let mut rendered = resolve_program(program).display().to_string();
        for arg in args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }

    /// Logs the invocation under the "run" key, unless the command is silent.
    pub fn log_command(&self) {
        if self.silent {
            return;
        }
        let settings = self.effective_settings();
        self.announce(&settings, &settings.label(Action::Run));
    }

    // --- Internals shared with the execution modes ---

    pub(crate) fn effective_settings(&self) -> Arc<Settings> {
        self.settings.clone().unwrap_or_else(settings::current)
    }

    fn resolved_logger(&self, settings: &Settings) -> Arc<dyn Logger> {
        self.logger
            .clone()
            .or_else(crate::core::settings::default_logger)
            .unwrap_or_else(|| Arc::new(ConsoleLogger::from_settings(settings)))
    }

    /// Logs `[argv]` and, when set, ` in <dir>` under `label`. Ignores `silent`.
    pub(crate) fn announce(&self, settings: &Settings, label: &Label) {
        let logger = self.resolved_logger(settings);
        let argv = self.argv.join(" ");
        match &self.dir {
            Some(dir) => logger.logf(
                label,
                format_args!(
                    "[{}]{} {}",
                    argv,
                    paint(" in", label.color, settings.colors),
                    dir.display()
                ),
            ),
            None => logger.logf(label, format_args!("[{}]", argv)),
        }
    }

    /// Resets runtime state ahead of a new execution.
    pub(crate) fn reset_outcome(&mut self) {
        self.complete = false;
        self.failed = false;
        self.started_at = None;
        self.ended_at = None;
    }
}

impl Clone for Command {
    /// Copies the configuration. Argument and environment lists are independent
    /// copies; stdio handles, context, logger and settings are shared with the
    /// original. The clone starts over in the `Configured` state.
    fn clone(&self) -> Self {
        Self {
            argv: self.argv.clone(),
            env: self.env.clone(),
            dir: self.dir.clone(),
            stdin: self.stdin.clone(),
            stdout: self.stdout.clone(),
            stderr: self.stderr.clone(),
            context: self.context.clone(),
            dry_run: self.dry_run,
            dry_run_label: self.dry_run_label.clone(),
            silent: self.silent,
            logger: self.logger.clone(),
            settings: self.settings.clone(),
            process: None,
            state: State::Configured,
            complete: false,
            failed: false,
            exit_code: 0,
            started_at: None,
            ended_at: None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
