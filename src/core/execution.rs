// src/core/execution.rs

//! # Execution Modes
//!
//! Every mode follows the same protocol: check dry-run (log and return if active),
//! announce the invocation unless silent, create the process, and record the outcome
//! on the command.
//!
//! | mode                | blocks | state transition                      |
//! |---------------------|--------|---------------------------------------|
//! | `run`               | yes    | Configured -> Completed / Failed      |
//! | `output`            | yes    | Configured -> Completed / Failed      |
//! | `combined_output`   | yes    | Configured -> Completed / Failed      |
//! | `start`             | no     | Configured -> Started                 |
//! | `wait`              | yes    | Started -> Completed / Failed         |
//! | `kill`              | no     | Started -> Killed                     |

use crate::core::command::Command;
use crate::core::settings::Settings;
use crate::models::{Action, State};
use crate::system::executor::{self, ExecutionError, Invocation, Process};
use crate::system::stdio::{Output, SharedBuffer, Sinks};
use std::time::Instant;

/// Bytes captured by [`Command::output`] or [`Command::combined_output`], together
/// with the outcome of the execution that produced them.
#[derive(Debug)]
pub struct Captured {
    /// Everything captured before the process exited.
    pub bytes: Vec<u8>,
    /// The execution error, if the command failed.
    pub error: Option<ExecutionError>,
}

impl Captured {
    /// The captured bytes on success, the error otherwise.
    pub fn into_result(self) -> Result<Vec<u8>, ExecutionError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.bytes),
        }
    }

    /// Whether the execution succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The captured bytes, lossily decoded as UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl Command {
    /// Runs the command and waits for it to finish.
    ///
    /// Fails if the process could not be created or exited unsuccessfully. In dry-run
    /// mode only the dry-run line is logged.
    pub fn run(&mut self) -> Result<(), ExecutionError> {
        self.run_with(Sinks::Configured)
    }

    /// Like [`run`](Self::run), with stdout/stderr overridden for this call only.
    pub fn run_with(&mut self, sinks: impl Into<Sinks>) -> Result<(), ExecutionError> {
        let silent = self.silent;
        self.execute(Action::Run, &sinks.into(), silent)
    }

    /// Runs the command silently and captures its stdout. The configured stdout and
    /// stderr are not used; stderr is discarded.
    pub fn output(&mut self) -> Captured {
        let buffer = SharedBuffer::new();
        let sinks = Sinks::Split {
            stdout: buffer.clone().into(),
            stderr: Output::Null,
        };
        let result = self.execute(Action::Output, &sinks, true);
        Captured {
            bytes: buffer.take(),
            error: result.err(),
        }
    }

    /// Runs the command and captures stdout and stderr interleaved in one buffer.
    pub fn combined_output(&mut self) -> Captured {
        let buffer = SharedBuffer::new();
        let silent = self.silent;
        let result = self.execute(Action::Run, &Sinks::from(buffer.clone()), silent);
        Captured {
            bytes: buffer.take(),
            error: result.err(),
        }
    }

    /// Starts the command without waiting for it. The process handle is available
    /// afterwards; finish with [`wait`](Self::wait) or [`kill`](Self::kill).
    pub fn start(&mut self) -> Result<(), ExecutionError> {
        self.start_with(Sinks::Configured)
    }

    /// Like [`start`](Self::start), with stdout/stderr overridden for this call only.
    pub fn start_with(&mut self, sinks: impl Into<Sinks>) -> Result<(), ExecutionError> {
        let settings = self.effective_settings();
        if self.is_dry_run() {
            self.log_dry_run(&settings, Action::Start);
            return Ok(());
        }
        if !self.silent {
            self.announce(&settings, &settings.label(Action::Start));
        }

        let process = self.spawn_process(&sinks.into())?;
        self.process = Some(process);
        self.state = State::Started;
        Ok(())
    }

    /// Waits for a started command to exit.
    ///
    /// Fails with [`ExecutionError::NotStarted`] if [`start`](Self::start) never
    /// created a process, leaving the command untouched.
    pub fn wait(&mut self) -> Result<(), ExecutionError> {
        let settings = self.effective_settings();
        if self.is_dry_run() {
            self.log_dry_run(&settings, Action::Wait);
            return Ok(());
        }
        if self.process.is_none() {
            return Err(ExecutionError::NotStarted {
                action: Action::Wait,
            });
        }
        if !self.silent {
            self.announce(&settings, &settings.label(Action::Wait));
        }

        let result = self.process_mut(Action::Wait)?.wait();
        let killed = self.state == State::Killed;
        match result {
            Ok(()) => {
                self.ended_at = Some(Instant::now());
                self.complete = true;
                if !killed {
                    self.exit_code = 0;
                    self.state = State::Completed;
                }
                Ok(())
            }
            Err(e) => {
                self.failed = true;
                if !killed {
                    self.exit_code = e.exit_code();
                    self.state = State::Failed;
                }
                Err(e)
            }
        }
    }

    /// Requests immediate termination of a started command, without waiting for it
    /// to exit. The command is marked failed with exit code -1.
    pub fn kill(&mut self) -> Result<(), ExecutionError> {
        let settings = self.effective_settings();
        if self.is_dry_run() {
            self.log_dry_run(&settings, Action::Kill);
            return Ok(());
        }
        if self.process.is_none() {
            return Err(ExecutionError::NotStarted {
                action: Action::Kill,
            });
        }

        self.failed = true;
        self.exit_code = -1;
        self.state = State::Killed;
        if !self.silent {
            self.announce(&settings, &settings.label(Action::Kill));
        }

        self.process_mut(Action::Kill)?.kill()
    }

    /// A reusable closure that runs a fresh clone of this command, with the closure's
    /// arguments appended, on every call.
    ///
    /// The closure owns a snapshot of the configuration as it is now; later changes to
    /// `self` are not seen, and no call affects another.
    pub fn as_runnable(
        &self,
        sinks: Sinks,
    ) -> impl Fn(&[&str]) -> Result<(), ExecutionError> + Send + Sync + use<> {
        let base = self.clone();
        move |args: &[&str]| base.with_trailing(args).run_with(sinks.clone())
    }

    /// Like [`as_runnable`](Self::as_runnable), also returning the clone that ran so
    /// its exit code and duration can be inspected.
    pub fn as_runnable_with_result(
        &self,
        sinks: Sinks,
    ) -> impl Fn(&[&str]) -> (Self, Result<(), ExecutionError>) + Send + Sync + use<> {
        let base = self.clone();
        move |args: &[&str]| {
            let mut cmd = base.with_trailing(args);
            let result = cmd.run_with(sinks.clone());
            (cmd, result)
        }
    }

    /// Like [`as_runnable`](Self::as_runnable), but starting each clone instead of
    /// running it.
    pub fn as_startable(
        &self,
        sinks: Sinks,
    ) -> impl Fn(&[&str]) -> Result<(), ExecutionError> + Send + Sync + use<> {
        let base = self.clone();
        move |args: &[&str]| base.with_trailing(args).start_with(sinks.clone())
    }

    /// Like [`as_startable`](Self::as_startable), also returning the started clone so
    /// it can be waited on or killed.
    pub fn as_startable_with_result(
        &self,
        sinks: Sinks,
    ) -> impl Fn(&[&str]) -> (Self, Result<(), ExecutionError>) + Send + Sync + use<> {
        let base = self.clone();
        move |args: &[&str]| {
            let mut cmd = base.with_trailing(args);
            let result = cmd.start_with(sinks.clone());
            (cmd, result)
        }
    }

    // --- Internals ---

    fn with_trailing(&self, args: &[&str]) -> Self {
        self.clone().with_arguments(args.iter().copied())
    }

    /// The blocking modes: dry-run check, announcement, spawn, wait, record.
    fn execute(
        &mut self,
        action: Action,
        sinks: &Sinks,
        silent: bool,
    ) -> Result<(), ExecutionError> {
        let settings = self.effective_settings();
        if self.is_dry_run() {
            self.log_dry_run(&settings, action);
            return Ok(());
        }
        if !silent {
            self.announce(&settings, &settings.label(action));
        }

        let mut process = self.spawn_process(sinks)?;
        let result = process.wait();
        self.process = Some(process);
        self.finish(result)
    }

    /// Logs the would-be invocation under the dry-run label. Runs regardless of
    /// `silent`, so dry-run output is always visible.
    fn log_dry_run(&self, settings: &Settings, action: Action) {
        let label = settings.dry_run_label(action, self.dry_run_label.as_deref());
        self.announce(settings, &label);
    }

    fn spawn_process(&mut self, sinks: &Sinks) -> Result<Process, ExecutionError> {
        self.reset_outcome();
        self.process = None;
        self.state = State::Configured;

        let (stdout, stderr) = sinks.resolve(&self.stdout, &self.stderr);
        let invocation = Invocation {
            argv: &self.argv,
            env: &self.env,
            dir: self.dir.as_deref(),
            stdin: &self.stdin,
            stdout: &stdout,
            stderr: &stderr,
            context: &self.context,
        };
        let spawned = executor::spawn(&invocation);
        self.started_at = Some(Instant::now());

        spawned.map_err(|e| {
            log::debug!("Failed to create process: {}", e);
            self.failed = true;
            self.state = State::Failed;
            e
        })
    }

    fn finish(&mut self, result: Result<(), ExecutionError>) -> Result<(), ExecutionError> {
        self.ended_at = Some(Instant::now());
        match &result {
            Ok(()) => {
                self.exit_code = 0;
                self.complete = true;
                self.state = State::Completed;
            }
            Err(e) => {
                self.exit_code = e.exit_code();
                // A process killed through its context never ran to completion.
                self.complete = !e.is_context_error();
                self.failed = true;
                self.state = State::Failed;
            }
        }
        result
    }

    fn process_mut(&mut self, action: Action) -> Result<&mut Process, ExecutionError> {
        self.process
            .as_mut()
            .ok_or(ExecutionError::NotStarted { action })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::logger::CaptureLogger;
    use crate::system::context::Context;
    use crate::system::stdio::Input;
    use std::io::{self, Cursor, Read};
    use std::time::Duration;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// A command wired to an in-memory logger, so tests can assert on announcements.
    fn cmd(argv: &[&str]) -> (Command, CaptureLogger) {
        init_logging();
        let capture = CaptureLogger::new();
        let cmd = Command::new(argv.iter().copied())
            .with_settings(Settings::default())
            .with_logger(capture.clone())
            .with_output(Output::Null, Some(Output::Null));
        (cmd, capture)
    }

    #[test]
    fn test_run_echo_completes() {
        let (mut cmd, capture) = cmd(&["echo", "foo"]);
        cmd.run().unwrap();
        assert_eq!(cmd.exit_code(), 0);
        assert!(cmd.complete());
        assert!(!cmd.failed());
        assert_eq!(cmd.state(), State::Completed);
        assert!(cmd.pid().is_some());
        assert!(cmd.duration() > Duration::ZERO);
        assert_eq!(capture.keys(), ["run"]);
        assert_eq!(capture.messages(), ["[echo foo]"]);
    }

    #[test]
    fn test_output_captures_stdout_silently() {
        let (mut cmd, capture) = cmd(&["echo", "foo"]);
        let captured = cmd.output();
        assert!(captured.is_success());
        assert_eq!(captured.bytes, b"foo\n");
        assert!(capture.is_empty());
        assert!(cmd.complete());
        assert!(!cmd.is_silent());
    }

    #[test]
    fn test_output_with_input() {
        let (cmd, _) = cmd(&["cat"]);
        let bytes = cmd.with_input("foo").output().into_result().unwrap();
        assert_eq!(bytes, b"foo");
    }

    #[test]
    fn test_combined_output_merges_streams() {
        let (mut cmd, _) = cmd(&["sh", "-c", "printf foo; printf foo >&2"]);
        let captured = cmd.combined_output();
        assert!(captured.is_success());
        assert_eq!(captured.bytes.len(), 6);
        assert_eq!(captured.text().matches("foo").count(), 2);
    }

    #[test]
    fn test_with_output_splits_streams() {
        let stdout = SharedBuffer::new();
        let stderr = SharedBuffer::new();
        let (cmd, _) = cmd(&["sh", "-c", "printf foo | tee /dev/stderr"]);
        let mut cmd = cmd.with_output(stdout.clone(), Some(stderr.clone().into()));
        cmd.run().unwrap();
        assert_eq!(stdout.contents(), b"foo");
        assert_eq!(stderr.contents(), b"foo");
    }

    #[test]
    fn test_run_with_single_sink_receives_both_streams() {
        let both = SharedBuffer::new();
        let (mut cmd, _) = cmd(&["sh", "-c", "printf out; printf err >&2"]);
        cmd.run_with(both.clone()).unwrap();
        let text = both.contents_lossy();
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[test]
    fn test_non_zero_exit_records_native_code() {
        let (mut cmd, _) = cmd(&["sh", "-c", "exit 3"]);
        let err = cmd.run().unwrap_err();
        assert!(matches!(err, ExecutionError::NonZeroExit { code: Some(3), .. }));
        assert_eq!(cmd.exit_code(), 3);
        assert!(cmd.failed());
        assert!(cmd.complete());
        assert_eq!(cmd.state(), State::Failed);
    }

    #[test]
    fn test_spawn_failure_leaves_exit_code() {
        let (mut cmd, _) = cmd(&["cmdr-test-no-such-binary"]);
        let err = cmd.run().unwrap_err();
        assert!(matches!(err, ExecutionError::Spawn { .. }));
        assert_eq!(cmd.exit_code(), 0);
        assert!(cmd.failed());
        assert!(!cmd.complete());
        assert!(cmd.process_handle().is_none());
    }

    #[test]
    fn test_empty_command_fails() {
        let (mut cmd, _) = cmd(&[]);
        assert!(matches!(cmd.run(), Err(ExecutionError::EmptyCommand)));
    }

    #[test]
    fn test_dry_run_never_spawns() {
        let (cmd, capture) = cmd(&["echo", "foo"]);
        let mut cmd = cmd.dry_run();
        cmd.run().unwrap();
        cmd.start().unwrap();
        cmd.kill().unwrap();
        cmd.wait().unwrap();
        assert!(cmd.process_handle().is_none());
        assert!(!cmd.complete());
        assert_eq!(cmd.state(), State::Configured);
        assert_eq!(capture.keys(), ["dry run", "dry start", "dry kill", "dry wait"]);
    }

    #[test]
    fn test_dry_run_logs_even_when_silent() {
        let (cmd, capture) = cmd(&["echo", "foo"]);
        let mut cmd = cmd.silent().dry_run_with_label("would run");
        cmd.run().unwrap();
        assert_eq!(capture.keys(), ["would run"]);
        assert_eq!(capture.messages(), ["[echo foo]"]);
        assert!(cmd.is_silent());
    }

    #[test]
    fn test_dry_run_from_injected_settings() {
        let (cmd, capture) = cmd(&["echo", "foo"]);
        let mut cmd = cmd.with_settings(Settings {
            dry_run: true,
            ..Settings::default()
        });
        let captured = cmd.output();
        assert!(captured.is_success());
        assert!(captured.bytes.is_empty());
        assert_eq!(capture.keys(), ["dry output"]);
    }

    #[test]
    fn test_wait_without_start_fails() {
        let (mut cmd, capture) = cmd(&["echo", "foo"]);
        let err = cmd.wait().unwrap_err();
        assert!(matches!(err, ExecutionError::NotStarted { action: Action::Wait }));
        assert_eq!(cmd.exit_code(), 0);
        assert!(!cmd.complete());
        assert_eq!(cmd.state(), State::Configured);
        assert!(capture.is_empty());
    }

    #[test]
    fn test_kill_without_start_fails() {
        let (mut cmd, _) = cmd(&["echo", "foo"]);
        assert!(matches!(
            cmd.kill(),
            Err(ExecutionError::NotStarted { action: Action::Kill })
        ));
        assert!(!cmd.failed());
    }

    #[test]
    fn test_start_then_wait() {
        let (mut cmd, capture) = cmd(&["echo", "foo"]);
        cmd.start().unwrap();
        assert_eq!(cmd.state(), State::Started);
        assert!(cmd.pid().is_some_and(|pid| pid > 0));
        cmd.wait().unwrap();
        assert!(cmd.complete());
        assert_eq!(cmd.state(), State::Completed);
        assert_eq!(capture.keys(), ["start", "wait"]);
    }

    #[test]
    fn test_start_then_kill() {
        let (mut cmd, capture) = cmd(&["sleep", "5"]);
        cmd.start().unwrap();
        assert!(cmd.process_handle().is_some());
        cmd.kill().unwrap();
        assert_eq!(cmd.exit_code(), -1);
        assert!(cmd.failed());
        assert_eq!(cmd.state(), State::Killed);
        assert_eq!(capture.keys(), ["start", "kill"]);

        assert!(cmd.wait().is_err());
        assert_eq!(cmd.exit_code(), -1);
        assert_eq!(cmd.state(), State::Killed);
    }

    #[test]
    fn test_duplicate_environment_last_wins() {
        let (cmd, _) = cmd(&["sh", "-c", "printf %s \"$CMDR_DUP\""]);
        let mut cmd = cmd.with_environment(["CMDR_DUP=first", "CMDR_DUP=second"]);
        assert_eq!(cmd.output().into_result().unwrap(), b"second");
    }

    #[test]
    fn test_non_utf8_environment_reaches_child_intact() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;
        let (cmd, _) = cmd(&["sh", "-c", "printf %s \"$CMDR_RAW\""]);
        let raw = OsString::from_vec(b"CMDR_RAW=a\xffb".to_vec());
        let mut cmd = cmd.with_environment([raw]);
        assert_eq!(cmd.output().into_result().unwrap(), b"a\xffb");
    }

    #[test]
    fn test_stdin_from_reader() {
        let (cmd, _) = cmd(&["cat"]);
        let mut cmd = cmd.with_stdin(Input::reader(Cursor::new(b"foo")));
        assert_eq!(cmd.output().into_result().unwrap(), b"foo");
    }

    #[test]
    fn test_unread_stdin_reader_is_not_an_error() {
        let (cmd, _) = cmd(&["true"]);
        let large = io::repeat(b'x').take(8 * 1024 * 1024);
        let mut cmd = cmd.with_stdin(Input::reader(large));
        cmd.run().unwrap();
        assert_eq!(cmd.exit_code(), 0);
        assert_eq!(cmd.state(), State::Completed);
    }

    #[test]
    fn test_silent_still_executes() {
        let (cmd, capture) = cmd(&["sh", "-c", "exit 4"]);
        let mut cmd = cmd.silent();
        assert!(cmd.run().is_err());
        assert_eq!(cmd.exit_code(), 4);
        assert!(capture.is_empty());
    }

    #[test]
    fn test_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (cmd, capture) = cmd(&["sh", "-c", "pwd -P"]);
        let mut cmd = cmd.with_working_directory(dir.path());
        let bytes = cmd.output().into_result().unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap().trim_end(), expected.to_str().unwrap());
        assert!(capture.is_empty());
    }

    #[test]
    fn test_context_deadline_kills_process() {
        let (cmd, _) = cmd(&["sleep", "5"]);
        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let mut cmd = cmd.with_context(ctx);
        let err = cmd.run().unwrap_err();
        assert!(matches!(err, ExecutionError::DeadlineExceeded { .. }));
        assert!(cmd.failed());
        assert!(!cmd.complete());
        assert_eq!(cmd.exit_code(), 1);
    }

    #[test]
    fn test_runnable_calls_are_isolated() {
        let (base, capture) = cmd(&["echo"]);
        let echo = base.as_runnable(Sinks::Configured);
        echo(&["a"]).unwrap();
        echo(&["b"]).unwrap();
        assert_eq!(capture.messages(), ["[echo a]", "[echo b]"]);
        assert_eq!(base.arguments(), ["echo"]);
        assert_eq!(base.state(), State::Configured);
    }

    #[test]
    fn test_runnable_with_result_exposes_clone() {
        let (base, _) = cmd(&["sh", "-c"]);
        let sh = base.as_runnable_with_result(Sinks::Configured);
        let (ok, result) = sh(&["exit 0"]);
        assert!(result.is_ok());
        assert!(ok.complete());

        let (failed, result) = sh(&["exit 5"]);
        assert!(result.is_err());
        assert_eq!(failed.exit_code(), 5);
        assert_eq!(failed.arguments(), ["sh", "-c", "exit 5"]);
    }

    #[test]
    fn test_startable_with_result_can_be_killed() {
        let (base, _) = cmd(&["sleep"]);
        let sleep = base.as_startable_with_result(Sinks::Configured);
        let (mut started, result) = sleep(&["5"]);
        result.unwrap();
        assert_eq!(started.state(), State::Started);
        started.kill().unwrap();
        assert!(base.process_handle().is_none());
    }

    #[test]
    fn test_startable_runs_in_background() {
        let buffer = SharedBuffer::new();
        let (base, _) = cmd(&["echo"]);
        let start = base.as_startable(Sinks::from(buffer.clone()));
        start(&["bg"]).unwrap();
        // The clone is dropped without waiting; the child still runs to completion.
        for _ in 0..200 {
            if !buffer.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(buffer.contents_lossy(), "bg\n");
    }

    #[test]
    fn test_rerun_overwrites_outcome() {
        let (mut cmd, capture) = cmd(&["true"]);
        cmd.run().unwrap();
        let first = cmd.pid();
        cmd.run().unwrap();
        assert_ne!(cmd.pid(), first);
        assert_eq!(capture.keys(), ["run", "run"]);
    }
}
