// src/system/executor.rs

use crate::constants::{PUMP_BUFFER_SIZE, WAIT_POLL_INTERVAL};
use crate::models::Action;
use crate::system::context::{Context, Done};
use crate::system::stdio::{Input, Output, SharedWriter};
use std::ffi::{OsStr, OsString};
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command as StdCommand, ExitStatus, Stdio};
use std::sync::PoisonError;
use std::thread::{self, JoinHandle};
use thiserror::Error;

/// Everything that can go wrong while configuring, spawning or supervising a process.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// A command line string could not be split into arguments.
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    /// The argument vector is empty.
    #[error("No command specified to run.")]
    EmptyCommand,
    /// The OS refused to create the process (missing binary, permissions, ...).
    #[error("Command '{command}' could not be executed: {source}")]
    Spawn {
        /// The command line that failed.
        command: String,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },
    /// The process ran and exited unsuccessfully.
    #[error("Command '{command}' exited with {}", status_text(.code))]
    NonZeroExit {
        /// The command line that failed.
        command: String,
        /// The native exit code, absent if the process was terminated by a signal.
        code: Option<i32>,
    },
    /// Streaming stdin, stdout or stderr failed, or the process could not be polled.
    #[error("I/O error while supervising '{command}': {source}")]
    Io {
        /// The command line being supervised.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A lifecycle operation needs a process that was never started.
    #[error("Cannot {action}: no process has been started for this command.")]
    NotStarted {
        /// The operation that was attempted.
        action: Action,
    },
    /// The command's context was cancelled.
    #[error("Command '{command}' was cancelled.")]
    Cancelled {
        /// The command line that was cancelled.
        command: String,
    },
    /// The command's context deadline passed.
    #[error("Command '{command}' exceeded its deadline.")]
    DeadlineExceeded {
        /// The command line that ran out of time.
        command: String,
    },
}

impl ExecutionError {
    /// The exit code a command records for this error.
    ///
    /// A native exit status wins when one exists. A process terminated by a signal
    /// records -1; every other failure records 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NonZeroExit { code: Some(code), .. } => *code,
            Self::NonZeroExit { code: None, .. } => -1,
            _ => 1,
        }
    }

    /// Whether the error came from the command's context rather than the process.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }

    fn from_done(done: Done, command: String) -> Self {
        match done {
            Done::Cancelled => Self::Cancelled { command },
            Done::DeadlineExceeded => Self::DeadlineExceeded { command },
        }
    }
}

fn status_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "a termination signal".to_string(),
    }
}

/// The fully resolved inputs of one process creation.
#[derive(Debug)]
pub(crate) struct Invocation<'a> {
    pub(crate) argv: &'a [String],
    pub(crate) env: &'a [OsString],
    pub(crate) dir: Option<&'a Path>,
    pub(crate) stdin: &'a Input,
    pub(crate) stdout: &'a Output,
    pub(crate) stderr: &'a Output,
    pub(crate) context: &'a Context,
}

type Pump = JoinHandle<io::Result<()>>;

/// A spawned OS process together with the threads pumping its stdio.
#[derive(Debug)]
pub struct Process {
    child: Child,
    pumps: Vec<Pump>,
    status: Option<ExitStatus>,
    command_line: String,
    context: Context,
}

impl Process {
    /// The OS process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// The exit status, once the process has been waited on.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Blocks until the process exits and its stdio has been fully copied.
    ///
    /// If the context is done first, the child is killed and reaped and a context
    /// error is returned.
    pub(crate) fn wait(&mut self) -> Result<(), ExecutionError> {
        let status = self.wait_for_exit()?;
        let pumped = self.join_pumps();
        if !status.success() {
            return Err(ExecutionError::NonZeroExit {
                command: self.command_line.clone(),
                code: status.code(),
            });
        }
        pumped
    }

    /// Requests immediate termination. Does not wait for the process to exit.
    pub(crate) fn kill(&mut self) -> Result<(), ExecutionError> {
        log::debug!("Killing child process (PID: {})...", self.child.id());
        self.child.kill().map_err(|source| ExecutionError::Io {
            command: self.command_line.clone(),
            source,
        })
    }

    fn wait_for_exit(&mut self) -> Result<ExitStatus, ExecutionError> {
        if let Some(status) = self.status {
            return Ok(status);
        }

        // Non-blocking wait loop to allow for cancellation.
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.status = Some(status);
                    return Ok(status);
                }
                Ok(None) => {
                    if let Some(done) = self.context.done() {
                        log::debug!(
                            "{}, killing child process (PID: {})...",
                            done,
                            self.child.id()
                        );
                        if let Err(e) = self.child.kill() {
                            log::warn!("Failed to kill child process {}: {}", self.child.id(), e);
                        }
                        self.status = self.child.wait().ok();
                        // Grandchildren may still hold the pipes open; don't block on them.
                        self.pumps.clear();
                        return Err(ExecutionError::from_done(done, self.command_line.clone()));
                    }
                    thread::sleep(WAIT_POLL_INTERVAL);
                }
                Err(source) => {
                    return Err(ExecutionError::Io {
                        command: self.command_line.clone(),
                        source,
                    });
                }
            }
        }
    }

    fn join_pumps(&mut self) -> Result<(), ExecutionError> {
        let mut first_error = None;
        for pump in self.pumps.drain(..) {
            let result = pump
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdio pump thread panicked")));
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(source) => Err(ExecutionError::Io {
                command: self.command_line.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}

/// Creates the process described by `invocation` and starts pumping its stdio.
///
/// Fails without spawning if the argument vector is empty or the context is
/// already done.
pub(crate) fn spawn(invocation: &Invocation<'_>) -> Result<Process, ExecutionError> {
    let (program, args) = invocation
        .argv
        .split_first()
        .ok_or(ExecutionError::EmptyCommand)?;
    let command_line = invocation.argv.join(" ");

    if let Some(done) = invocation.context.done() {
        return Err(ExecutionError::from_done(done, command_line));
    }

    let mut command = StdCommand::new(program);
    command
        .args(args)
        .env_clear()
        .envs(env_pairs(invocation.env))
        .stdin(input_mode(invocation.stdin))
        .stdout(output_mode(invocation.stdout))
        .stderr(output_mode(invocation.stderr));
    if let Some(dir) = invocation.dir {
        command.current_dir(dunce::simplified(dir));
    }

    let mut child = command.spawn().map_err(|source| ExecutionError::Spawn {
        command: command_line.clone(),
        source,
    })?;
    log::debug!("Spawned '{}' (PID: {}).", command_line, child.id());

    let mut pumps = Vec::new();
    if let Some(stdin) = child.stdin.take() {
        pumps.push(feed_stdin(stdin, invocation.stdin.clone()));
    }
    if let (Some(stdout), Output::Writer(sink)) = (child.stdout.take(), invocation.stdout) {
        pumps.push(drain(stdout, sink.clone()));
    }
    if let (Some(stderr), Output::Writer(sink)) = (child.stderr.take(), invocation.stderr) {
        pumps.push(drain(stderr, sink.clone()));
    }

    Ok(Process {
        child,
        pumps,
        status: None,
        command_line,
        context: invocation.context.clone(),
    })
}

/// Splits `KEY=VALUE` entries. Later duplicates override earlier ones once passed to
/// the OS command, and malformed entries are skipped.
fn env_pairs(env: &[OsString]) -> impl Iterator<Item = (&OsStr, &OsStr)> {
    env.iter().filter_map(|entry| match split_entry(entry) {
        Some((key, value)) if !key.is_empty() => Some((key, value)),
        _ => {
            log::debug!(
                "Skipping malformed environment entry '{}'.",
                entry.to_string_lossy()
            );
            None
        }
    })
}

/// Splits at the first `=` without decoding, so non-UTF-8 values pass through intact.
#[cfg(unix)]
fn split_entry(entry: &OsStr) -> Option<(&OsStr, &OsStr)> {
    use std::os::unix::ffi::OsStrExt;
    let bytes = entry.as_bytes();
    let eq = bytes.iter().position(|&b| b == b'=')?;
    let (key, rest) = bytes.split_at(eq);
    Some((OsStr::from_bytes(key), OsStr::from_bytes(rest.get(1..)?)))
}

#[cfg(not(unix))]
fn split_entry(entry: &OsStr) -> Option<(&OsStr, &OsStr)> {
    let (key, value) = entry.to_str()?.split_once('=')?;
    Some((OsStr::new(key), OsStr::new(value)))
}

fn input_mode(input: &Input) -> Stdio {
    match input {
        Input::Inherit => Stdio::inherit(),
        Input::Null => Stdio::null(),
        Input::Bytes(_) | Input::Reader(_) => Stdio::piped(),
    }
}

fn output_mode(output: &Output) -> Stdio {
    match output {
        Output::Inherit => Stdio::inherit(),
        Output::Null => Stdio::null(),
        Output::Writer(_) => Stdio::piped(),
    }
}

fn feed_stdin(mut stdin: ChildStdin, input: Input) -> Pump {
    thread::spawn(move || {
        let result = match &input {
            Input::Bytes(bytes) => stdin.write_all(bytes),
            Input::Reader(reader) => {
                let mut reader = reader.lock().unwrap_or_else(PoisonError::into_inner);
                io::copy(&mut *reader, &mut stdin).map(|_| ())
            }
            Input::Inherit | Input::Null => Ok(()),
        };
        drop(stdin);
        match result {
            // The child exited (or closed stdin) without reading everything.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                log::debug!("Child closed stdin early: {}", e);
                Ok(())
            }
            other => other,
        }
    })
}

/// Copies `source` into `sink` one chunk at a time, so two pumps sharing a sink
/// interleave instead of blocking each other.
fn drain(mut source: impl Read + Send + 'static, sink: SharedWriter) -> Pump {
    thread::spawn(move || {
        let mut buf = vec![0u8; PUMP_BUFFER_SIZE];
        loop {
            let n = match source.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let chunk = buf.get(..n).unwrap_or_default();
            sink.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write_all(chunk)?;
        }
        sink.lock().unwrap_or_else(PoisonError::into_inner).flush()
    })
}

/// Resolves `program` against `PATH` the way the OS would when spawning it.
/// Falls back to the name as given.
pub(crate) fn resolve_program(program: &str) -> PathBuf {
    let as_given = Path::new(program);
    if as_given.components().count() > 1 {
        return as_given.to_path_buf();
    }
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(program))
                .find(|candidate| is_executable(candidate))
        })
        .unwrap_or_else(|| as_given.to_path_buf())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::system::stdio::SharedBuffer;
    use std::time::{Duration, Instant};

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn os_entries(entries: &[&str]) -> Vec<OsString> {
        entries.iter().map(OsString::from).collect()
    }

    fn path_env() -> Vec<OsString> {
        std::env::var_os("PATH")
            .map(|path| {
                let mut entry = OsString::from("PATH=");
                entry.push(path);
                vec![entry]
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_exit_code_prefers_native_status() {
        let err = ExecutionError::NonZeroExit {
            command: "false".into(),
            code: Some(3),
        };
        assert_eq!(err.exit_code(), 3);

        let signaled = ExecutionError::NonZeroExit {
            command: "sleep".into(),
            code: None,
        };
        assert_eq!(signaled.exit_code(), -1);
        assert_eq!(ExecutionError::EmptyCommand.exit_code(), 1);
    }

    #[test]
    fn test_env_pairs_skips_malformed() {
        let env = os_entries(&["A=1", "broken", "=C:", "B=x=y"]);
        let pairs: Vec<_> = env_pairs(&env).collect();
        assert_eq!(
            pairs,
            vec![
                (OsStr::new("A"), OsStr::new("1")),
                (OsStr::new("B"), OsStr::new("x=y"))
            ]
        );
    }

    #[test]
    fn test_env_pairs_keeps_non_utf8_bytes() {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};
        let env = vec![OsString::from_vec(b"RAW=a\xffb".to_vec())];
        let pairs: Vec<_> = env_pairs(&env).collect();
        assert_eq!(pairs.len(), 1);
        let (key, value) = pairs.first().copied().unwrap();
        assert_eq!(key, OsStr::new("RAW"));
        assert_eq!(value.as_bytes(), b"a\xffb");
    }

    #[test]
    fn test_spawn_empty_argv() {
        let ctx = Context::background();
        let invocation = Invocation {
            argv: &[],
            env: &[],
            dir: None,
            stdin: &Input::Inherit,
            stdout: &Output::Inherit,
            stderr: &Output::Inherit,
            context: &ctx,
        };
        assert!(matches!(spawn(&invocation), Err(ExecutionError::EmptyCommand)));
    }

    #[test]
    fn test_stdin_bytes_roundtrip_through_cat() {
        let ctx = Context::background();
        let buffer = SharedBuffer::new();
        let argv = argv(&["cat"]);
        let env = path_env();
        let stdout = Output::from(buffer.clone());
        let invocation = Invocation {
            argv: &argv,
            env: &env,
            dir: None,
            stdin: &Input::bytes("piped"),
            stdout: &stdout,
            stderr: &Output::Null,
            context: &ctx,
        };
        let mut process = spawn(&invocation).unwrap();
        process.wait().unwrap();
        assert_eq!(buffer.contents(), b"piped");
        assert!(process.exit_status().unwrap().success());
    }

    #[test]
    fn test_cancellation_kills_running_child() {
        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let argv = argv(&["sleep", "5"]);
        let env = path_env();
        let invocation = Invocation {
            argv: &argv,
            env: &env,
            dir: None,
            stdin: &Input::Null,
            stdout: &Output::Null,
            stderr: &Output::Null,
            context: &ctx,
        };
        let began = Instant::now();
        let mut process = spawn(&invocation).unwrap();
        let err = process.wait().unwrap_err();
        assert!(matches!(err, ExecutionError::DeadlineExceeded { .. }));
        assert!(began.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_done_context_prevents_spawn() {
        let ctx = Context::background();
        ctx.cancel();
        let argv = argv(&["true"]);
        let invocation = Invocation {
            argv: &argv,
            env: &[],
            dir: None,
            stdin: &Input::Null,
            stdout: &Output::Null,
            stderr: &Output::Null,
            context: &ctx,
        };
        assert!(matches!(
            spawn(&invocation),
            Err(ExecutionError::Cancelled { .. })
        ));
    }

    #[test]
    fn test_resolve_program_keeps_paths() {
        assert_eq!(resolve_program("./run.sh"), PathBuf::from("./run.sh"));
        assert_eq!(
            resolve_program("definitely-not-a-real-binary-xyz"),
            PathBuf::from("definitely-not-a-real-binary-xyz")
        );
    }
}
