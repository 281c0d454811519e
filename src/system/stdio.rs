// src/system/stdio.rs

//! Stdio bindings for a command.
//!
//! Inherited and null streams are handed straight to the OS. Everything else (byte
//! payloads, arbitrary readers and writers, in-memory buffers) is connected through a
//! pipe and pumped by a helper thread while the child runs.

use std::fmt;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, PoisonError};

/// A writer shared between a command and its clones.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// A reader shared between a command and its clones.
pub type SharedReader = Arc<Mutex<dyn Read + Send>>;

/// Where a child's stdin comes from.
#[derive(Clone, Default)]
pub enum Input {
    /// The calling process's stdin.
    #[default]
    Inherit,
    /// An empty, immediately closed stdin.
    Null,
    /// A fixed payload, written once and then closed.
    Bytes(Arc<[u8]>),
    /// Any reader, copied until end of file.
    Reader(SharedReader),
}

impl Input {
    /// A fixed byte payload.
    pub fn bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(Arc::from(bytes.into()))
    }

    /// Any reader, moved behind a shared handle.
    pub fn reader(reader: impl Read + Send + 'static) -> Self {
        Self::Reader(Arc::new(Mutex::new(reader)))
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => f.write_str("Inherit"),
            Self::Null => f.write_str("Null"),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Where a child's stdout or stderr goes.
#[derive(Clone, Default)]
pub enum Output {
    /// The calling process's stream.
    #[default]
    Inherit,
    /// Discarded.
    Null,
    /// Any writer. Clones of a command write into the same writer.
    Writer(SharedWriter),
}

impl Output {
    /// Any writer, moved behind a shared handle.
    pub fn writer(writer: impl Write + Send + 'static) -> Self {
        Self::Writer(Arc::new(Mutex::new(writer)))
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => f.write_str("Inherit"),
            Self::Null => f.write_str("Null"),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

impl From<SharedBuffer> for Output {
    fn from(buffer: SharedBuffer) -> Self {
        Self::Writer(buffer.inner)
    }
}

/// Per-call output overrides for `run`, `start` and the runnable closures.
#[derive(Debug, Clone, Default)]
pub enum Sinks {
    /// Use the command's configured stdout and stderr.
    #[default]
    Configured,
    /// Send both stdout and stderr to one destination.
    Merged(Output),
    /// Send stdout and stderr to separate destinations.
    Split {
        /// Destination for stdout.
        stdout: Output,
        /// Destination for stderr.
        stderr: Output,
    },
}

impl Sinks {
    /// Resolves the overrides against the command's configured streams.
    pub(crate) fn resolve(&self, stdout: &Output, stderr: &Output) -> (Output, Output) {
        match self {
            Self::Configured => (stdout.clone(), stderr.clone()),
            Self::Merged(both) => (both.clone(), both.clone()),
            Self::Split { stdout, stderr } => (stdout.clone(), stderr.clone()),
        }
    }
}

impl From<Output> for Sinks {
    fn from(output: Output) -> Self {
        Self::Merged(output)
    }
}

impl From<SharedBuffer> for Sinks {
    fn from(buffer: SharedBuffer) -> Self {
        Self::Merged(buffer.into())
    }
}

impl From<(Output, Output)> for Sinks {
    fn from((stdout, stderr): (Output, Output)) -> Self {
        Self::Split { stdout, stderr }
    }
}

/// A cloneable in-memory byte sink. All clones append to the same buffer.
#[derive(Clone)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// An empty buffer.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A copy of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains the buffer, returning its contents.
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Default for SharedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer").field("len", &self.len()).finish()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
