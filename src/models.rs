// src/models.rs

use serde::Deserialize;
use std::fmt;

/// The terminal colors a log label can be painted with.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AnsiColor {
    /// Black.
    Black,
    /// Red.
    Red,
    /// Green.
    Green,
    /// Yellow, the default dry-run color.
    Yellow,
    /// Rendered as bold blue, matching the classic "purple" escape.
    Purple,
    /// Magenta.
    Magenta,
    /// Cyan, the default action color.
    #[serde(alias = "cyan")]
    Teal,
    /// White.
    White,
    /// Used for separators and timestamps.
    #[serde(alias = "darkgray", alias = "dark_grey", alias = "dark_gray")]
    DarkGrey,
}

/// The execution mode an announcement is made for. Each maps to an action key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Blocking execution, including combined output capture.
    Run,
    /// Background start.
    Start,
    /// Waiting on a started process.
    Wait,
    /// Terminating a started process.
    Kill,
    /// Stdout capture.
    Output,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Run => "run",
            Self::Start => "start",
            Self::Wait => "wait",
            Self::Kill => "kill",
            Self::Output => "output",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a [`Command`](crate::Command).
///
/// `Configured` is the state after construction or clone. `run` and the capture
/// modes move straight to `Completed` or `Failed`; `start` moves to `Started`, from
/// which `wait` finishes the command and `kill` marks it `Killed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Built or cloned, nothing executed yet.
    #[default]
    Configured,
    /// Running in the background.
    Started,
    /// Exited successfully.
    Completed,
    /// Could not be created, exited unsuccessfully, or was cancelled.
    Failed,
    /// Terminated through `kill`.
    Killed,
}

impl State {
    /// Whether the command has reached an end state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Killed)
    }
}
